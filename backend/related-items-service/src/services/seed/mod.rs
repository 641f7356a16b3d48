// ============================================
// Seed Manager
// ============================================
//
// Issues one hash seed per clustering iteration and keeps an append-only
// log of every seed handed out, in issuance order. The log is published
// once at the end of a run so any run can be replayed exactly.

use crate::error::{AppError, Result};
use crate::models::HashSeed;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// Re-draws allowed when a random seed repeats within one run
const MAX_REDRAWS: u32 = 16;

enum SeedSource {
    Random(StdRng),
    Replay(VecDeque<HashSeed>),
}

struct SeedState {
    source: SeedSource,
    issued: Vec<HashSeed>,
    seen: HashSet<HashSeed>,
}

/// Thread-safe, strictly ordered seed issuer
pub struct SeedManager {
    state: Mutex<SeedState>,
}

impl SeedManager {
    fn with_source(source: SeedSource) -> Self {
        Self {
            state: Mutex::new(SeedState {
                source,
                issued: Vec::new(),
                seen: HashSet::new(),
            }),
        }
    }

    /// Seeds drawn from OS entropy
    pub fn from_entropy() -> Self {
        Self::with_source(SeedSource::Random(StdRng::from_entropy()))
    }

    /// Deterministic seed sequence, for tests and reproducible runs
    pub fn with_rng_seed(rng_seed: u64) -> Self {
        Self::with_source(SeedSource::Random(StdRng::seed_from_u64(rng_seed)))
    }

    /// Re-issue a previously persisted seed log in its original order
    pub fn replay(seeds: Vec<HashSeed>) -> Self {
        Self::with_source(SeedSource::Replay(seeds.into()))
    }

    /// Issue the next seed. Never returns a seed already issued by this manager.
    pub fn next_seed(&self) -> Result<HashSeed> {
        let mut state = self.state.lock();
        let SeedState {
            source,
            issued,
            seen,
        } = &mut *state;

        let seed = match source {
            SeedSource::Random(rng) => {
                let mut attempts = 0;
                loop {
                    let candidate = HashSeed(rng.gen());
                    if !seen.contains(&candidate) {
                        break candidate;
                    }
                    attempts += 1;
                    warn!(seed = %candidate, attempts, "Seed collision, re-drawing");
                    if attempts >= MAX_REDRAWS {
                        return Err(AppError::SeedExhaustion(format!(
                            "no unique seed after {MAX_REDRAWS} draws"
                        )));
                    }
                }
            }
            SeedSource::Replay(queue) => {
                let candidate = queue.pop_front().ok_or_else(|| {
                    AppError::SeedExhaustion(format!(
                        "replay log exhausted after {} seeds",
                        issued.len()
                    ))
                })?;
                if seen.contains(&candidate) {
                    return Err(AppError::SeedExhaustion(format!(
                        "replay log repeats seed {candidate}"
                    )));
                }
                candidate
            }
        };

        seen.insert(seed);
        issued.push(seed);
        debug!(seed = %seed, position = issued.len(), "Issued hash seed");
        Ok(seed)
    }

    /// Every seed issued so far, in issuance order
    pub fn all_seeds(&self) -> Vec<HashSeed> {
        self.state.lock().issued.clone()
    }

    pub fn issued_count(&self) -> usize {
        self.state.lock().issued.len()
    }

    /// Seeds issued after the first `start`, in issuance order
    pub fn seeds_since(&self, start: usize) -> Vec<HashSeed> {
        let state = self.state.lock();
        state.issued.get(start..).unwrap_or_default().to_vec()
    }
}
