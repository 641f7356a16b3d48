// ============================================
// MinHash Signature Function
// ============================================
//
// Min-wise independent permutation hashing. For a seed `s` and depth `d`
// each level `l` gets its own hash family keyed by a value derived from
// (s, l); an item's signature is the per-level minimum hash over its
// features. Two items share a level value with probability equal to the
// Jaccard similarity of their feature sets, so a longer signature means
// fewer, tighter collisions.

use crate::models::{Feature, HashSeed, Signature};
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Per-level constant mixed into the seed (64-bit golden ratio)
const LEVEL_CONSTANT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Deterministic minhash function for one seed and depth
#[derive(Debug, Clone)]
pub struct MinWiseFunction {
    seed: HashSeed,
    level_keys: Vec<u64>,
}

impl MinWiseFunction {
    pub fn new(seed: HashSeed, depth: usize) -> Self {
        let level_keys = (0..depth as u64)
            .map(|level| mix64(seed.0 ^ LEVEL_CONSTANT.wrapping_mul(level + 1)))
            .collect();

        Self { seed, level_keys }
    }

    pub fn seed(&self) -> HashSeed {
        self.seed
    }

    pub fn depth(&self) -> usize {
        self.level_keys.len()
    }

    /// Hash of one feature under one level's hash family; `None` when
    /// `level >= depth`
    pub fn hash(&self, level: usize, feature: &Feature) -> Option<u64> {
        let key = *self.level_keys.get(level)?;
        let mut buf = Vec::with_capacity(16);
        feature.encode_into(&mut buf);
        Some(xxh3_64_with_seed(&buf, key))
    }

    /// Signature of a feature set; the sentinel when the set is empty
    pub fn signature<'a, I>(&self, features: I) -> Signature
    where
        I: IntoIterator<Item = &'a Feature>,
    {
        let mut minimums = vec![u64::MAX; self.level_keys.len()];
        let mut buf = Vec::with_capacity(16);
        let mut any = false;

        for feature in features {
            any = true;
            feature.encode_into(&mut buf);
            for (min, key) in minimums.iter_mut().zip(&self.level_keys) {
                let h = xxh3_64_with_seed(&buf, *key);
                if h < *min {
                    *min = h;
                }
            }
        }

        if !any {
            return Signature::sentinel(self.depth());
        }
        Signature(minimums)
    }
}

/// splitmix64 finalizer
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
