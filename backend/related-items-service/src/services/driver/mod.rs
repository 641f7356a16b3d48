// ============================================
// Iteration Driver
// ============================================
//
// Runs the clustering stage `iterate` times, each pass with a fresh seed
// from the shared Seed Manager, and folds every pass's clusters into one
// candidate relation tally before handing it to the selector.
//
// State machine:
//   Idle -> Iterating(1..=iterate) -> Aggregated -> Selecting -> Done
//   any iteration boundary -> Cancelled
//
// Passes are strictly sequential: pass i+1 draws its seed only after pass
// i has been merged. A failed pass is re-run with the same seed.

pub mod retry;

use crate::config::LshConfig;
use crate::error::{AppError, Result};
use crate::models::{HashSeed, Item, RecommendationSet};
use crate::services::aggregation::CandidateRelations;
use crate::services::clustering::{ClusterExtractor, ClusterStage};
use crate::services::seed::SeedManager;
use crate::services::selection::RecommendationSelector;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

pub use retry::{with_retry, RetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Iterating(u32),
    Aggregated,
    Selecting,
    Done,
    Cancelled,
}

/// Run diagnostics, returned instead of side-channel counters
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Item count reported by the first pass
    pub input_records: u64,
    pub iterations: u32,
    pub clusters_kept: u64,
    pub dropped_undersized: u64,
    pub dropped_oversized: u64,
    pub relations: u64,
    pub retries: u32,
    pub total_duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct DriverOutput {
    pub recommendations: RecommendationSet,
    pub seeds: Vec<HashSeed>,
    pub stats: RunStats,
}

pub struct IterationDriver {
    config: LshConfig,
    retry: RetryConfig,
    stage: Arc<dyn ClusterStage>,
    seeds: Arc<SeedManager>,
    state: DriverState,
}

impl IterationDriver {
    /// Driver backed by the in-process worker pool
    pub fn new(config: LshConfig, seeds: Arc<SeedManager>) -> Self {
        let stage = Arc::new(ClusterExtractor::new(&config));
        Self::with_stage(config, seeds, stage)
    }

    /// Driver backed by a custom execution stage
    pub fn with_stage(
        config: LshConfig,
        seeds: Arc<SeedManager>,
        stage: Arc<dyn ClusterStage>,
    ) -> Self {
        Self {
            config,
            retry: RetryConfig::default(),
            stage,
            seeds,
            state: DriverState::Idle,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Run every iteration and select recommendations.
    ///
    /// Cancellation is honoured at iteration boundaries; a cancelled run
    /// returns `AppError::Cancelled` and produces no output.
    pub async fn run(
        &mut self,
        items: Arc<[Item]>,
        cancel: &watch::Receiver<bool>,
    ) -> Result<DriverOutput> {
        if self.state != DriverState::Idle {
            return Err(AppError::Configuration(format!(
                "driver already used (state {:?})",
                self.state
            )));
        }
        self.config.validate()?;

        let start_time = Instant::now();
        let mut stats = RunStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        let mut relations = CandidateRelations::new();
        // The manager may be shared across runs; only this run's seeds are reported
        let first_seed = self.seeds.issued_count();

        for iteration in 1..=self.config.iterate {
            if *cancel.borrow() {
                return Err(self.cancel(iteration - 1));
            }
            self.state = DriverState::Iterating(iteration);

            let seed = self.seeds.next_seed()?;
            info!(iteration, total = self.config.iterate, seed = %seed, "Extracting clusters");

            let stage = Arc::clone(&self.stage);
            let (extraction, retries) = with_retry(&self.retry, || {
                let stage = Arc::clone(&stage);
                let items = Arc::clone(&items);
                async move { stage.run_stage(iteration, items, seed).await }
            })
            .await?;

            if iteration == 1 {
                stats.input_records = extraction.input_records;
                info!(input_records = stats.input_records, "Input record count");
            }

            stats.iterations = iteration;
            stats.retries += retries;
            stats.clusters_kept += extraction.clusters.len() as u64;
            stats.dropped_undersized += extraction.dropped_undersized;
            stats.dropped_oversized += extraction.dropped_oversized;

            // Clusters are dropped here; only the tally survives the pass
            relations.absorb(&extraction.clusters);
        }

        if *cancel.borrow() {
            return Err(self.cancel(self.config.iterate));
        }
        self.state = DriverState::Aggregated;
        stats.relations = relations.len() as u64;

        self.state = DriverState::Selecting;
        let selector = RecommendationSelector::new(self.config.max_recommend);
        let recommendations = selector.select_all(&relations, items.iter().map(|item| item.id));

        self.state = DriverState::Done;
        stats.completed_at = Some(Utc::now());
        stats.total_duration_ms = start_time.elapsed().as_millis() as u64;

        info!(
            iterations = stats.iterations,
            clusters = stats.clusters_kept,
            relations = stats.relations,
            retries = stats.retries,
            duration_ms = stats.total_duration_ms,
            "Iterations completed"
        );

        Ok(DriverOutput {
            recommendations,
            seeds: self.seeds.seeds_since(first_seed),
            stats,
        })
    }

    fn cancel(&mut self, completed_iterations: u32) -> AppError {
        warn!(completed_iterations, "Run cancelled at iteration boundary");
        self.state = DriverState::Cancelled;
        AppError::Cancelled {
            completed_iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clustering::ClusterExtraction;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn config(iterate: u32) -> LshConfig {
        LshConfig {
            depth: 1,
            iterate,
            min_cluster_size: 2,
            max_cluster_size: 4,
            max_recommend: 10,
            num_workers: 2,
        }
    }

    fn items() -> Arc<[Item]> {
        vec![
            Item::new(0, ["a", "b", "c"]),
            Item::new(1, ["a", "b", "c"]),
            Item::new(2, ["a", "b", "c"]),
            Item::new(7, ["x7"]),
        ]
        .into()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        }
    }

    /// Fails the first `failures` calls, then delegates
    struct FlakyStage {
        inner: ClusterExtractor,
        failures: u32,
        calls: AtomicU32,
        seeds_seen: parking_lot::Mutex<Vec<HashSeed>>,
    }

    #[async_trait]
    impl ClusterStage for FlakyStage {
        async fn run_stage(
            &self,
            iteration: u32,
            items: Arc<[Item]>,
            seed: HashSeed,
        ) -> Result<ClusterExtraction> {
            self.seeds_seen.lock().push(seed);
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(AppError::ExecutionStage {
                    iteration,
                    reason: "simulated worker crash".to_string(),
                });
            }
            self.inner.run_stage(iteration, items, seed).await
        }
    }

    #[tokio::test]
    async fn test_run_reaches_done() {
        let (_tx, rx) = watch::channel(false);
        let seeds = Arc::new(SeedManager::with_rng_seed(1));
        let mut driver = IterationDriver::new(config(3), seeds.clone());

        let output = driver.run(items(), &rx).await.unwrap();

        assert_eq!(driver.state(), DriverState::Done);
        assert_eq!(output.seeds.len(), 3);
        assert_eq!(output.seeds, seeds.all_seeds());
        assert_eq!(output.stats.input_records, 4);
        assert_eq!(output.stats.iterations, 3);
        assert_eq!(output.recommendations.get(0), Some(&[1, 2][..]));
        assert_eq!(output.recommendations.get(7), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_iteration() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let mut driver = IterationDriver::new(config(3), Arc::new(SeedManager::with_rng_seed(1)));

        let err = driver.run(items(), &rx).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Cancelled {
                completed_iterations: 0
            }
        ));
        assert_eq!(driver.state(), DriverState::Cancelled);
    }

    /// Raises cancel after the first pass, like a signal arriving mid-run
    struct CancelAfterFirstPass {
        inner: ClusterExtractor,
        cancel: watch::Sender<bool>,
    }

    #[async_trait]
    impl ClusterStage for CancelAfterFirstPass {
        async fn run_stage(
            &self,
            iteration: u32,
            items: Arc<[Item]>,
            seed: HashSeed,
        ) -> Result<ClusterExtraction> {
            let extraction = self.inner.run_stage(iteration, items, seed).await?;
            if iteration == 1 {
                let _ = self.cancel.send(true);
            }
            Ok(extraction)
        }
    }

    #[tokio::test]
    async fn test_cancelled_between_iterations() {
        let (tx, rx) = watch::channel(false);
        let cfg = config(3);
        let stage = Arc::new(CancelAfterFirstPass {
            inner: ClusterExtractor::new(&cfg),
            cancel: tx,
        });
        let seeds = Arc::new(SeedManager::with_rng_seed(1));
        let mut driver = IterationDriver::with_stage(cfg, seeds.clone(), stage);

        let err = driver.run(items(), &rx).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Cancelled {
                completed_iterations: 1
            }
        ));
        assert_eq!(driver.state(), DriverState::Cancelled);
        // No seed is drawn for a pass that never starts
        assert_eq!(seeds.issued_count(), 1);
    }

    #[tokio::test]
    async fn test_shared_seed_manager_reports_only_current_run() {
        let (_tx, rx) = watch::channel(false);
        let seeds = Arc::new(SeedManager::with_rng_seed(4));

        let mut first_driver = IterationDriver::new(config(2), seeds.clone());
        let first = first_driver.run(items(), &rx).await.unwrap();
        let mut second_driver = IterationDriver::new(config(2), seeds.clone());
        let second = second_driver.run(items(), &rx).await.unwrap();

        assert_eq!(first.seeds.len(), 2);
        assert_eq!(second.seeds.len(), 2);
        assert_eq!(seeds.all_seeds()[2..].to_vec(), second.seeds);
    }

    #[tokio::test]
    async fn test_stage_failure_is_retried_with_same_seed() {
        let (_tx, rx) = watch::channel(false);
        let cfg = config(2);
        let stage = Arc::new(FlakyStage {
            inner: ClusterExtractor::new(&cfg),
            failures: 1,
            calls: AtomicU32::new(0),
            seeds_seen: parking_lot::Mutex::new(Vec::new()),
        });
        let mut driver = IterationDriver::with_stage(
            cfg,
            Arc::new(SeedManager::with_rng_seed(5)),
            stage.clone(),
        )
        .with_retry(fast_retry());

        let output = driver.run(items(), &rx).await.unwrap();

        assert_eq!(output.stats.retries, 1);
        let seen = stage.seeds_seen.lock().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(output.seeds, vec![seen[1], seen[2]]);
    }

    #[tokio::test]
    async fn test_persistent_stage_failure_aborts() {
        let (_tx, rx) = watch::channel(false);
        let cfg = config(2);
        let stage = Arc::new(FlakyStage {
            inner: ClusterExtractor::new(&cfg),
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            seeds_seen: parking_lot::Mutex::new(Vec::new()),
        });
        let mut driver =
            IterationDriver::with_stage(cfg, Arc::new(SeedManager::with_rng_seed(5)), stage)
                .with_retry(fast_retry());

        let err = driver.run(items(), &rx).await.unwrap_err();
        assert!(matches!(err, AppError::ExecutionStage { .. }));
    }

    #[tokio::test]
    async fn test_driver_runs_once() {
        let (_tx, rx) = watch::channel(false);
        let mut driver = IterationDriver::new(config(1), Arc::new(SeedManager::with_rng_seed(1)));
        driver.run(items(), &rx).await.unwrap();
        assert!(driver.run(items(), &rx).await.is_err());
    }

    #[tokio::test]
    async fn test_seed_exhaustion_aborts_run() {
        let (_tx, rx) = watch::channel(false);
        let mut driver =
            IterationDriver::new(config(3), Arc::new(SeedManager::replay(vec![HashSeed(1)])));
        let err = driver.run(items(), &rx).await.unwrap_err();
        assert!(matches!(err, AppError::SeedExhaustion(_)));
    }
}
