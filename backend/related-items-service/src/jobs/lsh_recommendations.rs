// ============================================
// LSH Recommendation Job
// ============================================
//
// Batch job computing related-item recommendations for a whole input.
// Designed to run as a Kubernetes CronJob or standalone process.
//
// Workflow:
// 1. Read all item records from the record source
// 2. Run `iterate` minhash clustering passes with fresh seeds
// 3. Rank co-occurring items per source item
// 4. Publish recommendations and the seed log to the sink in one step
//
// Nothing is published when any stage fails or the run is cancelled.
//
// Usage:
//   related-items-service -input items.tsv -output lsh -depth 1 -iterate 5

use crate::config::{Config, LshConfig};
use crate::error::Result;
use crate::models::RunArtifact;
use crate::services::clustering::ClusterStage;
use crate::services::driver::{DriverOutput, IterationDriver, RetryConfig, RunStats};
use crate::services::seed::SeedManager;
use crate::sinks::RecommendationSink;
use crate::sources::RecordSource;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Summary returned by a completed job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub run_key: String,
    pub items: usize,
    pub items_with_recommendations: usize,
    pub stats: RunStats,
}

/// LSH recommendation job runner
pub struct LshRecommendationJob {
    config: LshConfig,
    retry: RetryConfig,
    stage: Option<Arc<dyn ClusterStage>>,
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn RecommendationSink>,
    seeds: Arc<SeedManager>,
}

impl LshRecommendationJob {
    pub fn new(
        config: LshConfig,
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn RecommendationSink>,
        seeds: Arc<SeedManager>,
    ) -> Self {
        Self {
            config,
            retry: RetryConfig::default(),
            stage: None,
            source,
            sink,
            seeds,
        }
    }

    /// Create from app config
    pub fn from_config(
        app_config: &Config,
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn RecommendationSink>,
        seeds: Arc<SeedManager>,
    ) -> Self {
        Self::new(app_config.lsh.clone(), source, sink, seeds)
            .with_retry(RetryConfig::from(&app_config.retry))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Run clustering passes on a custom stage instead of the local worker pool
    pub fn with_stage(mut self, stage: Arc<dyn ClusterStage>) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Run the job once. Publishes only after every stage succeeded.
    pub async fn run(&self, cancel: watch::Receiver<bool>) -> Result<JobReport> {
        self.config.validate()?;

        let run_key = self.source.identity();
        info!(
            run_key = %run_key,
            depth = self.config.depth,
            iterate = self.config.iterate,
            min_cluster = self.config.min_cluster_size,
            max_cluster = self.config.max_cluster_size,
            max_recommend = self.config.max_recommend,
            workers = self.config.num_workers,
            "Starting LSH recommendation job"
        );

        let items: Arc<[_]> = self.source.read_items()?.into();

        let driver = match &self.stage {
            Some(stage) => IterationDriver::with_stage(
                self.config.clone(),
                Arc::clone(&self.seeds),
                Arc::clone(stage),
            ),
            None => IterationDriver::new(self.config.clone(), Arc::clone(&self.seeds)),
        };
        let mut driver = driver.with_retry(self.retry.clone());
        let DriverOutput {
            recommendations,
            seeds,
            stats,
        } = driver.run(items, &cancel).await?;

        let report = JobReport {
            run_key: run_key.clone(),
            items: recommendations.len(),
            items_with_recommendations: recommendations.non_empty_count(),
            stats,
        };

        let artifact = RunArtifact {
            run_key,
            recommendations,
            seeds,
        };
        self.sink.publish(&artifact).await?;

        info!(
            items = report.items,
            with_recommendations = report.items_with_recommendations,
            input_records = report.stats.input_records,
            duration_ms = report.stats.total_duration_ms,
            "LSH recommendation job completed"
        );

        Ok(report)
    }
}
