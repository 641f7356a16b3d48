// ============================================
// Cluster Extractor
// ============================================
//
// One clustering pass under one seed:
// 1. Map: each worker computes signatures for its partition of the items
//    and groups item ids by signature
// 2. Shuffle: partial groupings are merged per signature (barrier)
// 3. Reduce: groups within [min_cluster_size, max_cluster_size] become
//    clusters, everything else is dropped
//
// Dropped groups are expected noise, not errors. Items without features
// all share the sentinel signature, so each one is grouped under its own
// key and can never cluster with another featureless item.

use crate::config::LshConfig;
use crate::error::{AppError, Result};
use crate::models::{Cluster, HashSeed, Item, ItemId, Signature};
use crate::services::minhash::MinWiseFunction;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Grouping key of the map step
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Signature(Signature),
    /// Featureless item, always a group of one
    Featureless(ItemId),
}

/// Item ids grouped by signature
pub type SignatureGroups = HashMap<GroupKey, Vec<ItemId>>;

/// Result of one clustering pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterExtraction {
    pub seed: HashSeed,
    /// Valid clusters, members sorted, clusters ordered by first member
    pub clusters: Vec<Cluster>,
    /// Number of items read by the pass
    pub input_records: u64,
    pub dropped_undersized: u64,
    pub dropped_oversized: u64,
}

/// Execution substrate for a clustering pass.
///
/// Implementations must be deterministic for a given seed so a failed pass
/// can be re-run with the same seed.
#[async_trait]
pub trait ClusterStage: Send + Sync {
    async fn run_stage(
        &self,
        iteration: u32,
        items: Arc<[Item]>,
        seed: HashSeed,
    ) -> Result<ClusterExtraction>;
}

/// Reject inputs that reuse an item identifier
pub fn validate_items(items: &[Item]) -> Result<()> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.id) {
            return Err(AppError::DuplicateItem(item.id));
        }
    }
    Ok(())
}

/// Map step: group one partition by signature
pub fn group_partition(function: &MinWiseFunction, items: &[Item]) -> SignatureGroups {
    let mut groups: SignatureGroups = HashMap::new();
    for item in items {
        let key = if item.features.is_empty() {
            GroupKey::Featureless(item.id)
        } else {
            GroupKey::Signature(function.signature(&item.features))
        };
        groups.entry(key).or_default().push(item.id);
    }
    groups
}

/// Shuffle step: combine partial groupings from every worker
pub fn merge_groups<I>(partials: I) -> SignatureGroups
where
    I: IntoIterator<Item = SignatureGroups>,
{
    let mut merged: SignatureGroups = HashMap::new();
    for partial in partials {
        for (signature, members) in partial {
            merged.entry(signature).or_default().extend(members);
        }
    }
    merged
}

/// Reduce step: keep groups whose size lies within the configured bounds
pub fn select_clusters(
    groups: SignatureGroups,
    min_cluster_size: u64,
    max_cluster_size: u64,
) -> (Vec<Cluster>, u64, u64) {
    let mut clusters = Vec::new();
    let mut undersized = 0u64;
    let mut oversized = 0u64;

    for (_, members) in groups {
        let size = members.len() as u64;
        if size < min_cluster_size {
            undersized += 1;
        } else if size > max_cluster_size {
            oversized += 1;
        } else {
            clusters.push(Cluster::new(members));
        }
    }

    clusters.sort_unstable_by(|a, b| a.members.cmp(&b.members));
    (clusters, undersized, oversized)
}

/// Clustering pass over a worker pool of blocking tasks
#[derive(Debug, Clone)]
pub struct ClusterExtractor {
    depth: usize,
    min_cluster_size: u64,
    max_cluster_size: u64,
    num_workers: usize,
}

impl ClusterExtractor {
    pub fn new(config: &LshConfig) -> Self {
        Self {
            depth: config.depth,
            min_cluster_size: config.min_cluster_size,
            max_cluster_size: config.max_cluster_size,
            num_workers: config.num_workers.max(1),
        }
    }

    /// Run the pass on the calling thread
    pub fn extract(&self, items: &[Item], seed: HashSeed) -> Result<ClusterExtraction> {
        validate_items(items)?;
        let function = MinWiseFunction::new(seed, self.depth);
        let groups = group_partition(&function, items);
        Ok(self.finish(groups, seed, items.len()))
    }

    /// Run the pass with the map step partitioned across `num_workers` tasks
    pub async fn extract_parallel(
        &self,
        iteration: u32,
        items: Arc<[Item]>,
        seed: HashSeed,
    ) -> Result<ClusterExtraction> {
        validate_items(&items)?;

        let total = items.len();
        let chunk = total.div_ceil(self.num_workers).max(1);
        let function = Arc::new(MinWiseFunction::new(seed, self.depth));

        let mut handles = Vec::with_capacity(self.num_workers);
        for start in (0..total).step_by(chunk) {
            let end = (start + chunk).min(total);
            let items = Arc::clone(&items);
            let function = Arc::clone(&function);
            handles.push(tokio::task::spawn_blocking(move || {
                group_partition(&function, &items[start..end])
            }));
        }

        debug!(
            iteration,
            partitions = handles.len(),
            items = total,
            "Map phase dispatched"
        );

        // Barrier: every partition must finish before any group is filtered
        let mut partials = Vec::with_capacity(handles.len());
        for handle in handles {
            let partial = handle.await.map_err(|e| AppError::ExecutionStage {
                iteration,
                reason: e.to_string(),
            })?;
            partials.push(partial);
        }

        Ok(self.finish(merge_groups(partials), seed, total))
    }

    fn finish(&self, groups: SignatureGroups, seed: HashSeed, total: usize) -> ClusterExtraction {
        let group_count = groups.len();
        let (clusters, dropped_undersized, dropped_oversized) =
            select_clusters(groups, self.min_cluster_size, self.max_cluster_size);

        info!(
            seed = %seed,
            items = total,
            groups = group_count,
            clusters = clusters.len(),
            dropped_undersized,
            dropped_oversized,
            "Clustering pass completed"
        );

        ClusterExtraction {
            seed,
            clusters,
            input_records: total as u64,
            dropped_undersized,
            dropped_oversized,
        }
    }
}

#[async_trait]
impl ClusterStage for ClusterExtractor {
    async fn run_stage(
        &self,
        iteration: u32,
        items: Arc<[Item]>,
        seed: HashSeed,
    ) -> Result<ClusterExtraction> {
        self.extract_parallel(iteration, items, seed).await
    }
}
