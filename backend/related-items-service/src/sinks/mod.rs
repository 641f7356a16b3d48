use crate::error::{AppError, Result};
use crate::models::{HashSeed, ItemId, RunArtifact};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use tracing::info;

/// Redis key prefixes
const RELATED_ITEMS_KEY: &str = "item:related:";
const SEED_LOG_KEY: &str = "seeds:";

/// Key-value sink receiving the final output of a run.
///
/// `publish` is all-or-nothing: on error nothing of the artifact may remain
/// visible to readers.
#[async_trait]
pub trait RecommendationSink: Send + Sync {
    async fn publish(&self, artifact: &RunArtifact) -> Result<()>;
}

/// Sink keeping the last published artifact in memory
#[derive(Default)]
pub struct MemorySink {
    published: Mutex<Option<RunArtifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Option<RunArtifact> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl RecommendationSink for MemorySink {
    async fn publish(&self, artifact: &RunArtifact) -> Result<()> {
        *self.published.lock() = Some(artifact.clone());
        Ok(())
    }
}

pub fn related_key(prefix: &str, source: ItemId) -> String {
    format!("{}:{}{}", prefix, RELATED_ITEMS_KEY, source)
}

pub fn seeds_key(prefix: &str, run_key: &str) -> String {
    format!("{}:{}{}", prefix, SEED_LOG_KEY, run_key)
}

/// Redis-backed sink.
///
/// Layout:
/// - `{prefix}:item:related:{id}` -> List of candidate ids, best first
/// - `{prefix}:seeds:{run_key}` -> JSON array of the run's seeds
///
/// Everything is written in a single MULTI/EXEC transaction. Items without
/// recommendations have their key removed.
pub struct RedisSink {
    redis_client: redis::Client,
    key_prefix: String,
}

impl RedisSink {
    pub fn new(redis_client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            redis_client,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn from_url(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let redis_client = redis::Client::open(url)?;
        Ok(Self::new(redis_client, key_prefix))
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.redis_client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::StorageUnavailable(format!("failed to get Redis connection: {e}")))
    }

    /// Stored recommendations for one item, best first
    pub async fn fetch_recommendations(&self, source: ItemId) -> Result<Vec<ItemId>> {
        let mut conn = self.connection().await?;
        let candidates: Vec<ItemId> = conn
            .lrange(related_key(&self.key_prefix, source), 0, -1)
            .await?;
        Ok(candidates)
    }

    /// Seed log of a previous run, if one was published for this input
    pub async fn fetch_seeds(&self, run_key: &str) -> Result<Option<Vec<HashSeed>>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(seeds_key(&self.key_prefix, run_key)).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }
}

#[async_trait]
impl RecommendationSink for RedisSink {
    async fn publish(&self, artifact: &RunArtifact) -> Result<()> {
        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (source, candidates) in artifact.recommendations.iter() {
            let key = related_key(&self.key_prefix, source);
            pipe.del(&key).ignore();
            if !candidates.is_empty() {
                pipe.rpush(&key, candidates).ignore();
            }
        }

        let seed_log = serde_json::to_string(&artifact.seeds)?;
        pipe.set(seeds_key(&self.key_prefix, &artifact.run_key), seed_log)
            .ignore();

        pipe.query_async::<_, ()>(&mut conn).await?;

        info!(
            items = artifact.recommendations.len(),
            with_recommendations = artifact.recommendations.non_empty_count(),
            seeds = artifact.seeds.len(),
            run_key = %artifact.run_key,
            "Published recommendations to Redis"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecommendationSet;

    #[test]
    fn test_key_format() {
        assert_eq!(related_key("lsh", 42), "lsh:item:related:42");
        assert_eq!(
            seeds_key("lsh", "data/items.tsv"),
            "lsh:seeds:data/items.tsv"
        );
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_artifact() {
        let sink = MemorySink::new();
        assert!(sink.published().is_none());

        let mut recommendations = RecommendationSet::new();
        recommendations.insert(1, vec![2]);
        let artifact = RunArtifact {
            run_key: "test".to_string(),
            recommendations,
            seeds: vec![HashSeed(11)],
        };
        sink.publish(&artifact).await.unwrap();

        assert_eq!(sink.published(), Some(artifact));
    }

    #[test]
    fn test_redis_sink_rejects_bad_url() {
        assert!(matches!(
            RedisSink::from_url("not a url", "lsh"),
            Err(AppError::StorageUnavailable(_))
        ));
    }
}
