use crate::error::{AppError, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub redis: RedisConfig,
    pub lsh: LshConfig,
    pub retry: StageRetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// Prefix for every key the run writes (`{prefix}:item:related:{id}`)
    pub key_prefix: String,
}

/// Algorithm parameters, passed explicitly to every component
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LshConfig {
    /// Number of minhash levels per signature
    pub depth: usize,
    /// Number of clustering passes, each with a fresh seed
    pub iterate: u32,
    /// Smallest cluster that contributes relations
    pub min_cluster_size: u64,
    /// Largest cluster that contributes relations
    pub max_cluster_size: u64,
    /// Upper bound on recommendations per item
    pub max_recommend: u64,
    /// Blocking workers used inside one clustering pass
    pub num_workers: usize,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            depth: 1,
            iterate: 5,
            min_cluster_size: 2,
            max_cluster_size: 50,
            max_recommend: 10,
            num_workers: default_workers(),
        }
    }
}

impl LshConfig {
    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 {
            return Err(AppError::Configuration("depth must be > 0".to_string()));
        }
        if self.iterate == 0 {
            return Err(AppError::Configuration("iterate must be > 0".to_string()));
        }
        if self.num_workers == 0 {
            return Err(AppError::Configuration(
                "num_workers must be > 0".to_string(),
            ));
        }
        if self.max_recommend == 0 {
            return Err(AppError::Configuration(
                "max_recommend must be > 0".to_string(),
            ));
        }
        if self.min_cluster_size > self.max_cluster_size {
            return Err(AppError::Configuration(format!(
                "min_cluster_size ({}) exceeds max_cluster_size ({})",
                self.min_cluster_size, self.max_cluster_size
            )));
        }
        Ok(())
    }
}

/// Retry policy for a failed clustering pass
#[derive(Debug, Clone, Deserialize)]
pub struct StageRetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for StageRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
        }
    }
}

impl StageRetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// `LSH_*` environment overrides, every field optional
#[derive(Debug, Default, Deserialize)]
struct LshEnv {
    depth: Option<usize>,
    iterate: Option<u32>,
    min_cluster: Option<u64>,
    max_cluster: Option<u64>,
    max_recommend: Option<u64>,
    workers: Option<usize>,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let lsh_env: LshEnv = envy::prefixed("LSH_").from_env()?;
        let defaults = LshConfig::default();
        let lsh = LshConfig {
            depth: lsh_env.depth.unwrap_or(defaults.depth),
            iterate: lsh_env.iterate.unwrap_or(defaults.iterate),
            min_cluster_size: lsh_env.min_cluster.unwrap_or(defaults.min_cluster_size),
            max_cluster_size: lsh_env.max_cluster.unwrap_or(defaults.max_cluster_size),
            max_recommend: lsh_env.max_recommend.unwrap_or(defaults.max_recommend),
            num_workers: lsh_env.workers.unwrap_or(defaults.num_workers),
        };

        Ok(Config {
            service: ServiceConfig {
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "related-items-service".to_string()),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
                key_prefix: env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "lsh".to_string()),
            },
            lsh,
            retry: StageRetryConfig {
                max_retries: parse_env("STAGE_MAX_RETRIES", 3)?,
                initial_backoff_ms: parse_env("STAGE_INITIAL_BACKOFF_MS", 200)?,
                max_backoff_ms: parse_env("STAGE_MAX_BACKOFF_MS", 10_000)?,
            },
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Configuration(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LshConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_cluster_size, 2);
        assert!(config.num_workers > 0);
    }

    #[test]
    fn test_validate_rejects_inverted_cluster_bounds() {
        let config = LshConfig {
            min_cluster_size: 10,
            max_cluster_size: 3,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_zero_depth() {
        let config = LshConfig {
            depth: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lsh_env_reads_prefixed_vars() {
        let vars = vec![
            ("LSH_DEPTH".to_string(), "3".to_string()),
            ("LSH_MAX_RECOMMEND".to_string(), "25".to_string()),
        ];
        let parsed: LshEnv = envy::prefixed("LSH_").from_iter(vars).unwrap();
        assert_eq!(parsed.depth, Some(3));
        assert_eq!(parsed.max_recommend, Some(25));
        assert_eq!(parsed.iterate, None);
    }
}
