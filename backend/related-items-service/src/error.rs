use crate::models::ItemId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Malformed input at record {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Malformed input: duplicate item id {0}")]
    DuplicateItem(ItemId),

    #[error("Seed exhaustion: {0}")]
    SeedExhaustion(String),

    #[error("Execution stage failure in iteration {iteration}: {reason}")]
    ExecutionStage { iteration: u32, reason: String },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Run cancelled after {completed_iterations} completed iterations")]
    Cancelled { completed_iterations: u32 },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Only stage failures are retried; clustering is deterministic for a given seed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ExecutionStage { .. })
    }

    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            AppError::MalformedRecord { .. } | AppError::DuplicateItem(_)
        )
    }
}

// Implement conversions from other error types
impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<envy::Error> for AppError {
    fn from(err: envy::Error) -> Self {
        AppError::Configuration(err.to_string())
    }
}
