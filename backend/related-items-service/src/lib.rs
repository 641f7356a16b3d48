pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod sinks;
pub mod sources;

pub use config::{Config, LshConfig};
pub use error::{AppError, Result};
pub use jobs::{JobReport, LshRecommendationJob};
pub use services::{
    CandidateRelations, ClusterExtractor, IterationDriver, MinWiseFunction,
    RecommendationSelector, SeedManager,
};
