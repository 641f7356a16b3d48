pub mod aggregation;
pub mod clustering;
pub mod driver;
pub mod minhash;
pub mod seed;
pub mod selection;

pub use aggregation::CandidateRelations;
pub use clustering::{ClusterExtraction, ClusterExtractor, ClusterStage, GroupKey};
pub use driver::{DriverOutput, DriverState, IterationDriver, RunStats};
pub use minhash::MinWiseFunction;
pub use seed::SeedManager;
pub use selection::RecommendationSelector;
