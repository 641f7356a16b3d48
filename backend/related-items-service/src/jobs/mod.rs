// ============================================
// Batch Jobs Module
// ============================================
//
// Contains batch job runners for:
// 1. LSH related-item recommendations
//
// These jobs can be triggered via:
// - CronJob (Kubernetes)
// - Command line (related-items-service -input ... -output ...)

pub mod lsh_recommendations;

pub use lsh_recommendations::{JobReport, LshRecommendationJob};
