pub mod analysis;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use analysis::*;
pub use config::{
    CentralityConfig, ClusteringConfig, EmbeddingConfig, GapConfig, LlmConfig, LoggingConfig,
    MetricsConfig, ScoringConfig, Settings, VectorizerConfig,
};
pub use error::*;
pub use traits::*;
pub use types::*;
