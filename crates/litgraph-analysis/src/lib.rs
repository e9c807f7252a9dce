//! Concept clustering, structural gap detection and research-opportunity
//! scoring, tied together by [`AnalysisOrchestrator`].

pub mod clustering;
pub mod error;
pub mod gaps;
pub mod index;
pub mod labeling;
pub mod metrics;
pub mod orchestrator;
pub mod scoring;
pub mod store;

pub use clustering::{ClusteringEngine, ClusteringOutcome, ClusteringResult};
pub use error::{AnalysisError, Result};
pub use gaps::{ClusterGeometry, GapDetector, GapReport, PairGeometry};
pub use index::VectorIndex;
pub use labeling::{keyword_label, ClusterLabeler};
pub use metrics::MetricKind;
pub use orchestrator::{AnalysisOrchestrator, AnalysisState, OrchestratorBuilder, ProjectStatus};
pub use scoring::{GapScore, ScoringContext, ScoringEngine};
pub use store::{Dataset, InMemoryAnalysisStore};
