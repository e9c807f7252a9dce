use litgraph_core::{LitGraphError, ProjectId, SkipReason};
use litgraph_vector::VectorizeError;
use thiserror::Error;

/// Failures surfaced by the orchestrator.
///
/// `Clone` so one shared refresh can hand the same outcome to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(SkipReason),

    #[error("Analysis for project {0} is already computing")]
    Busy(ProjectId),

    #[error("Analysis for project {0} was cancelled")]
    Cancelled(ProjectId),

    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Vectorization failed: {0}")]
    Vectorize(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LitGraphError> for AnalysisError {
    fn from(err: LitGraphError) -> Self {
        match err {
            LitGraphError::ProjectNotFound(id) => AnalysisError::ProjectNotFound(id),
            other => AnalysisError::Storage(other.to_string()),
        }
    }
}

impl From<VectorizeError> for AnalysisError {
    fn from(err: VectorizeError) -> Self {
        AnalysisError::Vectorize(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
