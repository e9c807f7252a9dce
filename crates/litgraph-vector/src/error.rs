use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorizeError {
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Embedding batch timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("Dimension mismatch: expected {0}, got {1}")]
    DimensionMismatch(usize, usize),

    #[error("No usable tokens in any concept name or definition")]
    EmptyVocabulary,
}

impl From<VectorizeError> for litgraph_core::LitGraphError {
    fn from(err: VectorizeError) -> Self {
        litgraph_core::LitGraphError::InvalidOperation(err.to_string())
    }
}
