pub mod error;
pub mod ops;
pub mod provider;
pub mod tfidf;
pub mod vectorizer;

pub use error::VectorizeError;
pub use ops::*;
pub use provider::EmbeddingProvider;
pub use tfidf::TfidfModel;
pub use vectorizer::{FallbackReason, Vectorization, Vectorizer};
