use std::collections::HashMap;
use std::sync::Arc;

use litgraph_core::{
    Concept, ConceptVector, EmbeddingConfig, ExcludedConcept, ExclusionReason, VectorSource,
    VectorizerConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::VectorizeError;
use crate::ops::{is_usable, l2_norm};
use crate::provider::EmbeddingProvider;
use crate::tfidf::{tokenize, TfidfModel};

/// Why the TF-IDF path was taken instead of external embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FallbackReason {
    ProviderNotConfigured,
    TooFewConcepts { found: usize, required: usize },
    ProviderFailed { error: String },
    InsufficientEmbeddings { usable: usize, required: usize },
}

#[derive(Debug, Clone)]
pub struct Vectorization {
    pub vectors: Vec<ConceptVector>,
    pub source: VectorSource,
    pub excluded: Vec<ExcludedConcept>,
    pub fallback_reason: Option<FallbackReason>,
}

/// Produces one vector per concept, preferring the external provider.
pub struct Vectorizer {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    embedding: EmbeddingConfig,
    config: VectorizerConfig,
}

impl Vectorizer {
    pub fn new(
        provider: Option<Arc<dyn EmbeddingProvider>>,
        embedding: EmbeddingConfig,
        config: VectorizerConfig,
    ) -> Self {
        Self {
            provider,
            embedding,
            config,
        }
    }

    /// TF-IDF only.
    pub fn local(config: VectorizerConfig) -> Self {
        Self::new(None, EmbeddingConfig::default(), config)
    }

    pub async fn vectorize(&self, concepts: &[Concept]) -> Result<Vectorization, VectorizeError> {
        let required = self.embedding.min_embedded_concepts;

        let reason = match &self.provider {
            Some(provider) if self.embedding.enabled && concepts.len() >= required => {
                match self.embed_all(provider.as_ref(), concepts).await {
                    Ok(embedded) => {
                        let usable = embedded.iter().filter(|v| v.is_some()).count();
                        if usable >= required {
                            return Ok(Self::from_embeddings(concepts, embedded));
                        }
                        FallbackReason::InsufficientEmbeddings { usable, required }
                    }
                    Err(e) => FallbackReason::ProviderFailed {
                        error: e.to_string(),
                    },
                }
            }
            Some(_) if self.embedding.enabled => FallbackReason::TooFewConcepts {
                found: concepts.len(),
                required,
            },
            _ => FallbackReason::ProviderNotConfigured,
        };

        match &reason {
            FallbackReason::ProviderFailed { error } => {
                warn!(%error, "embedding provider failed, falling back to TF-IDF")
            }
            other => debug!(reason = ?other, "using TF-IDF vectors"),
        }
        self.tfidf(concepts, reason)
    }

    /// Embed every concept in batches; any failed or timed-out batch fails the whole path.
    async fn embed_all(
        &self,
        provider: &dyn EmbeddingProvider,
        concepts: &[Concept],
    ) -> Result<Vec<Option<Vec<f32>>>, VectorizeError> {
        let timeout = self.embedding.batch_timeout();
        let mut out: Vec<Option<Vec<f32>>> = Vec::with_capacity(concepts.len());

        for batch in concepts.chunks(self.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(Concept::embedding_text).collect();
            let vectors = match tokio::time::timeout(timeout, provider.embed(&texts)).await {
                Err(_) => return Err(VectorizeError::EmbeddingTimeout(timeout)),
                Ok(Err(e)) => return Err(VectorizeError::EmbeddingUnavailable(e.to_string())),
                Ok(Ok(None)) => {
                    return Err(VectorizeError::EmbeddingUnavailable(format!(
                        "{} returned no vectors",
                        provider.provider_name()
                    )))
                }
                Ok(Ok(Some(vectors))) => vectors,
            };
            if vectors.len() != batch.len() {
                return Err(VectorizeError::EmbeddingUnavailable(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            out.extend(
                vectors
                    .into_iter()
                    .map(|v| if is_usable(&v) { Some(v) } else { None }),
            );
        }

        // Vectors outside the dominant dimension are unusable.
        let mut dims: HashMap<usize, usize> = HashMap::new();
        for v in out.iter().flatten() {
            *dims.entry(v.len()).or_insert(0) += 1;
        }
        if let Some((&dim, _)) = dims
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        {
            for slot in out.iter_mut() {
                if slot.as_ref().is_some_and(|v| v.len() != dim) {
                    *slot = None;
                }
            }
        }

        Ok(out)
    }

    fn from_embeddings(concepts: &[Concept], embedded: Vec<Option<Vec<f32>>>) -> Vectorization {
        let mut vectors = Vec::with_capacity(concepts.len());
        let mut excluded = Vec::new();
        for (concept, vector) in concepts.iter().zip(embedded) {
            match vector {
                Some(vector) => vectors.push(ConceptVector {
                    concept_id: concept.id,
                    vector,
                    source: VectorSource::Embedding,
                }),
                None => excluded.push(ExcludedConcept {
                    concept_id: concept.id,
                    reason: ExclusionReason::MissingEmbedding,
                }),
            }
        }
        info!(
            vectors = vectors.len(),
            excluded = excluded.len(),
            "vectorized concepts with external embeddings"
        );
        Vectorization {
            vectors,
            source: VectorSource::Embedding,
            excluded,
            fallback_reason: None,
        }
    }

    fn tfidf(
        &self,
        concepts: &[Concept],
        reason: FallbackReason,
    ) -> Result<Vectorization, VectorizeError> {
        let cap = self.config.fallback_cap;
        let (kept, overflow) = concepts.split_at(concepts.len().min(cap));
        let excluded: Vec<ExcludedConcept> = overflow
            .iter()
            .map(|c| ExcludedConcept {
                concept_id: c.id,
                reason: ExclusionReason::FallbackCapExceeded,
            })
            .collect();
        if !excluded.is_empty() {
            warn!(
                cap,
                excluded = excluded.len(),
                "concepts beyond the TF-IDF cap excluded from clustering"
            );
        }

        if kept.is_empty() {
            return Ok(Vectorization {
                vectors: Vec::new(),
                source: VectorSource::Tfidf,
                excluded,
                fallback_reason: Some(reason),
            });
        }

        let docs: Vec<Vec<String>> = kept
            .iter()
            .map(|c| tokenize(&c.embedding_text()))
            .collect();
        let model = TfidfModel::fit(&docs, self.config.max_features)?;
        let mut excluded = excluded;
        let mut vectors = Vec::with_capacity(kept.len());
        for (concept, tokens) in kept.iter().zip(&docs) {
            let vector = model.transform(tokens);
            // No term in the vocabulary: the row carries no direction to cluster on.
            if l2_norm(&vector) == 0.0 {
                excluded.push(ExcludedConcept {
                    concept_id: concept.id,
                    reason: ExclusionReason::EmptyTfidfVector,
                });
                continue;
            }
            vectors.push(ConceptVector {
                concept_id: concept.id,
                vector,
                source: VectorSource::Tfidf,
            });
        }

        info!(
            vectors = vectors.len(),
            excluded = excluded.len(),
            features = model.dimension(),
            "vectorized concepts with TF-IDF"
        );
        Ok(Vectorization {
            vectors,
            source: VectorSource::Tfidf,
            excluded,
            fallback_reason: Some(reason),
        })
    }
}
