//! Result types produced by one analysis run.

use crate::{ConceptId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

pub type GapId = Uuid;
pub type RunId = Uuid;

/// Where a concept vector came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorSource {
    Embedding,
    Tfidf,
}

impl fmt::Display for VectorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorSource::Embedding => write!(f, "embedding"),
            VectorSource::Tfidf => write!(f, "tfidf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptVector {
    pub concept_id: ConceptId,
    pub vector: Vec<f32>,
    pub source: VectorSource,
}

/// Why a concept was left out of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// The embedding path succeeded but returned no usable vector for this concept.
    MissingEmbedding,
    /// The concept fell beyond the TF-IDF fallback cap.
    FallbackCapExceeded,
    /// None of the concept's terms made it into the TF-IDF vocabulary.
    EmptyTfidfVector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedConcept {
    pub concept_id: ConceptId,
    pub reason: ExclusionReason,
}

/// Structured reason for skipping gap detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientConcepts,
    DegenerateClustering,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InsufficientConcepts => "insufficient_concepts",
            SkipReason::DegenerateClustering => "degenerate_clustering",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: u32,
    pub concept_ids: BTreeSet<ConceptId>,
    pub centroid: Vec<f32>,
    pub size: usize,
    /// Internal relationship density in [0, 1].
    pub density: f64,
    pub label: String,
}

impl Cluster {
    pub fn contains(&self, concept_id: &ConceptId) -> bool {
        self.concept_ids.contains(concept_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralityRecord {
    pub concept_id: ConceptId,
    pub degree: f64,
    pub betweenness: f64,
    pub pagerank: f64,
    pub cluster_id: Option<u32>,
}

/// A hypothesized connection between two gapped clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialEdge {
    pub source_id: ConceptId,
    pub target_id: ConceptId,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralGap {
    pub id: GapId,
    pub cluster_a_id: u32,
    pub cluster_b_id: u32,
    /// Opportunity value: `1 - normalized_strength`.
    pub gap_strength: f64,
    pub normalized_strength: f64,
    pub semantic_distance: f64,
    /// Share of sampled cross-cluster pairs above the potential-edge threshold.
    pub similar_pair_ratio: f64,
    pub bridge_candidates: Vec<ConceptId>,
    pub potential_edges: Vec<PotentialEdge>,
    pub impact_score: f64,
    pub feasibility_score: f64,
    #[serde(default)]
    pub hypothesis: Option<Hypothesis>,
}

impl StructuralGap {
    /// Filled portion of an opportunity indicator, 0..=100.
    pub fn opportunity_percent(&self) -> u8 {
        (self.gap_strength.clamp(0.0, 1.0) * 100.0).round() as u8
    }

    pub fn involves(&self, cluster_id: u32) -> bool {
        self.cluster_a_id == cluster_id || self.cluster_b_id == cluster_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoGapsReason {
    FewerThanTwoEligibleClusters,
}

/// The rows a successful run replaces atomically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub clusters: Vec<Cluster>,
    pub gaps: Vec<StructuralGap>,
    pub centrality: Vec<CentralityRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub project_id: ProjectId,
    pub vector_source: VectorSource,
    pub concepts_analyzed: usize,
    pub excluded: Vec<ExcludedConcept>,
    pub cluster_count: usize,
    pub silhouette: f64,
    pub gap_count: usize,
    pub no_gaps_reason: Option<NoGapsReason>,
    pub labels_from_llm: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
