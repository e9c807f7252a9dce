use crate::analysis::{AnalysisSnapshot, CentralityRecord, Cluster, Hypothesis, StructuralGap};
use crate::{Concept, ProjectId, Relationship, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Context handed to the LLM collaborator when asking for a research hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapContext {
    pub cluster_a_label: String,
    pub cluster_b_label: String,
    pub cluster_a_concepts: Vec<String>,
    pub cluster_b_concepts: Vec<String>,
    pub bridge_concepts: Vec<String>,
    pub gap_strength: f64,
}

/// Optional language-model collaborator for labels and hypotheses.
///
/// Callers always wrap these in a timeout and fall back on failure, so
/// implementations may simply propagate transport errors.
#[async_trait]
pub trait LlmInsightProvider: Send + Sync {
    async fn summarize_label(&self, concept_names: &[String]) -> anyhow::Result<String>;

    async fn generate_hypothesis(&self, context: &GapContext) -> anyhow::Result<Hypothesis>;

    fn provider_name(&self) -> &str;
}

/// Persistence contract of the engine.
///
/// `replace_analysis` must swap the previous run's rows for the project in a
/// single step; readers never observe a mix of two runs.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn project_exists(&self, project_id: ProjectId) -> Result<bool>;

    async fn load_concepts(&self, project_id: ProjectId) -> Result<Vec<Concept>>;

    async fn load_relationships(&self, project_id: ProjectId) -> Result<Vec<Relationship>>;

    async fn replace_analysis(
        &self,
        project_id: ProjectId,
        snapshot: AnalysisSnapshot,
    ) -> Result<()>;

    async fn load_clusters(&self, project_id: ProjectId) -> Result<Vec<Cluster>>;

    async fn load_gaps(&self, project_id: ProjectId) -> Result<Vec<StructuralGap>>;

    async fn load_centrality(&self, project_id: ProjectId) -> Result<Vec<CentralityRecord>>;
}
