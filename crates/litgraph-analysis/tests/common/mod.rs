#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use litgraph_analysis::{AnalysisOrchestrator, InMemoryAnalysisStore};
use litgraph_core::{
    AnalysisSnapshot, AnalysisStore, CentralityRecord, Cluster, Concept, ConceptId, EntityType,
    GapContext, Hypothesis, LitGraphError, LlmInsightProvider, ProjectId, RelationKind,
    Relationship, Settings, StructuralGap,
};
use litgraph_vector::EmbeddingProvider;
use uuid::Uuid;

pub const TOPICS: [(&[&str; 4], &[&str; 6]); 3] = [
    (
        &["neural", "transformer", "attention", "embedding"],
        &["bert", "gpt", "lstm", "convolution", "dropout", "softmax"],
    ),
    (
        &["soil", "nitrogen", "irrigation", "fertilizer"],
        &["wheat", "maize", "drought", "compost", "tillage", "rainfall"],
    ),
    (
        &["galaxy", "telescope", "redshift", "cosmology"],
        &["quasar", "nebula", "pulsar", "supernova", "exoplanet", "spectroscopy"],
    ),
];

const TYPES: [EntityType; 6] = [
    EntityType::Method,
    EntityType::Concept,
    EntityType::Dataset,
    EntityType::Finding,
    EntityType::Problem,
    EntityType::Metric,
];

pub fn concept_id(topic: usize, member: usize) -> ConceptId {
    Uuid::from_u128(((topic as u128 + 1) << 8) | member as u128)
}

/// Three topics of six concepts each; relationships chain members within a
/// topic and never cross topics.
pub fn topical_dataset() -> (Vec<Concept>, Vec<Relationship>) {
    let mut concepts = Vec::new();
    let mut relationships = Vec::new();
    for (t, (core, uniques)) in TOPICS.iter().enumerate() {
        for (m, unique) in uniques.iter().enumerate() {
            concepts.push(
                Concept::new(*unique, TYPES[m])
                    .with_id(concept_id(t, m))
                    .with_definition(core.join(" ")),
            );
            if m > 0 {
                relationships.push(Relationship::new(
                    concept_id(t, m - 1),
                    concept_id(t, m),
                    RelationKind::Uses,
                ));
            }
        }
    }
    (concepts, relationships)
}

pub fn seeded_store() -> (Arc<InMemoryAnalysisStore>, ProjectId) {
    let store = Arc::new(InMemoryAnalysisStore::new());
    let project = store.create_project();
    let (concepts, relationships) = topical_dataset();
    store.upsert_concepts(project, concepts).unwrap();
    store.upsert_relationships(project, relationships).unwrap();
    (store, project)
}

pub fn orchestrator(store: Arc<InMemoryAnalysisStore>) -> AnalysisOrchestrator {
    AnalysisOrchestrator::new(Settings::default(), store)
}

/// Embeds by topic keyword, optionally after a delay.
pub struct TopicEmbedder {
    pub calls: AtomicUsize,
    pub delay: Duration,
}

impl TopicEmbedder {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Option<Vec<Vec<f32>>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Some(
            texts
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    let mut v = vec![0.0f32; 9];
                    let topic = TOPICS
                        .iter()
                        .position(|(core, _)| text.contains(core[0]))
                        .unwrap_or(0);
                    v[topic] = 1.0;
                    v[3 + i % 6] = 0.3;
                    v
                })
                .collect(),
        ))
    }

    fn provider_name(&self) -> &str {
        "topic-embedder"
    }
}

/// Labels clusters after their first concept and proposes fixed hypotheses.
pub struct ScriptedLlm;

#[async_trait]
impl LlmInsightProvider for ScriptedLlm {
    async fn summarize_label(&self, concept_names: &[String]) -> anyhow::Result<String> {
        Ok(format!("{} research", concept_names.join("+")))
    }

    async fn generate_hypothesis(&self, context: &GapContext) -> anyhow::Result<Hypothesis> {
        Ok(Hypothesis {
            text: format!(
                "Methods from {} may transfer to {}",
                context.cluster_a_label, context.cluster_b_label
            ),
            confidence: 1.7,
        })
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

/// Wraps the in-memory store and injects write failures or a project that
/// disappears between the existence check and the loads.
pub struct FaultyStore {
    pub inner: Arc<InMemoryAnalysisStore>,
    pub fail_writes: bool,
    pub vanish_on_load: bool,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryAnalysisStore>) -> Self {
        Self {
            inner,
            fail_writes: false,
            vanish_on_load: false,
        }
    }
}

#[async_trait]
impl AnalysisStore for FaultyStore {
    async fn project_exists(&self, project_id: ProjectId) -> litgraph_core::Result<bool> {
        self.inner.project_exists(project_id).await
    }

    async fn load_concepts(&self, project_id: ProjectId) -> litgraph_core::Result<Vec<Concept>> {
        if self.vanish_on_load {
            return Err(LitGraphError::ProjectNotFound(project_id));
        }
        self.inner.load_concepts(project_id).await
    }

    async fn load_relationships(
        &self,
        project_id: ProjectId,
    ) -> litgraph_core::Result<Vec<Relationship>> {
        self.inner.load_relationships(project_id).await
    }

    async fn replace_analysis(
        &self,
        project_id: ProjectId,
        snapshot: AnalysisSnapshot,
    ) -> litgraph_core::Result<()> {
        if self.fail_writes {
            return Err(LitGraphError::Storage("disk full".into()));
        }
        self.inner.replace_analysis(project_id, snapshot).await
    }

    async fn load_clusters(&self, project_id: ProjectId) -> litgraph_core::Result<Vec<Cluster>> {
        self.inner.load_clusters(project_id).await
    }

    async fn load_gaps(&self, project_id: ProjectId) -> litgraph_core::Result<Vec<StructuralGap>> {
        self.inner.load_gaps(project_id).await
    }

    async fn load_centrality(
        &self,
        project_id: ProjectId,
    ) -> litgraph_core::Result<Vec<CentralityRecord>> {
        self.inner.load_centrality(project_id).await
    }
}
