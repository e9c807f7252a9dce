//! Single-flight analysis runs and the read-side API over their results.
//!
//! `refresh` drives the full pipeline for one project:
//! vectorize, cluster, label, build the graph, compute centrality while the
//! gap geometry is prepared, detect and score gaps, optionally ask for
//! hypotheses, then replace the persisted rows in one step. Concurrent callers
//! for the same project attach to the run already in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use litgraph_cache::{system_clock, Clock, MetricsCache};
use litgraph_core::{
    AnalysisSnapshot, AnalysisStore, CentralityRecord, Cluster, Concept, ConceptId, GapContext,
    LitGraphError, LlmInsightProvider, ProjectId, RunSummary, Settings, SkipReason, StructuralGap,
};
use litgraph_graph::{CentralityAnalyzer, ConceptGraph};
use litgraph_vector::{EmbeddingProvider, VectorizeError, Vectorizer};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::clustering::{ClusteringEngine, ClusteringOutcome};
use crate::error::{AnalysisError, Result};
use crate::gaps::{ClusterGeometry, GapDetector};
use crate::index::VectorIndex;
use crate::labeling::{representative_names, ClusterLabeler};
use crate::metrics::{cluster_density, compute_metric, MetricKind};
use crate::scoring::{ScoringContext, ScoringEngine};

const HYPOTHESIS_CONTEXT_NAMES: usize = 5;

type SharedRun = Shared<BoxFuture<'static, Result<RunSummary>>>;

struct InFlight {
    run: SharedRun,
    cancel: CancellationToken,
    generation: u64,
}

/// Lifecycle of a project's persisted analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum AnalysisState {
    NeverRun,
    Running,
    Fresh,
    /// Inputs changed since the stored analysis was written.
    Stale,
    Skipped { reason: SkipReason },
    Cancelled,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub project_id: ProjectId,
    pub state: AnalysisState,
    pub last_run: Option<RunSummary>,
    pub updated_at: DateTime<Utc>,
}

struct Inner {
    settings: Settings,
    store: Arc<dyn AnalysisStore>,
    vectorizer: Vectorizer,
    clustering: ClusteringEngine,
    labeler: ClusterLabeler,
    centrality: CentralityAnalyzer,
    gaps: GapDetector,
    scoring: ScoringEngine,
    metrics: MetricsCache,
    llm: Option<Arc<dyn LlmInsightProvider>>,
    clock: Arc<dyn Clock>,
    status: DashMap<ProjectId, ProjectStatus>,
}

pub struct OrchestratorBuilder {
    settings: Settings,
    store: Arc<dyn AnalysisStore>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    llm: Option<Arc<dyn LlmInsightProvider>>,
    clock: Arc<dyn Clock>,
}

impl OrchestratorBuilder {
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(provider);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmInsightProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> AnalysisOrchestrator {
        let s = &self.settings;
        let llm = self.llm.filter(|_| s.llm.enabled);
        let inner = Inner {
            vectorizer: Vectorizer::new(self.embeddings, s.embedding.clone(), s.vectorizer.clone()),
            clustering: ClusteringEngine::new(s.clustering.clone()),
            labeler: ClusterLabeler::new(llm.clone(), s.llm.label_budget()),
            centrality: CentralityAnalyzer::new(s.centrality.clone(), self.clock.clone()),
            gaps: GapDetector::new(s.gaps.clone()),
            scoring: ScoringEngine::new(s.scoring.clone()),
            metrics: MetricsCache::new(s.metrics.ttl(), self.clock.clone()),
            llm,
            clock: self.clock,
            status: DashMap::new(),
            store: self.store,
            settings: self.settings,
        };
        AnalysisOrchestrator {
            inner: Arc::new(inner),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }
}

/// Entry point of the engine. Cheap to share behind an `Arc`.
pub struct AnalysisOrchestrator {
    inner: Arc<Inner>,
    in_flight: Arc<Mutex<HashMap<ProjectId, InFlight>>>,
    generation: AtomicU64,
}

impl AnalysisOrchestrator {
    pub fn builder(settings: Settings, store: Arc<dyn AnalysisStore>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            settings,
            store,
            embeddings: None,
            llm: None,
            clock: system_clock(),
        }
    }

    pub fn new(settings: Settings, store: Arc<dyn AnalysisStore>) -> Self {
        Self::builder(settings, store).build()
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Run (or join) the analysis for a project.
    #[instrument(skip(self))]
    pub async fn refresh(&self, project_id: ProjectId) -> Result<RunSummary> {
        let run = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&project_id) {
                Some(existing) => {
                    debug!("attaching to in-flight refresh");
                    existing.run.clone()
                }
                None => self.start(project_id, &mut in_flight),
            }
        };
        run.await
    }

    /// Like [`refresh`](Self::refresh) but refuses with `Busy` when a run is
    /// already in flight for the project.
    #[instrument(skip(self))]
    pub async fn try_refresh(&self, project_id: ProjectId) -> Result<RunSummary> {
        let run = {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains_key(&project_id) {
                return Err(AnalysisError::Busy(project_id));
            }
            self.start(project_id, &mut in_flight)
        };
        run.await
    }

    pub fn is_refreshing(&self, project_id: ProjectId) -> bool {
        self.in_flight.lock().contains_key(&project_id)
    }

    fn start(&self, project_id: ProjectId, in_flight: &mut HashMap<ProjectId, InFlight>) -> SharedRun {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.inner.set_state(project_id, AnalysisState::Running, None);

        let inner = self.inner.clone();
        let registry = self.in_flight.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(AnalysisError::Cancelled(project_id)),
                result = inner.clone().run_pipeline(project_id, token.clone()) => result,
            };
            inner.record_outcome(project_id, &result);
            release(&registry, project_id, generation);
            result
        });

        let registry = self.in_flight.clone();
        let run = async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    release(&registry, project_id, generation);
                    Err(AnalysisError::Internal(format!("analysis task failed: {join_error}")))
                }
            }
        }
        .boxed()
        .shared();

        in_flight.insert(
            project_id,
            InFlight {
                run: run.clone(),
                cancel,
                generation,
            },
        );
        run
    }

    /// Cancel the in-flight run, if any. Its results are never written and
    /// every waiter receives `Cancelled`.
    #[instrument(skip(self))]
    pub fn cancel(&self, project_id: ProjectId) -> bool {
        let in_flight = self.in_flight.lock();
        match in_flight.get(&project_id) {
            Some(run) => {
                info!("cancelling in-flight analysis");
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget everything held for a project that no longer exists.
    pub fn project_deleted(&self, project_id: ProjectId) {
        self.cancel(project_id);
        self.inner.centrality.invalidate(project_id);
        self.inner.metrics.invalidate_project(project_id);
        self.inner.status.remove(&project_id);
        info!(%project_id, "dropped cached analysis state for deleted project");
    }

    /// Evict cached centrality and metrics and mark the analysis stale.
    #[instrument(skip(self))]
    pub fn invalidate(&self, project_id: ProjectId) {
        let centrality = self.inner.centrality.invalidate(project_id);
        let metrics = self.inner.metrics.invalidate_project(project_id);
        debug!(centrality, metrics, "invalidated cached analysis");
        let now = self.inner.clock.now();
        let mut status = self.inner.status.entry(project_id).or_insert_with(|| ProjectStatus {
            project_id,
            state: AnalysisState::NeverRun,
            last_run: None,
            updated_at: now,
        });
        if matches!(status.state, AnalysisState::Fresh | AnalysisState::NeverRun) {
            status.state = AnalysisState::Stale;
            status.updated_at = now;
        }
    }

    pub async fn get_clusters(&self, project_id: ProjectId) -> Result<Vec<Cluster>> {
        self.inner.ensure_project(project_id).await?;
        Ok(self.inner.store.load_clusters(project_id).await?)
    }

    pub async fn get_gaps(&self, project_id: ProjectId) -> Result<Vec<StructuralGap>> {
        self.inner.ensure_project(project_id).await?;
        Ok(self.inner.store.load_gaps(project_id).await?)
    }

    /// Cached centrality. On a miss the persisted rows are restored while they
    /// still describe the project's inputs; otherwise the metrics are rebuilt
    /// from the stored graph and clusters.
    #[instrument(skip(self))]
    pub async fn get_centrality(&self, project_id: ProjectId) -> Result<Arc<Vec<CentralityRecord>>> {
        if let Some(records) = self.inner.centrality.cached(project_id) {
            return Ok(records);
        }
        self.inner.ensure_project(project_id).await?;
        if self.inner.persisted_rows_current(project_id) {
            let stored = self.inner.store.load_centrality(project_id).await?;
            if !stored.is_empty() {
                debug!(records = stored.len(), "restored centrality from the store");
                let records = Arc::new(stored);
                self.inner.centrality.put(project_id, records.clone());
                return Ok(records);
            }
        }
        let (_, graph) = self.inner.stored_graph(project_id).await?;
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.centrality.get_centrality(project_id, &graph))
            .await
            .map_err(|e| AnalysisError::Internal(e.to_string()))
    }

    /// Read-through aggregate metric for a project.
    #[instrument(skip(self))]
    pub async fn get_metric(&self, project_id: ProjectId, kind: MetricKind) -> Result<f64> {
        if let Some(value) = self.inner.metrics.get(project_id, kind.as_str()) {
            return Ok(value);
        }
        let (concepts, graph) = self.inner.stored_graph(project_id).await?;
        let value = compute_metric(kind, &concepts, &graph);
        self.inner.metrics.put(project_id, kind.as_str(), value);
        debug!(value, "computed metric");
        Ok(value)
    }

    pub fn status(&self, project_id: ProjectId) -> ProjectStatus {
        self.inner
            .status
            .get(&project_id)
            .map(|s| s.value().clone())
            .unwrap_or_else(|| ProjectStatus {
                project_id,
                state: AnalysisState::NeverRun,
                last_run: None,
                updated_at: self.inner.clock.now(),
            })
    }

    pub fn centrality_cache(&self) -> &CentralityAnalyzer {
        &self.inner.centrality
    }

    pub fn metrics_cache(&self) -> &MetricsCache {
        &self.inner.metrics
    }
}

fn release(registry: &Mutex<HashMap<ProjectId, InFlight>>, project_id: ProjectId, generation: u64) {
    let mut in_flight = registry.lock();
    if in_flight
        .get(&project_id)
        .is_some_and(|run| run.generation == generation)
    {
        in_flight.remove(&project_id);
    }
}

impl Inner {
    fn set_state(&self, project_id: ProjectId, state: AnalysisState, summary: Option<RunSummary>) {
        let now = self.clock.now();
        let mut entry = self.status.entry(project_id).or_insert_with(|| ProjectStatus {
            project_id,
            state: AnalysisState::NeverRun,
            last_run: None,
            updated_at: now,
        });
        entry.state = state;
        entry.updated_at = now;
        if summary.is_some() {
            entry.last_run = summary;
        }
    }

    fn record_outcome(&self, project_id: ProjectId, result: &Result<RunSummary>) {
        match result {
            Ok(summary) => {
                self.set_state(project_id, AnalysisState::Fresh, Some(summary.clone()));
            }
            Err(AnalysisError::InsufficientData(reason)) => {
                info!(%project_id, %reason, "analysis skipped, previous results kept");
                self.set_state(project_id, AnalysisState::Skipped { reason: *reason }, None);
            }
            Err(AnalysisError::Cancelled(_)) => {
                if let Some(mut status) = self.status.get_mut(&project_id) {
                    status.state = AnalysisState::Cancelled;
                    status.updated_at = self.clock.now();
                }
            }
            Err(AnalysisError::ProjectNotFound(_)) => {
                self.status.remove(&project_id);
            }
            Err(other) => {
                warn!(%project_id, error = %other, "analysis failed");
                self.set_state(
                    project_id,
                    AnalysisState::Failed {
                        error: other.to_string(),
                    },
                    None,
                );
            }
        }
    }

    /// Whether the stored result set still matches the project's inputs. A
    /// project this process has never refreshed trusts whatever is stored.
    fn persisted_rows_current(&self, project_id: ProjectId) -> bool {
        self.status.get(&project_id).map_or(true, |s| {
            matches!(s.state, AnalysisState::Fresh | AnalysisState::NeverRun)
        })
    }

    async fn ensure_project(&self, project_id: ProjectId) -> Result<()> {
        if self.store.project_exists(project_id).await? {
            Ok(())
        } else {
            Err(AnalysisError::ProjectNotFound(project_id))
        }
    }

    /// Graph over every stored concept with the persisted cluster assignment.
    async fn stored_graph(&self, project_id: ProjectId) -> Result<(Vec<Concept>, ConceptGraph)> {
        self.ensure_project(project_id).await?;
        let concepts = self.store.load_concepts(project_id).await?;
        let relationships = self.store.load_relationships(project_id).await?;
        let clusters = self.store.load_clusters(project_id).await?;
        let mut graph = ConceptGraph::build(concepts.iter().map(|c| c.id), &relationships);
        graph.assign_clusters(&clusters);
        Ok((concepts, graph))
    }

    async fn run_pipeline(
        self: Arc<Self>,
        project_id: ProjectId,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        let started_at = self.clock.now();
        let run_id = Uuid::new_v4();
        info!(%project_id, %run_id, "analysis started");

        self.ensure_project(project_id).await?;
        let concepts = self
            .store
            .load_concepts(project_id)
            .await
            .map_err(|e| gone_means_cancelled(project_id, e))?;
        let relationships = self
            .store
            .load_relationships(project_id)
            .await
            .map_err(|e| gone_means_cancelled(project_id, e))?;

        let vectorization = match self.vectorizer.vectorize(&concepts).await {
            Ok(v) => v,
            Err(VectorizeError::EmptyVocabulary) => {
                return Err(AnalysisError::InsufficientData(SkipReason::InsufficientConcepts))
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            source = %vectorization.source,
            vectors = vectorization.vectors.len(),
            excluded = vectorization.excluded.len(),
            "vectorized concepts"
        );

        let vectors = Arc::new(vectorization.vectors);
        let seed = self.settings.clustering.seed;
        let outcome = {
            let inner = self.clone();
            let vectors = vectors.clone();
            tokio::task::spawn_blocking(move || inner.clustering.cluster(&vectors, seed))
                .await
                .map_err(|e| AnalysisError::Internal(e.to_string()))?
        };
        let clustering = match outcome {
            ClusteringOutcome::Clustered(result) => result,
            ClusteringOutcome::Skipped(reason) => return Err(AnalysisError::InsufficientData(reason)),
        };
        let mut clusters = clustering.clusters;

        let index = Arc::new(VectorIndex::from_vectors(&vectors));
        let names: HashMap<ConceptId, String> =
            concepts.iter().map(|c| (c.id, c.name.clone())).collect();
        let labels_from_llm = self.labeler.label_all(&mut clusters, &names, &index).await;

        let mut graph = ConceptGraph::build(concepts.iter().map(|c| c.id), &relationships);
        graph.assign_clusters(&clusters);
        for cluster in clusters.iter_mut() {
            cluster.density = cluster_density(&graph, cluster);
        }
        let graph = Arc::new(graph);
        let clusters = Arc::new(clusters);

        let centrality_task = {
            let inner = self.clone();
            let graph = graph.clone();
            tokio::task::spawn_blocking(move || inner.centrality.compute(project_id, &graph))
        };
        let geometry_task = {
            let inner = self.clone();
            let clusters = clusters.clone();
            let index = index.clone();
            tokio::task::spawn_blocking(move || {
                ClusterGeometry::compute(&clusters, &index, inner.gaps.config())
            })
        };
        let (centrality, geometry) = tokio::try_join!(centrality_task, geometry_task)
            .map_err(|e| AnalysisError::Internal(e.to_string()))?;

        let report = self
            .gaps
            .detect_gaps(&clusters, &graph, &geometry, &centrality);
        let mut gaps = report.gaps;
        let context = ScoringContext::new(
            &clusters,
            &concepts,
            &centrality,
            self.settings.gaps.max_bridge_candidates,
        );
        self.scoring.score_and_rank(&mut gaps, &context);
        self.attach_hypotheses(&mut gaps, &clusters, &names, &index).await;

        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled(project_id));
        }

        let cluster_count = clusters.len();
        let gap_count = gaps.len();
        let snapshot = AnalysisSnapshot {
            clusters: clusters.as_ref().clone(),
            gaps,
            centrality: centrality.as_ref().clone(),
        };
        self.store
            .replace_analysis(project_id, snapshot)
            .await
            .map_err(|e| gone_means_cancelled(project_id, e))?;
        // Only a persisted run may back the caches.
        self.centrality.put(project_id, centrality);
        self.metrics.invalidate_project(project_id);

        let summary = RunSummary {
            run_id,
            project_id,
            vector_source: vectorization.source,
            concepts_analyzed: vectors.len(),
            excluded: vectorization.excluded,
            cluster_count,
            silhouette: clustering.silhouette,
            gap_count,
            no_gaps_reason: report.no_gaps_reason,
            labels_from_llm,
            started_at,
            finished_at: self.clock.now(),
        };
        info!(
            %project_id,
            %run_id,
            clusters = cluster_count,
            gaps = gap_count,
            silhouette = clustering.silhouette,
            "analysis finished"
        );
        Ok(summary)
    }

    /// Ask the LLM for a hypothesis on each top-ranked gap under one deadline.
    async fn attach_hypotheses(
        &self,
        gaps: &mut [StructuralGap],
        clusters: &[Cluster],
        names: &HashMap<ConceptId, String>,
        index: &VectorIndex,
    ) {
        let Some(llm) = &self.llm else {
            return;
        };
        let limit = self.settings.llm.max_hypotheses.min(gaps.len());
        if limit == 0 {
            return;
        }

        let by_id: HashMap<u32, &Cluster> = clusters.iter().map(|c| (c.cluster_id, c)).collect();
        let deadline = Instant::now() + self.settings.llm.hypothesis_budget();
        let requests = gaps[..limit].iter().map(|gap| {
            let context = gap_context(gap, &by_id, names, index);
            let llm = llm.clone();
            let gap_id = gap.id;
            async move {
                match timeout_at(deadline, llm.generate_hypothesis(&context)).await {
                    Ok(Ok(mut hypothesis)) if !hypothesis.text.trim().is_empty() => {
                        hypothesis.confidence = hypothesis.confidence.clamp(0.0, 1.0);
                        Some(hypothesis)
                    }
                    Ok(Ok(_)) => None,
                    Ok(Err(error)) => {
                        warn!(%gap_id, %error, "hypothesis generation failed");
                        None
                    }
                    Err(_) => {
                        warn!(%gap_id, "hypothesis generation timed out");
                        None
                    }
                }
            }
        });
        let results = join_all(requests).await;
        for (gap, hypothesis) in gaps.iter_mut().zip(results) {
            gap.hypothesis = hypothesis;
        }
    }
}

/// A project that vanishes once its run has started was deleted under it.
fn gone_means_cancelled(project_id: ProjectId, err: LitGraphError) -> AnalysisError {
    match err {
        LitGraphError::ProjectNotFound(_) => AnalysisError::Cancelled(project_id),
        other => other.into(),
    }
}

fn gap_context(
    gap: &StructuralGap,
    clusters: &HashMap<u32, &Cluster>,
    names: &HashMap<ConceptId, String>,
    index: &VectorIndex,
) -> GapContext {
    let side = |cid: u32| -> (String, Vec<String>) {
        match clusters.get(&cid) {
            Some(c) => (
                c.label.clone(),
                representative_names(c, names, index, HYPOTHESIS_CONTEXT_NAMES),
            ),
            None => (format!("Cluster {cid}"), Vec::new()),
        }
    };
    let (cluster_a_label, cluster_a_concepts) = side(gap.cluster_a_id);
    let (cluster_b_label, cluster_b_concepts) = side(gap.cluster_b_id);
    GapContext {
        cluster_a_label,
        cluster_b_label,
        cluster_a_concepts,
        cluster_b_concepts,
        bridge_concepts: gap
            .bridge_candidates
            .iter()
            .filter_map(|id| names.get(id).cloned())
            .collect(),
        gap_strength: gap.gap_strength,
    }
}
