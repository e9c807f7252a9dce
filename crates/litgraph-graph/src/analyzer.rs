use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use litgraph_cache::{BoundedLruCache, CacheStats, Clock};
use litgraph_core::{CentralityConfig, CentralityRecord, ProjectId};
use tracing::{debug, info};

use crate::centrality::compute_centrality;
use crate::graph::ConceptGraph;

/// Per-project centrality metrics held by the analyzer.
#[derive(Debug, Clone)]
pub struct CentralityCacheEntry {
    pub project_id: ProjectId,
    pub computed_at: DateTime<Utc>,
    pub metrics: Arc<Vec<CentralityRecord>>,
}

/// Read-through centrality computation backed by a bounded LRU cache.
pub struct CentralityAnalyzer {
    config: CentralityConfig,
    cache: BoundedLruCache<ProjectId, CentralityCacheEntry>,
    clock: Arc<dyn Clock>,
}

impl CentralityAnalyzer {
    pub fn new(config: CentralityConfig, clock: Arc<dyn Clock>) -> Self {
        let cache = BoundedLruCache::new(config.cache_capacity, clock.clone());
        Self {
            config,
            cache,
            clock,
        }
    }

    /// Cached metrics for a project, computing them from `graph` on a miss.
    pub fn get_centrality(
        &self,
        project_id: ProjectId,
        graph: &ConceptGraph,
    ) -> Arc<Vec<CentralityRecord>> {
        if let Some(entry) = self.cache.get(&project_id) {
            debug!(%project_id, "centrality cache hit");
            return entry.metrics;
        }
        self.refresh(project_id, graph)
    }

    /// Cached metrics only; a hit refreshes recency.
    pub fn cached(&self, project_id: ProjectId) -> Option<Arc<Vec<CentralityRecord>>> {
        self.cache.get(&project_id).map(|entry| entry.metrics)
    }

    /// Recompute and replace the entry for `project_id`.
    pub fn refresh(&self, project_id: ProjectId, graph: &ConceptGraph) -> Arc<Vec<CentralityRecord>> {
        let metrics = self.compute(project_id, graph);
        self.put(project_id, metrics.clone());
        metrics
    }

    /// Compute without touching the cache. Callers publish the result with
    /// [`put`](Self::put) once it is known to be kept.
    pub fn compute(&self, project_id: ProjectId, graph: &ConceptGraph) -> Arc<Vec<CentralityRecord>> {
        let started = Instant::now();
        let metrics = Arc::new(compute_centrality(graph, &self.config));
        info!(
            %project_id,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "computed centrality"
        );
        metrics
    }

    /// Insert precomputed metrics: a freshly persisted run or rows restored
    /// from the store.
    pub fn put(&self, project_id: ProjectId, metrics: Arc<Vec<CentralityRecord>>) {
        let entry = CentralityCacheEntry {
            project_id,
            computed_at: self.clock.now(),
            metrics,
        };
        if let Some(evicted) = self.cache.insert(project_id, entry) {
            debug!(%evicted, capacity = self.cache.capacity(), "evicted centrality entry");
        }
    }

    pub fn entry(&self, project_id: ProjectId) -> Option<CentralityCacheEntry> {
        self.cache.peek_entry(&project_id).map(|e| e.value)
    }

    pub fn invalidate(&self, project_id: ProjectId) -> bool {
        self.cache.invalidate(&project_id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litgraph_cache::ManualClock;
    use litgraph_core::{ConceptId, RelationKind, Relationship};
    use uuid::Uuid;

    fn small_graph() -> ConceptGraph {
        let ids: Vec<ConceptId> = (1..=4).map(Uuid::from_u128).collect();
        let rels = vec![
            Relationship::new(ids[0], ids[1], RelationKind::Uses),
            Relationship::new(ids[1], ids[2], RelationKind::Extends),
        ];
        ConceptGraph::build(ids, &rels)
    }

    fn analyzer() -> CentralityAnalyzer {
        CentralityAnalyzer::new(CentralityConfig::default(), Arc::new(ManualClock::default()))
    }

    fn project(n: u128) -> ProjectId {
        Uuid::from_u128(1000 + n)
    }

    #[test]
    fn second_read_is_a_cache_hit() {
        let analyzer = analyzer();
        let graph = small_graph();
        let first = analyzer.get_centrality(project(1), &graph);
        let second = analyzer.get_centrality(project(1), &graph);
        assert!(Arc::ptr_eq(&first, &second));
        let stats = analyzer.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn twenty_one_projects_evict_the_first() {
        let analyzer = analyzer();
        let graph = small_graph();
        for p in 1..=21 {
            analyzer.get_centrality(project(p), &graph);
        }
        assert_eq!(analyzer.len(), 20);
        assert!(analyzer.entry(project(1)).is_none());
        assert!(analyzer.entry(project(21)).is_some());
    }

    #[test]
    fn accessed_project_survives_overflow() {
        let analyzer = analyzer();
        let graph = small_graph();
        for p in 1..=20 {
            analyzer.get_centrality(project(p), &graph);
        }
        assert!(analyzer.cached(project(1)).is_some());
        analyzer.get_centrality(project(21), &graph);
        assert!(analyzer.entry(project(1)).is_some());
        assert!(analyzer.entry(project(2)).is_none());
    }

    #[test]
    fn compute_leaves_the_cache_alone_until_put() {
        let analyzer = analyzer();
        let graph = small_graph();
        let metrics = analyzer.compute(project(1), &graph);
        assert!(analyzer.entry(project(1)).is_none());
        assert_eq!(metrics.len(), 4);

        analyzer.put(project(1), metrics.clone());
        let cached = analyzer.cached(project(1)).unwrap();
        assert!(Arc::ptr_eq(&cached, &metrics));
    }

    #[test]
    fn invalidate_forces_recompute() {
        let analyzer = analyzer();
        let graph = small_graph();
        let first = analyzer.get_centrality(project(1), &graph);
        assert!(analyzer.invalidate(project(1)));
        let again = analyzer.get_centrality(project(1), &graph);
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(first, again);
    }
}
