//! Project-level aggregate metrics served through the metrics cache.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use litgraph_core::{Cluster, Concept, EntityType};
use litgraph_graph::ConceptGraph;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Normalized Shannon entropy of entity types.
    Diversity,
    /// Undirected relationship density of the whole graph.
    Density,
    /// Newman modularity of the cluster partition.
    Modularity,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::Diversity,
        MetricKind::Density,
        MetricKind::Modularity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Diversity => "diversity",
            MetricKind::Density => "density",
            MetricKind::Modularity => "modularity",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}

pub fn entity_diversity(concepts: &[Concept]) -> f64 {
    if concepts.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<EntityType, usize> = HashMap::new();
    for concept in concepts {
        *counts.entry(concept.entity_type()).or_default() += 1;
    }
    let total = concepts.len() as f64;
    let entropy: f64 = counts
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.ln()
        })
        .sum();
    (entropy / (EntityType::COUNT as f64).ln()).clamp(0.0, 1.0)
}

pub fn graph_density(graph: &ConceptGraph) -> f64 {
    let n = graph.node_count();
    if n < 2 {
        return 0.0;
    }
    let possible = (n * (n - 1) / 2) as f64;
    (graph.edge_count() as f64 / possible).clamp(0.0, 1.0)
}

/// Internal edges over possible internal pairs; 0 for clusters under two members.
pub fn cluster_density(graph: &ConceptGraph, cluster: &Cluster) -> f64 {
    let s = cluster.concept_ids.len();
    if s < 2 {
        return 0.0;
    }
    let possible = (s * (s - 1) / 2) as f64;
    (graph.internal_edge_count(&cluster.concept_ids) as f64 / possible).clamp(0.0, 1.0)
}

/// Newman modularity using the graph's cluster assignment. Unassigned nodes
/// count as singleton communities.
pub fn modularity(graph: &ConceptGraph) -> f64 {
    let m = graph.edge_count() as f64;
    if m == 0.0 {
        return 0.0;
    }

    #[derive(Default)]
    struct Community {
        internal: f64,
        degree: f64,
    }

    let community_of = |v: usize| -> (bool, usize) {
        match graph.cluster_of(v) {
            Some(c) => (true, c as usize),
            None => (false, v),
        }
    };

    let mut communities: HashMap<(bool, usize), Community> = HashMap::new();
    for v in 0..graph.node_count() {
        let cv = community_of(v);
        let entry = communities.entry(cv).or_default();
        entry.degree += graph.neighbors(v).len() as f64;
        entry.internal += graph
            .neighbors(v)
            .iter()
            .filter(|&&w| w > v && community_of(w) == cv)
            .count() as f64;
    }

    communities
        .values()
        .map(|c| c.internal / m - (c.degree / (2.0 * m)).powi(2))
        .sum()
}

pub fn compute_metric(kind: MetricKind, concepts: &[Concept], graph: &ConceptGraph) -> f64 {
    match kind {
        MetricKind::Diversity => entity_diversity(concepts),
        MetricKind::Density => graph_density(graph),
        MetricKind::Modularity => modularity(graph),
    }
}
