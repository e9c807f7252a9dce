pub mod analyzer;
pub mod centrality;
pub mod graph;

pub use analyzer::{CentralityAnalyzer, CentralityCacheEntry};
pub use centrality::{betweenness_centrality, compute_centrality, degree_centrality, pagerank};
pub use graph::ConceptGraph;
