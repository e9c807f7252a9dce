//! Degree, betweenness and PageRank over a [`ConceptGraph`].

use std::collections::VecDeque;

use litgraph_core::{CentralityConfig, CentralityRecord};
use rayon::prelude::*;

use crate::graph::ConceptGraph;

/// Degree centrality normalized by `n - 1`.
pub fn degree_centrality(graph: &ConceptGraph) -> Vec<f64> {
    let n = graph.node_count();
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|v| graph.neighbors(v).len() as f64 / (n - 1) as f64)
        .collect()
}

/// Brandes betweenness on the undirected graph, normalized to [0, 1].
///
/// When the graph has more than `sample` nodes only evenly spaced sources
/// are expanded and the result is scaled up accordingly.
pub fn betweenness_centrality(graph: &ConceptGraph, sample: usize) -> Vec<f64> {
    let n = graph.node_count();
    if n < 3 || graph.edge_count() == 0 {
        return vec![0.0; n];
    }

    let sample = sample.max(1);
    let step = if n <= sample { 1 } else { n / sample };
    let sources: Vec<usize> = (0..n).step_by(step).take(sample.min(n)).collect();

    let raw = sources
        .par_iter()
        .map(|&s| single_source_dependencies(graph, s))
        .reduce(
            || vec![0.0; n],
            |mut acc, part| {
                for (a, p) in acc.iter_mut().zip(part) {
                    *a += p;
                }
                acc
            },
        );

    let scale = n as f64 / sources.len() as f64;
    // Each unordered pair is counted from both endpoints in an undirected graph.
    let pairs = ((n - 1) * (n - 2)) as f64;
    raw.into_iter()
        .map(|v| (v * scale / pairs).clamp(0.0, 1.0))
        .collect()
}

fn single_source_dependencies(graph: &ConceptGraph, s: usize) -> Vec<f64> {
    let n = graph.node_count();
    let mut stack = Vec::with_capacity(n);
    let mut pred: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];
    let mut delta = vec![0.0f64; n];

    sigma[s] = 1.0;
    dist[s] = 0;
    let mut queue = VecDeque::new();
    queue.push_back(s);

    while let Some(v) = queue.pop_front() {
        stack.push(v);
        for &w in graph.neighbors(v) {
            if dist[w] < 0 {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                pred[w].push(v);
            }
        }
    }

    let mut dependency = vec![0.0f64; n];
    while let Some(w) = stack.pop() {
        for &v in &pred[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
        if w != s {
            dependency[w] = delta[w];
        }
    }
    dependency
}

/// PageRank over directed out-links with uniform redistribution of dangling mass.
pub fn pagerank(graph: &ConceptGraph, damping: f64, max_iterations: usize, tolerance: f64) -> Vec<f64> {
    let n = graph.node_count();
    if n == 0 {
        return Vec::new();
    }
    let nf = n as f64;
    let mut scores = vec![1.0 / nf; n];

    for _ in 0..max_iterations {
        let dangling: f64 = (0..n)
            .filter(|&v| graph.out_neighbors(v).is_empty())
            .map(|v| scores[v])
            .sum();
        let base = (1.0 - damping) / nf + damping * dangling / nf;
        let mut next = vec![base; n];
        for v in 0..n {
            let out = graph.out_neighbors(v);
            if out.is_empty() {
                continue;
            }
            let share = damping * scores[v] / out.len() as f64;
            for &t in out {
                next[t] += share;
            }
        }
        let change: f64 = next.iter().zip(&scores).map(|(a, b)| (a - b).abs()).sum();
        scores = next;
        if change < tolerance {
            break;
        }
    }
    scores.into_iter().map(|s| s.clamp(0.0, 1.0)).collect()
}

/// All three metrics per node. A graph without edges yields all zeros.
pub fn compute_centrality(graph: &ConceptGraph, config: &CentralityConfig) -> Vec<CentralityRecord> {
    let n = graph.node_count();
    let (degree, betweenness, rank) = if graph.edge_count() == 0 {
        (vec![0.0; n], vec![0.0; n], vec![0.0; n])
    } else {
        (
            degree_centrality(graph),
            betweenness_centrality(graph, config.betweenness_sample),
            pagerank(graph, config.damping, config.max_iterations, config.tolerance),
        )
    };

    (0..n)
        .map(|v| CentralityRecord {
            concept_id: graph.id_at(v),
            degree: degree[v],
            betweenness: betweenness[v],
            pagerank: rank[v],
            cluster_id: graph.cluster_of(v),
        })
        .collect()
}
