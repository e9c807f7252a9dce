//! Seeded k-means clustering with silhouette-based model selection.
//!
//! Rows are L2-normalized so Euclidean distance orders pairs the same way
//! cosine distance does. Every candidate `k` in `[3, floor(sqrt(n))]` runs
//! k-means++ seeding plus Lloyd iterations with a few restarts; candidates
//! producing a cluster smaller than `min_cluster_size` are discarded and the
//! highest mean silhouette wins (ties go to the smaller `k`).

use std::collections::BTreeSet;

use litgraph_core::{Cluster, ClusteringConfig, ConceptId, ConceptVector, SkipReason};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const MIN_K: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    /// Relabeled clusters with ids `0..k`; labels and densities are filled in later.
    pub clusters: Vec<Cluster>,
    pub k: usize,
    pub silhouette: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusteringOutcome {
    Clustered(ClusteringResult),
    Skipped(SkipReason),
}

impl ClusteringOutcome {
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            ClusteringOutcome::Skipped(reason) => Some(*reason),
            ClusteringOutcome::Clustered(_) => None,
        }
    }
}

struct Candidate {
    k: usize,
    assignments: Vec<usize>,
    silhouette: f64,
}

pub struct ClusteringEngine {
    config: ClusteringConfig,
}

impl ClusteringEngine {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Partition `vectors` into clusters. Output depends only on the vectors
    /// and `seed`, not on the order they are supplied in.
    pub fn cluster(&self, vectors: &[ConceptVector], seed: u64) -> ClusteringOutcome {
        let n = vectors.len();
        if n < self.config.min_concepts.max(MIN_K) {
            debug!(n, required = self.config.min_concepts, "too few vectors to cluster");
            return ClusteringOutcome::Skipped(SkipReason::InsufficientConcepts);
        }

        let mut rows: Vec<&ConceptVector> = vectors.iter().collect();
        rows.sort_by_key(|v| v.concept_id);
        let ids: Vec<ConceptId> = rows.iter().map(|v| v.concept_id).collect();
        let data = normalized_matrix(&rows);
        let distances = distance_matrix(&data);

        let k_max = (n as f64).sqrt().floor() as usize;
        let candidates: Vec<Candidate> = (MIN_K..=k_max)
            .into_par_iter()
            .filter(|&k| k * self.config.min_cluster_size <= n)
            .filter_map(|k| {
                let assignments = self.best_of_restarts(&data, k, seed);
                if !all_clusters_at_least(&assignments, k, self.config.min_cluster_size) {
                    return None;
                }
                let silhouette = mean_silhouette(&distances, &assignments, k);
                Some(Candidate {
                    k,
                    assignments,
                    silhouette,
                })
            })
            .collect();

        let mut best: Option<&Candidate> = None;
        for candidate in &candidates {
            debug!(k = candidate.k, silhouette = candidate.silhouette, "evaluated k");
            match best {
                Some(b) if candidate.silhouette <= b.silhouette + 1e-12 => {}
                _ => best = Some(candidate),
            }
        }

        let Some(best) = best else {
            info!(n, k_max, "no valid clustering, every candidate k was degenerate");
            return ClusteringOutcome::Skipped(SkipReason::DegenerateClustering);
        };

        let clusters = build_clusters(&ids, &data, &best.assignments, best.k);
        info!(n, k = best.k, silhouette = best.silhouette, "clustered concepts");
        ClusteringOutcome::Clustered(ClusteringResult {
            clusters,
            k: best.k,
            silhouette: best.silhouette,
        })
    }

    fn best_of_restarts(&self, data: &Array2<f64>, k: usize, seed: u64) -> Vec<usize> {
        let restarts = self.config.restarts.max(1);
        let mut best: Option<(f64, Vec<usize>)> = None;
        for restart in 0..restarts {
            let run_seed = seed
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .wrapping_add((k as u64) << 16)
                .wrapping_add(restart as u64);
            let mut rng = StdRng::seed_from_u64(run_seed);
            let (assignments, inertia) = lloyd(data, k, self.config.max_iterations, &mut rng);
            if best.as_ref().map_or(true, |(b, _)| inertia < *b) {
                best = Some((inertia, assignments));
            }
        }
        best.map(|(_, a)| a).unwrap_or_default()
    }
}

fn normalized_matrix(rows: &[&ConceptVector]) -> Array2<f64> {
    let dim = rows.iter().map(|r| r.vector.len()).max().unwrap_or(0);
    let mut data = Array2::<f64>::zeros((rows.len(), dim));
    for (i, row) in rows.iter().enumerate() {
        for (j, &x) in row.vector.iter().enumerate() {
            data[[i, j]] = x as f64;
        }
    }
    for mut row in data.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
    }
    data
}

/// Pairwise Euclidean distances, computed once and reused by every silhouette.
fn distance_matrix(data: &Array2<f64>) -> Array2<f64> {
    let gram = data.dot(&data.t());
    let sq: Array1<f64> = gram.diag().to_owned();
    let n = data.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            0.0
        } else {
            (sq[i] + sq[j] - 2.0 * gram[[i, j]]).max(0.0).sqrt()
        }
    })
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn kmeans_plus_plus(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let mut centers = Array2::<f64>::zeros((k, data.ncols()));
    let first = rng.random_range(0..n);
    centers.row_mut(0).assign(&data.row(first));

    let mut nearest: Vec<f64> = (0..n)
        .map(|i| squared_distance(data.row(i), centers.row(0)))
        .collect();

    for c in 1..k {
        let total: f64 = nearest.iter().sum();
        let pick = if total <= 0.0 {
            rng.random_range(0..n)
        } else {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = n - 1;
            for (i, &w) in nearest.iter().enumerate() {
                if target < w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        };
        centers.row_mut(c).assign(&data.row(pick));
        for (i, slot) in nearest.iter_mut().enumerate() {
            let d = squared_distance(data.row(i), centers.row(c));
            if d < *slot {
                *slot = d;
            }
        }
    }
    centers
}

/// Returns assignments and inertia.
fn lloyd(data: &Array2<f64>, k: usize, max_iterations: usize, rng: &mut StdRng) -> (Vec<usize>, f64) {
    let n = data.nrows();
    let mut centers = kmeans_plus_plus(data, k, rng);
    let mut assignments = vec![usize::MAX; n];

    for _ in 0..max_iterations.max(1) {
        let mut changed = false;
        for i in 0..n {
            let row = data.row(i);
            let mut best = 0;
            let mut best_d = f64::INFINITY;
            for c in 0..k {
                let d = squared_distance(row, centers.row(c));
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            if assignments[i] != best {
                assignments[i] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = Array2::<f64>::zeros(centers.raw_dim());
        let mut counts = vec![0usize; k];
        for (i, &c) in assignments.iter().enumerate() {
            let mut target = sums.row_mut(c);
            target += &data.row(i);
            counts[c] += 1;
        }
        for c in 0..k {
            // Empty clusters keep their previous center.
            if counts[c] > 0 {
                let mean = &sums.row(c) / counts[c] as f64;
                centers.row_mut(c).assign(&mean);
            }
        }
    }

    let inertia = assignments
        .iter()
        .enumerate()
        .map(|(i, &c)| squared_distance(data.row(i), centers.row(c)))
        .sum();
    (assignments, inertia)
}

fn cluster_sizes(assignments: &[usize], k: usize) -> Vec<usize> {
    let mut sizes = vec![0usize; k];
    for &c in assignments {
        sizes[c] += 1;
    }
    sizes
}

fn all_clusters_at_least(assignments: &[usize], k: usize, min_size: usize) -> bool {
    cluster_sizes(assignments, k).iter().all(|&s| s >= min_size.max(1))
}

/// Mean silhouette over all points.
pub(crate) fn mean_silhouette(distances: &Array2<f64>, assignments: &[usize], k: usize) -> f64 {
    let n = assignments.len();
    if n == 0 || k < 2 {
        return 0.0;
    }
    let sizes = cluster_sizes(assignments, k);

    let total: f64 = (0..n)
        .map(|i| {
            let own = assignments[i];
            if sizes[own] <= 1 {
                return 0.0;
            }
            let mut sums = vec![0.0f64; k];
            for j in 0..n {
                if j != i {
                    sums[assignments[j]] += distances[[i, j]];
                }
            }
            let a = sums[own] / (sizes[own] - 1) as f64;
            let b = (0..k)
                .filter(|&c| c != own && sizes[c] > 0)
                .map(|c| sums[c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);
            if !b.is_finite() {
                return 0.0;
            }
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .sum();
    total / n as f64
}

fn build_clusters(ids: &[ConceptId], data: &Array2<f64>, assignments: &[usize], k: usize) -> Vec<Cluster> {
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &c) in assignments.iter().enumerate() {
        members[c].push(i);
    }

    let mut groups: Vec<(BTreeSet<ConceptId>, Vec<f32>)> = members
        .into_iter()
        .filter(|rows| !rows.is_empty())
        .map(|rows| {
            let concept_ids: BTreeSet<ConceptId> = rows.iter().map(|&i| ids[i]).collect();
            let mut centroid = Array1::<f64>::zeros(data.ncols());
            for &i in &rows {
                centroid += &data.row(i);
            }
            centroid /= rows.len() as f64;
            (concept_ids, centroid.iter().map(|&x| x as f32).collect())
        })
        .collect();

    groups.sort_by(|(a, _), (b, _)| {
        b.len()
            .cmp(&a.len())
            .then_with(|| a.first().cmp(&b.first()))
    });

    groups
        .into_iter()
        .enumerate()
        .map(|(idx, (concept_ids, centroid))| Cluster {
            cluster_id: idx as u32,
            size: concept_ids.len(),
            concept_ids,
            centroid,
            density: 0.0,
            label: String::new(),
        })
        .collect()
}
