//! Structural gap detection between concept clusters.
//!
//! A gap is a pair of clusters that are sparsely connected in the graph yet
//! semantically distant. The vector-only half of the work lives in
//! [`ClusterGeometry`] so it can be computed while centrality is still
//! running; [`GapDetector::detect_gaps`] then joins it with the graph and the
//! centrality records.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use litgraph_core::{
    CentralityRecord, Cluster, ConceptId, GapConfig, NoGapsReason, PotentialEdge, StructuralGap,
};
use litgraph_graph::ConceptGraph;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::index::VectorIndex;

/// Vector-space facts about one eligible cluster pair.
#[derive(Debug, Clone)]
pub struct PairGeometry {
    pub cluster_a_id: u32,
    pub cluster_b_id: u32,
    pub semantic_distance: f64,
    pub similar_pair_ratio: f64,
    /// Sampled cross pairs above the similarity threshold, best first.
    pub similar_pairs: Vec<PotentialEdge>,
    /// Concepts roughly equidistant from both centroids, ascending id.
    pub bridge_pool: Vec<ConceptId>,
}

/// Precomputed geometry for every eligible cluster pair of a run.
#[derive(Debug, Clone, Default)]
pub struct ClusterGeometry {
    pub eligible_clusters: usize,
    pub pairs: Vec<PairGeometry>,
}

impl ClusterGeometry {
    pub fn compute(clusters: &[Cluster], index: &VectorIndex, config: &GapConfig) -> Self {
        let mut eligible: Vec<&Cluster> = clusters
            .iter()
            .filter(|c| c.size >= config.min_cluster_size)
            .collect();
        eligible.sort_by_key(|c| c.cluster_id);

        // Distance of every analyzed concept to every eligible centroid.
        let centroid_distances: HashMap<u32, Vec<f64>> = eligible
            .iter()
            .map(|c| {
                let d = index
                    .ids()
                    .iter()
                    .map(|id| index.distance_to(id, &c.centroid).unwrap_or(1.0))
                    .collect();
                (c.cluster_id, d)
            })
            .collect();

        let mut pairs = Vec::new();
        for (i, a) in eligible.iter().enumerate() {
            for b in &eligible[i + 1..] {
                pairs.push(pair_geometry(a, b, index, &centroid_distances, config));
            }
        }

        Self {
            eligible_clusters: eligible.len(),
            pairs,
        }
    }
}

fn stride_sample(members: &BTreeSet<ConceptId>, limit: usize) -> Vec<ConceptId> {
    let limit = limit.max(1);
    if members.len() <= limit {
        return members.iter().copied().collect();
    }
    let step = members.len().div_ceil(limit);
    members.iter().step_by(step).copied().collect()
}

fn pair_geometry(
    a: &Cluster,
    b: &Cluster,
    index: &VectorIndex,
    centroid_distances: &HashMap<u32, Vec<f64>>,
    config: &GapConfig,
) -> PairGeometry {
    let sample_a = stride_sample(&a.concept_ids, config.distance_sample);
    let sample_b = stride_sample(&b.concept_ids, config.distance_sample);

    let mut distance_sum = 0.0;
    let mut sampled = 0usize;
    let mut similar_pairs = Vec::new();
    for x in &sample_a {
        for y in &sample_b {
            let similarity = index.similarity(x, y);
            distance_sum += 1.0 - similarity;
            sampled += 1;
            if similarity > config.potential_edge_threshold {
                similar_pairs.push(PotentialEdge {
                    source_id: *x,
                    target_id: *y,
                    similarity: similarity.clamp(0.0, 1.0),
                });
            }
        }
    }
    similar_pairs.sort_by(|p, q| {
        q.similarity
            .partial_cmp(&p.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| (p.source_id, p.target_id).cmp(&(q.source_id, q.target_id)))
    });

    let (semantic_distance, similar_pair_ratio) = if sampled == 0 {
        (0.0, 0.0)
    } else {
        (
            distance_sum / sampled as f64,
            similar_pairs.len() as f64 / sampled as f64,
        )
    };

    let bridge_pool = match (
        centroid_distances.get(&a.cluster_id),
        centroid_distances.get(&b.cluster_id),
    ) {
        (Some(da), Some(db)) => index
            .ids()
            .iter()
            .zip(da.iter().zip(db))
            .filter(|(_, (x, y))| (*x - *y).abs() < config.bridge_distance_tolerance)
            .map(|(id, _)| *id)
            .collect(),
        _ => Vec::new(),
    };

    PairGeometry {
        cluster_a_id: a.cluster_id,
        cluster_b_id: b.cluster_id,
        semantic_distance,
        similar_pair_ratio,
        similar_pairs,
        bridge_pool,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    pub gaps: Vec<StructuralGap>,
    pub no_gaps_reason: Option<NoGapsReason>,
    pub pairs_evaluated: usize,
}

pub struct GapDetector {
    config: GapConfig,
}

impl GapDetector {
    pub fn new(config: GapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GapConfig {
        &self.config
    }

    /// Emit a gap for every eligible pair that is both sparsely linked and
    /// semantically distant. Scores are left at zero for the scoring engine.
    pub fn detect_gaps(
        &self,
        clusters: &[Cluster],
        graph: &ConceptGraph,
        geometry: &ClusterGeometry,
        centrality: &[CentralityRecord],
    ) -> GapReport {
        if geometry.eligible_clusters < 2 {
            debug!(
                eligible = geometry.eligible_clusters,
                "fewer than two clusters large enough for gap detection"
            );
            return GapReport {
                gaps: Vec::new(),
                no_gaps_reason: Some(NoGapsReason::FewerThanTwoEligibleClusters),
                pairs_evaluated: 0,
            };
        }

        let by_id: HashMap<u32, &Cluster> = clusters.iter().map(|c| (c.cluster_id, c)).collect();
        let betweenness: HashMap<ConceptId, f64> = centrality
            .iter()
            .map(|r| (r.concept_id, r.betweenness))
            .collect();

        let mut gaps = Vec::new();
        for pair in &geometry.pairs {
            let (Some(a), Some(b)) = (by_id.get(&pair.cluster_a_id), by_id.get(&pair.cluster_b_id))
            else {
                continue;
            };

            let edge_count = graph.cross_edge_count(&a.concept_ids, &b.concept_ids);
            let possible = (a.size * b.size).max(1) as f64;
            let normalized_strength = (edge_count as f64 / possible).clamp(0.0, 1.0);

            let qualifies = normalized_strength < self.config.max_normalized_strength
                && pair.semantic_distance > self.config.min_semantic_distance;
            debug!(
                a = a.cluster_id,
                b = b.cluster_id,
                edge_count,
                normalized_strength,
                semantic_distance = pair.semantic_distance,
                qualifies,
                "evaluated cluster pair"
            );
            if !qualifies {
                continue;
            }

            gaps.push(StructuralGap {
                id: Uuid::new_v4(),
                cluster_a_id: a.cluster_id,
                cluster_b_id: b.cluster_id,
                gap_strength: 1.0 - normalized_strength,
                normalized_strength,
                semantic_distance: pair.semantic_distance,
                similar_pair_ratio: pair.similar_pair_ratio,
                bridge_candidates: self.rank_bridges(&pair.bridge_pool, &betweenness),
                potential_edges: self.potential_edges(pair, graph),
                impact_score: 0.0,
                feasibility_score: 0.0,
                hypothesis: None,
            });
        }

        info!(
            pairs = geometry.pairs.len(),
            gaps = gaps.len(),
            "gap detection finished"
        );
        GapReport {
            gaps,
            no_gaps_reason: None,
            pairs_evaluated: geometry.pairs.len(),
        }
    }

    fn rank_bridges(&self, pool: &[ConceptId], betweenness: &HashMap<ConceptId, f64>) -> Vec<ConceptId> {
        let mut ranked: Vec<(f64, ConceptId)> = pool
            .iter()
            .map(|id| (betweenness.get(id).copied().unwrap_or(0.0), *id))
            .collect();
        ranked.sort_by(|x, y| {
            y.0.partial_cmp(&x.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| x.1.cmp(&y.1))
        });
        ranked
            .into_iter()
            .take(self.config.max_bridge_candidates)
            .map(|(_, id)| id)
            .collect()
    }

    /// Best similar pairs that are not already related.
    fn potential_edges(&self, pair: &PairGeometry, graph: &ConceptGraph) -> Vec<PotentialEdge> {
        pair.similar_pairs
            .iter()
            .filter(|edge| {
                match (graph.index_of(&edge.source_id), graph.index_of(&edge.target_id)) {
                    (Some(s), Some(t)) => !graph.are_adjacent(s, t),
                    _ => true,
                }
            })
            .take(self.config.max_potential_edges)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use litgraph_core::{ConceptVector, RelationKind, Relationship, VectorSource};
    use litgraph_vector::mean_vector;

    fn id(n: u128) -> ConceptId {
        Uuid::from_u128(n)
    }

    struct Fixture {
        clusters: Vec<Cluster>,
        index: VectorIndex,
    }

    /// Clusters of the given sizes along orthogonal axes; member `i` of every
    /// cluster gets a small shared component so cross-cluster pairs are not
    /// perfectly orthogonal.
    fn fixture(sizes: &[usize]) -> Fixture {
        let dims = sizes.len() + 1;
        let mut vectors = Vec::new();
        let mut clusters = Vec::new();
        let mut next = 1u128;
        for (cid, &size) in sizes.iter().enumerate() {
            let mut members = BTreeSet::new();
            let mut rows: Vec<Vec<f32>> = Vec::new();
            for _ in 0..size {
                let mut v = vec![0.0f32; dims];
                v[cid] = 1.0;
                v[dims - 1] = 0.1;
                members.insert(id(next));
                rows.push(v.clone());
                vectors.push(ConceptVector {
                    concept_id: id(next),
                    vector: v,
                    source: VectorSource::Tfidf,
                });
                next += 1;
            }
            let centroid = mean_vector(rows.iter().map(Vec::as_slice));
            clusters.push(Cluster {
                cluster_id: cid as u32,
                size: members.len(),
                concept_ids: members,
                centroid,
                density: 0.0,
                label: String::new(),
            });
        }
        Fixture {
            clusters,
            index: VectorIndex::from_vectors(&vectors),
        }
    }

    fn graph(fx: &Fixture, edges: &[(u128, u128)]) -> ConceptGraph {
        let rels: Vec<Relationship> = edges
            .iter()
            .map(|&(a, b)| Relationship::new(id(a), id(b), RelationKind::RelatedTo))
            .collect();
        let mut g = ConceptGraph::build(fx.index.ids().iter().copied(), &rels);
        g.assign_clusters(&fx.clusters);
        g
    }

    fn detect(fx: &Fixture, g: &ConceptGraph) -> GapReport {
        let config = GapConfig::default();
        let geometry = ClusterGeometry::compute(&fx.clusters, &fx.index, &config);
        GapDetector::new(config).detect_gaps(&fx.clusters, g, &geometry, &[])
    }

    #[test]
    fn disconnected_distant_clusters_form_a_full_gap() {
        // Scenario: two 5-member clusters, no cross edges, distance 0.8+.
        let fx = fixture(&[5, 5]);
        let g = graph(&fx, &[(1, 2), (6, 7)]);
        let report = detect(&fx, &g);
        assert_eq!(report.gaps.len(), 1);
        let gap = &report.gaps[0];
        assert_relative_eq!(gap.gap_strength, 1.0);
        assert_relative_eq!(gap.normalized_strength, 0.0);
        assert!(gap.semantic_distance > 0.5);
        assert_eq!(gap.opportunity_percent(), 100);
        assert!(report.no_gaps_reason.is_none());
    }

    #[test]
    fn dense_cross_links_suppress_the_gap() {
        let fx = fixture(&[3, 3]);
        // 3 cross edges out of 9 possible pairs: strength 0.33.
        let g = graph(&fx, &[(1, 4), (2, 5), (3, 6)]);
        let report = detect(&fx, &g);
        assert!(report.gaps.is_empty());
        assert_eq!(report.no_gaps_reason, None);
        assert_eq!(report.pairs_evaluated, 1);
    }

    #[test]
    fn gap_strength_is_complement_of_normalized_strength() {
        let sizes = [4, 4, 4];
        let fx = fixture(&sizes);
        // One cross edge between clusters 0 and 1: 1/16.
        let g = graph(&fx, &[(1, 5)]);
        let report = detect(&fx, &g);
        assert_eq!(report.gaps.len(), 3);
        for gap in &report.gaps {
            assert!((0.0..=1.0).contains(&gap.gap_strength));
            assert_relative_eq!(gap.gap_strength, 1.0 - gap.normalized_strength);
        }
        let linked = report
            .gaps
            .iter()
            .find(|g| g.cluster_a_id == 0 && g.cluster_b_id == 1)
            .unwrap();
        assert_relative_eq!(linked.normalized_strength, 1.0 / 16.0);
    }

    #[test]
    fn small_clusters_are_not_eligible() {
        let fx = fixture(&[5, 2]);
        let g = graph(&fx, &[]);
        let report = detect(&fx, &g);
        assert!(report.gaps.is_empty());
        assert_eq!(
            report.no_gaps_reason,
            Some(NoGapsReason::FewerThanTwoEligibleClusters)
        );
    }

    #[test]
    fn bridges_are_equidistant_concepts_ranked_by_betweenness() {
        let mut fx = fixture(&[4, 4]);
        // Concepts halfway between both axes.
        let bridge_vectors: Vec<ConceptVector> = (100..107u128)
            .map(|n| ConceptVector {
                concept_id: id(n),
                vector: vec![1.0, 1.0, 0.1],
                source: VectorSource::Tfidf,
            })
            .collect();
        let mut all: Vec<ConceptVector> = fx
            .index
            .ids()
            .iter()
            .map(|cid| ConceptVector {
                concept_id: *cid,
                vector: fx.index.get(cid).unwrap().to_vec(),
                source: VectorSource::Tfidf,
            })
            .collect();
        all.extend(bridge_vectors);
        fx.index = VectorIndex::from_vectors(&all);

        let centrality: Vec<CentralityRecord> = (100..107u128)
            .map(|n| CentralityRecord {
                concept_id: id(n),
                degree: 0.0,
                betweenness: (n - 100) as f64 / 10.0,
                pagerank: 0.0,
                cluster_id: None,
            })
            .collect();

        let g = graph(&fx, &[]);
        let config = GapConfig::default();
        let geometry = ClusterGeometry::compute(&fx.clusters, &fx.index, &config);
        let report = GapDetector::new(config).detect_gaps(&fx.clusters, &g, &geometry, &centrality);
        let gap = &report.gaps[0];
        assert_eq!(
            gap.bridge_candidates,
            vec![id(106), id(105), id(104), id(103), id(102)]
        );
    }

    #[test]
    fn potential_edges_skip_existing_relationships() {
        let fx = fixture(&[3, 3]);
        let config = GapConfig {
            potential_edge_threshold: 0.0,
            max_normalized_strength: 0.2,
            min_semantic_distance: 0.0,
            ..GapConfig::default()
        };
        let g = graph(&fx, &[(1, 4)]);
        let geometry = ClusterGeometry::compute(&fx.clusters, &fx.index, &config);
        let report = GapDetector::new(config).detect_gaps(&fx.clusters, &g, &geometry, &[]);
        let gap = &report.gaps[0];
        assert_eq!(gap.potential_edges.len(), 5);
        assert!(gap
            .potential_edges
            .iter()
            .all(|e| !(e.source_id == id(1) && e.target_id == id(4))));
        assert_relative_eq!(gap.similar_pair_ratio, 1.0);
    }

    #[test]
    fn stride_sample_is_bounded_and_deterministic() {
        let members: BTreeSet<ConceptId> = (1..=100u128).map(id).collect();
        let sample = stride_sample(&members, 40);
        assert!(sample.len() <= 40);
        assert_eq!(sample[0], id(1));
        assert_eq!(sample, stride_sample(&members, 40));
    }
}
