//! Impact and feasibility scores for detected gaps.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use litgraph_core::{
    CentralityRecord, Cluster, Concept, ConceptId, EntityType, ScoringConfig, StructuralGap,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapScore {
    pub impact: f64,
    pub feasibility: f64,
}

/// Per-run lookups the scores are computed against.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    cluster_sizes: HashMap<u32, usize>,
    cluster_members: HashMap<u32, BTreeSet<ConceptId>>,
    entity_types: HashMap<ConceptId, EntityType>,
    betweenness: HashMap<ConceptId, f64>,
    /// PageRank divided by the project maximum.
    relative_pagerank: HashMap<ConceptId, f64>,
    max_bridges: usize,
}

impl ScoringContext {
    pub fn new(
        clusters: &[Cluster],
        concepts: &[Concept],
        centrality: &[CentralityRecord],
        max_bridges: usize,
    ) -> Self {
        let max_pagerank = centrality
            .iter()
            .map(|r| r.pagerank)
            .fold(0.0f64, f64::max);
        Self {
            cluster_sizes: clusters.iter().map(|c| (c.cluster_id, c.size)).collect(),
            cluster_members: clusters
                .iter()
                .map(|c| (c.cluster_id, c.concept_ids.clone()))
                .collect(),
            entity_types: concepts.iter().map(|c| (c.id, c.entity_type())).collect(),
            betweenness: centrality
                .iter()
                .map(|r| (r.concept_id, r.betweenness))
                .collect(),
            relative_pagerank: centrality
                .iter()
                .map(|r| {
                    let rel = if max_pagerank > 0.0 {
                        r.pagerank / max_pagerank
                    } else {
                        0.0
                    };
                    (r.concept_id, rel)
                })
                .collect(),
            max_bridges: max_bridges.max(1),
        }
    }

    fn size_ratio(&self, gap: &StructuralGap) -> f64 {
        let a = self.cluster_sizes.get(&gap.cluster_a_id).copied().unwrap_or(0);
        let b = self.cluster_sizes.get(&gap.cluster_b_id).copied().unwrap_or(0);
        let (small, large) = (a.min(b), a.max(b));
        if large == 0 {
            0.0
        } else {
            small as f64 / large as f64
        }
    }

    fn bridge_factor(&self, gap: &StructuralGap) -> f64 {
        mean(
            gap.bridge_candidates
                .iter()
                .map(|id| self.betweenness.get(id).copied().unwrap_or(0.0)),
        )
    }

    fn centrality_factor(&self, gap: &StructuralGap) -> f64 {
        let members = [gap.cluster_a_id, gap.cluster_b_id]
            .into_iter()
            .filter_map(|cid| self.cluster_members.get(&cid))
            .flatten();
        mean(members.map(|id| self.relative_pagerank.get(id).copied().unwrap_or(0.0)))
    }

    pub fn type_diversity(&self, gap: &StructuralGap) -> f64 {
        let distinct: BTreeSet<EntityType> = gap
            .bridge_candidates
            .iter()
            .filter_map(|id| self.entity_types.get(id).copied())
            .collect();
        distinct.len() as f64 / EntityType::COUNT as f64
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn median(sorted: &[f64]) -> f64 {
    match sorted.len() {
        0 => 0.0,
        n if n % 2 == 1 => sorted[n / 2],
        n => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

pub struct ScoringEngine {
    weights: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(weights: ScoringConfig) -> Self {
        Self { weights }
    }

    pub fn score(&self, gap: &StructuralGap, ctx: &ScoringContext) -> GapScore {
        let w = &self.weights;

        let impact = w.impact_size * ctx.size_ratio(gap).sqrt()
            + w.impact_bridge * ctx.bridge_factor(gap)
            + w.impact_centrality * ctx.centrality_factor(gap)
            + w.impact_type_diversity * ctx.type_diversity(gap);

        let mut sims: Vec<f64> = gap.potential_edges.iter().map(|e| e.similarity).collect();
        sims.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let spread = match (sims.first(), sims.last()) {
            (Some(lo), Some(hi)) if sims.len() > 1 => hi - lo,
            _ => 0.0,
        };
        let bridge_avail =
            (gap.bridge_candidates.len() as f64 / ctx.max_bridges as f64).min(1.0);
        let gap_weakness = (1.0 - gap.normalized_strength).max(0.0).sqrt();

        let feasibility = w.feasibility_sim_ratio * gap.similar_pair_ratio
            + w.feasibility_median_sim * median(&sims)
            + w.feasibility_bridge_avail * bridge_avail
            + w.feasibility_gap_weakness * gap_weakness
            + w.feasibility_sim_spread * spread;

        GapScore {
            impact: impact.clamp(0.0, 1.0),
            feasibility: feasibility.clamp(0.0, 1.0),
        }
    }

    /// Fill in scores and sort by impact, then feasibility, both descending.
    pub fn score_and_rank(&self, gaps: &mut [StructuralGap], ctx: &ScoringContext) {
        for gap in gaps.iter_mut() {
            let score = self.score(gap, ctx);
            gap.impact_score = score.impact;
            gap.feasibility_score = score.feasibility;
        }
        gaps.sort_by(|a, b| {
            b.impact_score
                .partial_cmp(&a.impact_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    b.feasibility_score
                        .partial_cmp(&a.feasibility_score)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| {
                    (a.cluster_a_id, a.cluster_b_id).cmp(&(b.cluster_a_id, b.cluster_b_id))
                })
        });
    }
}
