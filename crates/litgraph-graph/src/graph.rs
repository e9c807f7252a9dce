use std::collections::{BTreeSet, HashMap};

use litgraph_core::{Cluster, ConceptId, Relationship};

/// Arena of concepts and relationships for one project.
///
/// Nodes are addressed by dense indices; `ConceptId`s only appear at the
/// boundary. Undirected adjacency is deduplicated and excludes self-loops;
/// directed out-links keep relationship direction for PageRank.
#[derive(Debug, Clone, Default)]
pub struct ConceptGraph {
    ids: Vec<ConceptId>,
    index: HashMap<ConceptId, usize>,
    adjacency: Vec<Vec<usize>>,
    out_links: Vec<Vec<usize>>,
    cluster_of: Vec<Option<u32>>,
    edge_count: usize,
}

impl ConceptGraph {
    /// Build from concept ids and relationships; relationships touching
    /// unknown concepts are dropped.
    pub fn build<I>(concept_ids: I, relationships: &[Relationship]) -> Self
    where
        I: IntoIterator<Item = ConceptId>,
    {
        let mut ids = Vec::new();
        let mut index = HashMap::new();
        for id in concept_ids {
            if let std::collections::hash_map::Entry::Vacant(slot) = index.entry(id) {
                slot.insert(ids.len());
                ids.push(id);
            }
        }

        let n = ids.len();
        let mut undirected: BTreeSet<(usize, usize)> = BTreeSet::new();
        let mut directed: BTreeSet<(usize, usize)> = BTreeSet::new();
        for rel in relationships {
            let (Some(&s), Some(&t)) = (index.get(&rel.source), index.get(&rel.target)) else {
                continue;
            };
            if s == t {
                continue;
            }
            directed.insert((s, t));
            undirected.insert((s.min(t), s.max(t)));
        }

        let mut adjacency = vec![Vec::new(); n];
        for &(a, b) in &undirected {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
        let mut out_links = vec![Vec::new(); n];
        for &(s, t) in &directed {
            out_links[s].push(t);
        }

        Self {
            ids,
            index,
            adjacency,
            out_links,
            cluster_of: vec![None; n],
            edge_count: undirected.len(),
        }
    }

    /// Record which cluster each node belongs to.
    pub fn assign_clusters(&mut self, clusters: &[Cluster]) {
        self.cluster_of.iter_mut().for_each(|c| *c = None);
        for cluster in clusters {
            for id in &cluster.concept_ids {
                if let Some(&idx) = self.index.get(id) {
                    self.cluster_of[idx] = Some(cluster.cluster_id);
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    /// Distinct undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn index_of(&self, id: &ConceptId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn id_at(&self, idx: usize) -> ConceptId {
        self.ids[idx]
    }

    pub fn ids(&self) -> &[ConceptId] {
        &self.ids
    }

    pub fn neighbors(&self, idx: usize) -> &[usize] {
        &self.adjacency[idx]
    }

    pub fn out_neighbors(&self, idx: usize) -> &[usize] {
        &self.out_links[idx]
    }

    pub fn cluster_of(&self, idx: usize) -> Option<u32> {
        self.cluster_of[idx]
    }

    pub fn are_adjacent(&self, a: usize, b: usize) -> bool {
        self.adjacency[a].binary_search(&b).is_ok()
    }

    /// Undirected edges with both endpoints in `members`.
    pub fn internal_edge_count(&self, members: &BTreeSet<ConceptId>) -> usize {
        let idx: Vec<usize> = members.iter().filter_map(|id| self.index_of(id)).collect();
        let set: BTreeSet<usize> = idx.iter().copied().collect();
        idx.iter()
            .map(|&a| {
                self.adjacency[a]
                    .iter()
                    .filter(|&&b| b > a && set.contains(&b))
                    .count()
            })
            .sum()
    }

    /// Undirected edges with one endpoint in `a` and the other in `b`.
    pub fn cross_edge_count(&self, a: &BTreeSet<ConceptId>, b: &BTreeSet<ConceptId>) -> usize {
        let b_idx: BTreeSet<usize> = b.iter().filter_map(|id| self.index_of(id)).collect();
        a.iter()
            .filter_map(|id| self.index_of(id))
            .map(|ai| {
                self.adjacency[ai]
                    .iter()
                    .filter(|bi| b_idx.contains(bi))
                    .count()
            })
            .sum()
    }
}
