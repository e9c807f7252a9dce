use std::collections::HashMap;

use litgraph_core::{ConceptId, ConceptVector};
use litgraph_vector::{cosine_distance, cosine_similarity, normalize};

/// Unit-length vectors of one run, addressed by concept id.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    vectors: HashMap<ConceptId, Vec<f32>>,
    order: Vec<ConceptId>,
}

impl VectorIndex {
    pub fn from_vectors(vectors: &[ConceptVector]) -> Self {
        let mut index = Self::default();
        for cv in vectors {
            let mut v = cv.vector.clone();
            normalize(&mut v);
            if index.vectors.insert(cv.concept_id, v).is_none() {
                index.order.push(cv.concept_id);
            }
        }
        index.order.sort();
        index
    }

    pub fn get(&self, id: &ConceptId) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    /// Concept ids in ascending order.
    pub fn ids(&self) -> &[ConceptId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Cosine similarity; 0.0 when either id is unknown.
    pub fn similarity(&self, a: &ConceptId, b: &ConceptId) -> f64 {
        match (self.get(a), self.get(b)) {
            (Some(x), Some(y)) => cosine_similarity(x, y),
            _ => 0.0,
        }
    }

    /// Cosine distance from a concept to an arbitrary point such as a centroid.
    pub fn distance_to(&self, id: &ConceptId, point: &[f32]) -> Option<f64> {
        self.get(id).map(|v| cosine_distance(v, point))
    }

    pub fn similarity_to(&self, id: &ConceptId, point: &[f32]) -> Option<f64> {
        self.get(id).map(|v| cosine_similarity(v, point))
    }
}
