//! Local TF-IDF vectors over concept names and definitions.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::VectorizeError;
use crate::ops::normalize;

const STOPWORDS: &[&str] = &[
    "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it", "of",
    "on", "or", "that", "the", "their", "this", "to", "via", "was", "with",
];

/// Lowercase alphanumeric words of length >= 2, stopwords removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1 && !STOPWORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Feature vocabulary with smoothed inverse document frequencies.
#[derive(Debug, Clone)]
pub struct TfidfModel {
    features: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfModel {
    /// Keep the `max_features` most frequent terms across the corpus
    /// (ties broken lexicographically).
    pub fn fit(docs: &[Vec<String>], max_features: usize) -> Result<Self, VectorizeError> {
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for doc in docs {
            let mut seen: HashSet<&str> = HashSet::new();
            for token in doc {
                *term_freq.entry(token.as_str()).or_insert(0) += 1;
                if seen.insert(token.as_str()) {
                    *doc_freq.entry(token.as_str()).or_insert(0) += 1;
                }
            }
        }
        if term_freq.is_empty() {
            return Err(VectorizeError::EmptyVocabulary);
        }

        let mut ranked: Vec<(&str, usize)> = term_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);

        // Dimension order is lexicographic so vectors are stable across runs.
        let mut terms: Vec<&str> = ranked.into_iter().map(|(t, _)| t).collect();
        terms.sort_unstable();

        let n = docs.len() as f64;
        let mut features = BTreeMap::new();
        let mut idf = Vec::with_capacity(terms.len());
        for (dim, term) in terms.into_iter().enumerate() {
            let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
            idf.push(((1.0 + n) / (1.0 + df)).ln() + 1.0);
            features.insert(term.to_string(), dim);
        }

        Ok(Self { features, idf })
    }

    pub fn dimension(&self) -> usize {
        self.idf.len()
    }

    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    /// L2-normalized TF-IDF vector for one tokenized document.
    pub fn transform(&self, tokens: &[String]) -> Vec<f32> {
        let mut counts = vec![0.0f64; self.idf.len()];
        for token in tokens {
            if let Some(&dim) = self.features.get(token) {
                counts[dim] += 1.0;
            }
        }
        let mut v: Vec<f32> = counts
            .iter()
            .zip(&self.idf)
            .map(|(tf, idf)| (tf * idf) as f32)
            .collect();
        normalize(&mut v);
        v
    }
}
