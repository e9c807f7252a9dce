//! Human-readable cluster labels.
//!
//! Every cluster first gets a keyword label built from the names of its most
//! central members. When a language-model collaborator is configured, all
//! clusters are summarized concurrently under one shared deadline and any
//! cluster whose call fails keeps its keyword label.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use litgraph_core::{Cluster, ConceptId, LlmInsightProvider};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::index::VectorIndex;

const LABEL_TERMS: usize = 3;
const LLM_CONTEXT_NAMES: usize = 10;

/// Member names ranked by similarity to the centroid, ties broken by name.
pub fn representative_names(
    cluster: &Cluster,
    names: &HashMap<ConceptId, String>,
    index: &VectorIndex,
    limit: usize,
) -> Vec<String> {
    let mut ranked: Vec<(f64, &str)> = cluster
        .concept_ids
        .iter()
        .filter_map(|id| {
            let name = names.get(id)?;
            let sim = index.similarity_to(id, &cluster.centroid).unwrap_or(0.0);
            Some((sim, name.as_str()))
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, name)| name.to_string())
        .collect()
}

pub fn keyword_label(
    cluster: &Cluster,
    names: &HashMap<ConceptId, String>,
    index: &VectorIndex,
) -> String {
    let top = representative_names(cluster, names, index, LABEL_TERMS);
    if top.is_empty() {
        format!("Cluster {}", cluster.cluster_id)
    } else {
        top.join(" / ")
    }
}

pub struct ClusterLabeler {
    llm: Option<Arc<dyn LlmInsightProvider>>,
    budget: Duration,
}

impl ClusterLabeler {
    pub fn new(llm: Option<Arc<dyn LlmInsightProvider>>, budget: Duration) -> Self {
        Self { llm, budget }
    }

    /// Label every cluster in place. Returns how many labels came from the LLM.
    pub async fn label_all(
        &self,
        clusters: &mut [Cluster],
        names: &HashMap<ConceptId, String>,
        index: &VectorIndex,
    ) -> usize {
        for cluster in clusters.iter_mut() {
            cluster.label = keyword_label(cluster, names, index);
        }

        let Some(llm) = &self.llm else {
            return 0;
        };

        let deadline = Instant::now() + self.budget;
        let requests = clusters.iter().map(|cluster| {
            let context = representative_names(cluster, names, index, LLM_CONTEXT_NAMES);
            let llm = llm.clone();
            let cluster_id = cluster.cluster_id;
            async move {
                match timeout_at(deadline, llm.summarize_label(&context)).await {
                    Ok(Ok(label)) if !label.trim().is_empty() => Some(label.trim().to_string()),
                    Ok(Ok(_)) => {
                        debug!(cluster_id, "llm returned a blank label");
                        None
                    }
                    Ok(Err(error)) => {
                        warn!(cluster_id, %error, provider = llm.provider_name(), "label generation failed");
                        None
                    }
                    Err(_) => {
                        warn!(cluster_id, "label generation timed out, keeping keyword label");
                        None
                    }
                }
            }
        });

        let results = join_all(requests).await;
        let mut from_llm = 0;
        for (cluster, label) in clusters.iter_mut().zip(results) {
            if let Some(label) = label {
                cluster.label = label;
                from_llm += 1;
            }
        }
        from_llm
    }
}
