use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use litgraph_core::ProjectId;
use tracing::debug;

use crate::{CacheStats, Clock, TtlCache};

/// A live cached metric value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsCacheEntry {
    pub project_id: ProjectId,
    pub metric_name: String,
    pub value: f64,
    pub expires_at: DateTime<Utc>,
}

/// TTL cache of derived per-project aggregate metrics.
pub struct MetricsCache {
    cache: TtlCache<(ProjectId, String), f64>,
}

impl MetricsCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: TtlCache::new(ttl, clock),
        }
    }

    pub fn get(&self, project_id: ProjectId, metric_name: &str) -> Option<f64> {
        self.cache.get(&(project_id, metric_name.to_string()))
    }

    pub fn entry(&self, project_id: ProjectId, metric_name: &str) -> Option<MetricsCacheEntry> {
        let key = (project_id, metric_name.to_string());
        let expires_at = self.cache.expires_at(&key)?;
        let value = self.cache.get(&key)?;
        Some(MetricsCacheEntry {
            project_id,
            metric_name: metric_name.to_string(),
            value,
            expires_at,
        })
    }

    pub fn put(&self, project_id: ProjectId, metric_name: &str, value: f64) {
        self.cache.insert((project_id, metric_name.to_string()), value);
    }

    /// Drop every metric of a project; called whenever its graph mutates.
    pub fn invalidate_project(&self, project_id: ProjectId) -> usize {
        let removed = self.cache.invalidate_where(|(p, _)| *p == project_id);
        if removed > 0 {
            debug!(%project_id, removed, "invalidated cached metrics");
        }
        removed
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
