use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use litgraph_core::{
    AnalysisSnapshot, AnalysisStore, CentralityRecord, Cluster, Concept, ConceptId, LitGraphError,
    ProjectId, Relationship, Result, StructuralGap,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Concepts and relationships of one project as read from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Dataset {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Default)]
struct ProjectData {
    concepts: Vec<Concept>,
    relationships: Vec<Relationship>,
    analysis: Arc<AnalysisSnapshot>,
}

/// Process-local store. Each project lives under one map shard, so a
/// snapshot swap is a single pointer replacement under that shard's lock.
#[derive(Debug, Default)]
pub struct InMemoryAnalysisStore {
    projects: DashMap<ProjectId, ProjectData>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_project(&self) -> ProjectId {
        let id = Uuid::new_v4();
        self.projects.insert(id, ProjectData::default());
        id
    }

    pub fn delete_project(&self, project_id: ProjectId) -> bool {
        self.projects.remove(&project_id).is_some()
    }

    pub fn project_ids(&self) -> Vec<ProjectId> {
        let mut ids: Vec<ProjectId> = self.projects.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Insert concepts, replacing any with the same id.
    pub fn upsert_concepts(&self, project_id: ProjectId, concepts: Vec<Concept>) -> Result<()> {
        let mut project = self
            .projects
            .get_mut(&project_id)
            .ok_or(LitGraphError::ProjectNotFound(project_id))?;
        for concept in concepts {
            match project.concepts.iter_mut().find(|c| c.id == concept.id) {
                Some(existing) => *existing = concept,
                None => project.concepts.push(concept),
            }
        }
        Ok(())
    }

    pub fn upsert_relationships(
        &self,
        project_id: ProjectId,
        relationships: Vec<Relationship>,
    ) -> Result<()> {
        let mut project = self
            .projects
            .get_mut(&project_id)
            .ok_or(LitGraphError::ProjectNotFound(project_id))?;
        for rel in relationships {
            match project.relationships.iter_mut().find(|r| r.id == rel.id) {
                Some(existing) => *existing = rel,
                None => project.relationships.push(rel),
            }
        }
        Ok(())
    }

    /// Remove concepts and every relationship touching them.
    pub fn remove_concepts(&self, project_id: ProjectId, ids: &[ConceptId]) -> Result<usize> {
        let mut project = self
            .projects
            .get_mut(&project_id)
            .ok_or(LitGraphError::ProjectNotFound(project_id))?;
        let before = project.concepts.len();
        project.concepts.retain(|c| !ids.contains(&c.id));
        project
            .relationships
            .retain(|r| !ids.contains(&r.source) && !ids.contains(&r.target));
        Ok(before - project.concepts.len())
    }

    /// Create (or overwrite) a project from a dataset; returns its id.
    pub fn import(&self, dataset: Dataset) -> ProjectId {
        let id = dataset.project_id.unwrap_or_else(Uuid::new_v4);
        info!(
            project_id = %id,
            concepts = dataset.concepts.len(),
            relationships = dataset.relationships.len(),
            "imported dataset"
        );
        self.projects.insert(
            id,
            ProjectData {
                concepts: dataset.concepts,
                relationships: dataset.relationships,
                analysis: Arc::default(),
            },
        );
        id
    }

    pub fn load_dataset(&self, path: &Path) -> Result<ProjectId> {
        Ok(self.import(Dataset::from_path(path)?))
    }

    /// The whole persisted result set of the last successful run.
    pub fn snapshot(&self, project_id: ProjectId) -> Result<Arc<AnalysisSnapshot>> {
        self.projects
            .get(&project_id)
            .map(|p| p.analysis.clone())
            .ok_or(LitGraphError::ProjectNotFound(project_id))
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn project_exists(&self, project_id: ProjectId) -> Result<bool> {
        Ok(self.projects.contains_key(&project_id))
    }

    async fn load_concepts(&self, project_id: ProjectId) -> Result<Vec<Concept>> {
        self.projects
            .get(&project_id)
            .map(|p| p.concepts.clone())
            .ok_or(LitGraphError::ProjectNotFound(project_id))
    }

    async fn load_relationships(&self, project_id: ProjectId) -> Result<Vec<Relationship>> {
        self.projects
            .get(&project_id)
            .map(|p| p.relationships.clone())
            .ok_or(LitGraphError::ProjectNotFound(project_id))
    }

    async fn replace_analysis(
        &self,
        project_id: ProjectId,
        snapshot: AnalysisSnapshot,
    ) -> Result<()> {
        let mut project = self
            .projects
            .get_mut(&project_id)
            .ok_or(LitGraphError::ProjectNotFound(project_id))?;
        debug!(
            %project_id,
            clusters = snapshot.clusters.len(),
            gaps = snapshot.gaps.len(),
            "replacing analysis rows"
        );
        project.analysis = Arc::new(snapshot);
        Ok(())
    }

    async fn load_clusters(&self, project_id: ProjectId) -> Result<Vec<Cluster>> {
        Ok(self.snapshot(project_id)?.clusters.clone())
    }

    async fn load_gaps(&self, project_id: ProjectId) -> Result<Vec<StructuralGap>> {
        Ok(self.snapshot(project_id)?.gaps.clone())
    }

    async fn load_centrality(&self, project_id: ProjectId) -> Result<Vec<CentralityRecord>> {
        Ok(self.snapshot(project_id)?.centrality.clone())
    }
}
