use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config as cfg;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// External embedding provider usage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EmbeddingConfig {
    #[serde(default = "EmbeddingConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "EmbeddingConfig::default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "EmbeddingConfig::default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Below this many usable embeddings the TF-IDF fallback takes over.
    #[serde(default = "EmbeddingConfig::default_min_embedded")]
    pub min_embedded_concepts: usize,
}

impl EmbeddingConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_batch_size() -> usize {
        32
    }
    fn default_batch_timeout_ms() -> u64 {
        10_000
    }
    fn default_min_embedded() -> usize {
        10
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            batch_size: Self::default_batch_size(),
            batch_timeout_ms: Self::default_batch_timeout_ms(),
            min_embedded_concepts: Self::default_min_embedded(),
        }
    }
}

/// TF-IDF fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VectorizerConfig {
    #[serde(default = "VectorizerConfig::default_max_features")]
    pub max_features: usize,
    #[serde(default = "VectorizerConfig::default_fallback_cap")]
    pub fallback_cap: usize,
}

impl VectorizerConfig {
    fn default_max_features() -> usize {
        64
    }
    fn default_fallback_cap() -> usize {
        1200
    }
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_features: Self::default_max_features(),
            fallback_cap: Self::default_fallback_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClusteringConfig {
    #[serde(default = "ClusteringConfig::default_min_concepts")]
    pub min_concepts: usize,
    #[serde(default = "ClusteringConfig::default_min_cluster_size")]
    pub min_cluster_size: usize,
    #[serde(default = "ClusteringConfig::default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "ClusteringConfig::default_restarts")]
    pub restarts: usize,
    /// Seed for k-means initialisation; never derived from the clock.
    #[serde(default = "ClusteringConfig::default_seed")]
    pub seed: u64,
}

impl ClusteringConfig {
    fn default_min_concepts() -> usize {
        10
    }
    fn default_min_cluster_size() -> usize {
        3
    }
    fn default_max_iterations() -> usize {
        100
    }
    fn default_restarts() -> usize {
        4
    }
    fn default_seed() -> u64 {
        42
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_concepts: Self::default_min_concepts(),
            min_cluster_size: Self::default_min_cluster_size(),
            max_iterations: Self::default_max_iterations(),
            restarts: Self::default_restarts(),
            seed: Self::default_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CentralityConfig {
    #[serde(default = "CentralityConfig::default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "CentralityConfig::default_damping")]
    pub damping: f64,
    #[serde(default = "CentralityConfig::default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "CentralityConfig::default_tolerance")]
    pub tolerance: f64,
    /// Above this node count betweenness uses evenly sampled sources.
    #[serde(default = "CentralityConfig::default_betweenness_sample")]
    pub betweenness_sample: usize,
}

impl CentralityConfig {
    fn default_cache_capacity() -> usize {
        20
    }
    fn default_damping() -> f64 {
        0.85
    }
    fn default_max_iterations() -> usize {
        100
    }
    fn default_tolerance() -> f64 {
        1e-9
    }
    fn default_betweenness_sample() -> usize {
        500
    }
}

impl Default for CentralityConfig {
    fn default() -> Self {
        Self {
            cache_capacity: Self::default_cache_capacity(),
            damping: Self::default_damping(),
            max_iterations: Self::default_max_iterations(),
            tolerance: Self::default_tolerance(),
            betweenness_sample: Self::default_betweenness_sample(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GapConfig {
    #[serde(default = "GapConfig::default_min_cluster_size")]
    pub min_cluster_size: usize,
    #[serde(default = "GapConfig::default_max_normalized_strength")]
    pub max_normalized_strength: f64,
    #[serde(default = "GapConfig::default_min_semantic_distance")]
    pub min_semantic_distance: f64,
    #[serde(default = "GapConfig::default_bridge_tolerance")]
    pub bridge_distance_tolerance: f64,
    #[serde(default = "GapConfig::default_max_bridges")]
    pub max_bridge_candidates: usize,
    #[serde(default = "GapConfig::default_edge_threshold")]
    pub potential_edge_threshold: f64,
    #[serde(default = "GapConfig::default_max_edges")]
    pub max_potential_edges: usize,
    /// Members sampled per cluster side for pairwise distance.
    #[serde(default = "GapConfig::default_distance_sample")]
    pub distance_sample: usize,
}

impl GapConfig {
    fn default_min_cluster_size() -> usize {
        3
    }
    fn default_max_normalized_strength() -> f64 {
        0.1
    }
    fn default_min_semantic_distance() -> f64 {
        0.5
    }
    fn default_bridge_tolerance() -> f64 {
        0.2
    }
    fn default_max_bridges() -> usize {
        5
    }
    fn default_edge_threshold() -> f64 {
        0.3
    }
    fn default_max_edges() -> usize {
        5
    }
    fn default_distance_sample() -> usize {
        40
    }
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: Self::default_min_cluster_size(),
            max_normalized_strength: Self::default_max_normalized_strength(),
            min_semantic_distance: Self::default_min_semantic_distance(),
            bridge_distance_tolerance: Self::default_bridge_tolerance(),
            max_bridge_candidates: Self::default_max_bridges(),
            potential_edge_threshold: Self::default_edge_threshold(),
            max_potential_edges: Self::default_max_edges(),
            distance_sample: Self::default_distance_sample(),
        }
    }
}

/// Weights of the impact and feasibility formulas.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScoringConfig {
    pub impact_size: f64,
    pub impact_bridge: f64,
    pub impact_centrality: f64,
    pub impact_type_diversity: f64,
    pub feasibility_sim_ratio: f64,
    pub feasibility_median_sim: f64,
    pub feasibility_bridge_avail: f64,
    pub feasibility_gap_weakness: f64,
    pub feasibility_sim_spread: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            impact_size: 0.25,
            impact_bridge: 0.25,
            impact_centrality: 0.3,
            impact_type_diversity: 0.2,
            feasibility_sim_ratio: 0.25,
            feasibility_median_sim: 0.2,
            feasibility_bridge_avail: 0.2,
            feasibility_gap_weakness: 0.15,
            feasibility_sim_spread: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MetricsConfig {
    #[serde(default = "MetricsConfig::default_ttl_secs")]
    pub ttl_secs: u64,
}

impl MetricsConfig {
    fn default_ttl_secs() -> u64 {
        300
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: Self::default_ttl_secs(),
        }
    }
}

/// Time boxes for the optional LLM collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LlmConfig {
    #[serde(default = "LlmConfig::default_enabled")]
    pub enabled: bool,
    /// Shared budget across every cluster label call in one run.
    #[serde(default = "LlmConfig::default_label_budget_ms")]
    pub label_budget_ms: u64,
    #[serde(default = "LlmConfig::default_hypothesis_budget_ms")]
    pub hypothesis_budget_ms: u64,
    #[serde(default = "LlmConfig::default_max_hypotheses")]
    pub max_hypotheses: usize,
}

impl LlmConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_label_budget_ms() -> u64 {
        15_000
    }
    fn default_hypothesis_budget_ms() -> u64 {
        15_000
    }
    fn default_max_hypotheses() -> usize {
        5
    }

    pub fn label_budget(&self) -> Duration {
        Duration::from_millis(self.label_budget_ms)
    }

    pub fn hypothesis_budget(&self) -> Duration {
        Duration::from_millis(self.hypothesis_budget_ms)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            label_budget_ms: Self::default_label_budget_ms(),
            hypothesis_budget_ms: Self::default_hypothesis_budget_ms(),
            max_hypotheses: Self::default_max_hypotheses(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Settings {
    #[serde(default = "Settings::default_env")]
    pub env: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vectorizer: VectorizerConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub centrality: CentralityConfig,
    #[serde(default)]
    pub gaps: GapConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Self::default_env(),
            logging: LoggingConfig::default(),
            embedding: EmbeddingConfig::default(),
            vectorizer: VectorizerConfig::default(),
            clustering: ClusteringConfig::default(),
            centrality: CentralityConfig::default(),
            gaps: GapConfig::default(),
            scoring: ScoringConfig::default(),
            metrics: MetricsConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Settings {
    fn default_env() -> String {
        env::var("APP_ENV")
            .ok()
            .or_else(|| env::var("RUST_ENV").ok())
            .unwrap_or_else(|| "development".to_string())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be > 0"
        );
        anyhow::ensure!(
            self.vectorizer.max_features > 0 && self.vectorizer.max_features <= 4096,
            "vectorizer.max_features must be 1..=4096"
        );
        anyhow::ensure!(
            self.vectorizer.fallback_cap >= self.clustering.min_concepts,
            "vectorizer.fallback_cap must be >= clustering.min_concepts"
        );
        anyhow::ensure!(
            self.clustering.min_concepts >= 9,
            "clustering.min_concepts must be >= 9 so that k=3 is reachable"
        );
        anyhow::ensure!(
            self.clustering.min_cluster_size > 0,
            "clustering.min_cluster_size must be > 0"
        );
        anyhow::ensure!(
            self.centrality.cache_capacity > 0,
            "centrality.cache_capacity must be > 0"
        );
        anyhow::ensure!(
            self.centrality.damping > 0.0 && self.centrality.damping < 1.0,
            "centrality.damping must be in (0, 1)"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.gaps.max_normalized_strength),
            "gaps.max_normalized_strength must be in [0, 1]"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.gaps.potential_edge_threshold),
            "gaps.potential_edge_threshold must be in [0, 1]"
        );
        anyhow::ensure!(self.gaps.distance_sample > 0, "gaps.distance_sample must be > 0");

        let s = &self.scoring;
        let impact = s.impact_size + s.impact_bridge + s.impact_centrality + s.impact_type_diversity;
        let feasibility = s.feasibility_sim_ratio
            + s.feasibility_median_sim
            + s.feasibility_bridge_avail
            + s.feasibility_gap_weakness
            + s.feasibility_sim_spread;
        anyhow::ensure!(
            (impact - 1.0).abs() < 1e-6,
            "scoring impact weights must sum to 1 (got {impact})"
        );
        anyhow::ensure!(
            (feasibility - 1.0).abs() < 1e-6,
            "scoring feasibility weights must sum to 1 (got {feasibility})"
        );
        Ok(())
    }

    /// Default configuration directory: `$LITGRAPH_CONFIG_DIR` or `./config`.
    pub fn default_config_dir() -> PathBuf {
        env::var("LITGRAPH_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    /// Layered load: defaults, environment file, `local.toml`, then
    /// `LITGRAPH__SECTION__KEY` environment variables.
    pub fn load_from_sources(config_dir: &Path, env_name: &str) -> Result<Settings> {
        let builder = cfg::Config::builder()
            .add_source(cfg::File::from(config_dir.join("default.toml")).required(false))
            .add_source(cfg::File::from(config_dir.join("default.yaml")).required(false))
            .add_source(cfg::File::from(config_dir.join("default.json")).required(false))
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.toml", env_name))).required(false),
            )
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.yaml", env_name))).required(false),
            )
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.json", env_name))).required(false),
            )
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(cfg::Environment::with_prefix("LITGRAPH").separator("__"));

        let mut settings: Settings = builder
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;
        settings.env = env_name.to_string();
        settings.validate().context("validating configuration")?;
        debug!(config_dir = %config_dir.display(), env = env_name, "configuration loaded");
        Ok(settings)
    }

    pub fn load(config_dir: Option<PathBuf>, env_override: Option<String>) -> Result<Settings> {
        let dir = config_dir.unwrap_or_else(Self::default_config_dir);
        let env_name = env_override.unwrap_or_else(Self::default_env);
        Self::load_from_sources(&dir, &env_name)
    }
}
