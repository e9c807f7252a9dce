use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use litgraph_analysis::{AnalysisOrchestrator, InMemoryAnalysisStore, MetricKind};
use litgraph_core::{AnalysisStore, Cluster, ConceptId, RunSummary, Settings, StructuralGap};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "litgraph")]
#[command(about = "LitGraph - concept clustering and research gap analysis", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Directory holding default/<env>/local configuration files
    #[arg(long, global = true, env = "LITGRAPH_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Configuration environment name
    #[arg(long, global = true)]
    env: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a dataset file of concepts and relationships
    Analyze {
        /// JSON dataset with `concepts` and `relationships`
        dataset: PathBuf,

        /// Override the clustering seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the JSON schema of the configuration
    Schema,

    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct AnalysisReport {
    summary: RunSummary,
    clusters: Vec<Cluster>,
    gaps: Vec<StructuralGap>,
    metrics: HashMap<MetricKind, f64>,
    #[serde(skip)]
    names: HashMap<ConceptId, String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config_dir.clone(), cli.env.clone())
        .context("Failed to load configuration")?;
    init_tracing(&settings);

    match execute_command(&cli, settings).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr so JSON output on stdout stays parseable.
fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn execute_command(cli: &Cli, settings: Settings) -> Result<()> {
    match &cli.command {
        Commands::Analyze { dataset, seed } => {
            let mut settings = settings;
            if let Some(seed) = seed {
                settings.clustering.seed = *seed;
            }
            let report = analyze(dataset, settings).await?;
            match cli.output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Pretty => print_report(&report),
            }
        }
        Commands::Schema => {
            let schema = schemars::schema_for!(Settings);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::Config => match cli.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
            OutputFormat::Pretty => print_pretty(&serde_json::to_value(&settings)?, 0),
        },
    }
    Ok(())
}

async fn analyze(path: &Path, settings: Settings) -> Result<AnalysisReport> {
    let store = Arc::new(InMemoryAnalysisStore::new());
    let project = store
        .load_dataset(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let names: HashMap<ConceptId, String> = store
        .load_concepts(project)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    info!(%project, concepts = names.len(), "dataset loaded");

    let orchestrator = AnalysisOrchestrator::new(settings, store);
    let summary = orchestrator.refresh(project).await?;
    let clusters = orchestrator.get_clusters(project).await?;
    let gaps = orchestrator.get_gaps(project).await?;

    let mut metrics = HashMap::new();
    for kind in MetricKind::ALL {
        metrics.insert(kind, orchestrator.get_metric(project, kind).await?);
    }

    Ok(AnalysisReport {
        summary,
        clusters,
        gaps,
        metrics,
        names,
    })
}

fn print_report(report: &AnalysisReport) {
    let s = &report.summary;
    println!("{}", "Analysis".cyan().bold());
    println!("  {}: {}", "run".cyan(), s.run_id.to_string().green());
    println!("  {}: {}", "vectors".cyan(), s.vector_source.to_string().green());
    println!(
        "  {}: {} ({} excluded)",
        "concepts".cyan(),
        s.concepts_analyzed.to_string().yellow(),
        s.excluded.len()
    );
    println!(
        "  {}: {}  silhouette {:.3}",
        "clusters".cyan(),
        s.cluster_count.to_string().yellow(),
        s.silhouette
    );

    let mut metrics: Vec<_> = report.metrics.iter().collect();
    metrics.sort_by_key(|(kind, _)| kind.as_str());
    for (kind, value) in metrics {
        println!("  {}: {}", kind.as_str().cyan(), format!("{value:.3}").yellow());
    }

    println!("\n{}", "Clusters".cyan().bold());
    for cluster in &report.clusters {
        println!(
            "  [{}] {} ({} concepts, density {:.2})",
            cluster.cluster_id.to_string().yellow(),
            cluster.label.green(),
            cluster.size,
            cluster.density
        );
    }

    println!("\n{}", "Research gaps".cyan().bold());
    if report.gaps.is_empty() {
        let reason = s
            .no_gaps_reason
            .map(|r| format!("{r:?}"))
            .unwrap_or_else(|| "no sparse, distant cluster pairs".to_string());
        println!("  {}", reason.red());
    }
    let label_of = |id: u32| {
        report
            .clusters
            .iter()
            .find(|c| c.cluster_id == id)
            .map(|c| c.label.as_str())
            .unwrap_or("?")
    };
    for (rank, gap) in report.gaps.iter().enumerate() {
        println!(
            "  {}. {} {} {}  {}",
            rank + 1,
            label_of(gap.cluster_a_id).green(),
            "<->".dimmed(),
            label_of(gap.cluster_b_id).green(),
            opportunity_bar(gap.opportunity_percent())
        );
        println!(
            "     impact {}  feasibility {}  distance {:.2}",
            format!("{:.2}", gap.impact_score).yellow(),
            format!("{:.2}", gap.feasibility_score).yellow(),
            gap.semantic_distance
        );
        let bridges: Vec<&str> = gap
            .bridge_candidates
            .iter()
            .filter_map(|id| report.names.get(id).map(String::as_str))
            .collect();
        if !bridges.is_empty() {
            println!("     bridges: {}", bridges.join(", "));
        }
        if let Some(h) = &gap.hypothesis {
            println!("     {} {} ({:.0}%)", "hypothesis:".cyan(), h.text, h.confidence * 100.0);
        }
    }
}

fn opportunity_bar(percent: u8) -> String {
    let filled = usize::from(percent) / 10;
    format!(
        "{}{} {}%",
        "#".repeat(filled).green(),
        ".".repeat(10 - filled).dimmed(),
        percent
    )
}

fn print_pretty(value: &serde_json::Value, depth: usize) {
    let indent = "  ".repeat(depth);
    if let serde_json::Value::Object(map) = value {
        for (key, val) in map {
            let key_colored = key.cyan().bold();
            match val {
                serde_json::Value::Object(_) => {
                    println!("{indent}{key_colored}:");
                    print_pretty(val, depth + 1);
                }
                serde_json::Value::String(s) => println!("{indent}{key_colored}: {}", s.green()),
                serde_json::Value::Number(n) => {
                    println!("{indent}{key_colored}: {}", n.to_string().yellow())
                }
                _ => println!("{indent}{key_colored}: {val}"),
            }
        }
    } else {
        println!("{indent}{value}");
    }
}
