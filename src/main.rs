use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing::error;

use terrazas_etl::config::Config;
use terrazas_etl::constants::INSPECTIONS_COLLECTION;
use terrazas_etl::ingest;
use terrazas_etl::logging;
use terrazas_etl::pipeline::{neighborhood_stats, GraphProjector, RuleEngine};
use terrazas_etl::storage::{DocumentStore, GraphStore, InMemoryDocumentStore};

#[derive(Parser)]
#[command(name = "terrazas_etl")]
#[command(about = "Madrid terrace permit data migration pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the payload files into the document store
    Ingest,
    /// Load the payloads and apply the transformation rule set
    Transform,
    /// Load, transform and project the records into the graph store
    Project,
    /// Load the payloads and print the neighborhood statistics
    Report,
    /// Run the complete pipeline end to end
    Run,
}

#[cfg(feature = "neo4j")]
async fn build_graph_store(
    config: &Config,
) -> Result<Arc<dyn GraphStore>, Box<dyn std::error::Error>> {
    use terrazas_etl::storage::Neo4jGraphStore;
    Ok(Arc::new(Neo4jGraphStore::connect(&config.graph).await?))
}

#[cfg(not(feature = "neo4j"))]
async fn build_graph_store(
    _config: &Config,
) -> Result<Arc<dyn GraphStore>, Box<dyn std::error::Error>> {
    use terrazas_etl::storage::InMemoryGraphStore;
    Ok(Arc::new(InMemoryGraphStore::new()))
}

async fn ingest_stage(
    config: &Config,
    documents: &Arc<dyn DocumentStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("📦 Loading payload files...");
    let loaded = ingest::load_payloads(documents.as_ref(), &config.data).await?;
    for (collection, summary) in &loaded {
        println!(
            "   {}: {} documents ({} skipped)",
            collection, summary.inserted, summary.skipped_lines
        );
    }

    if loaded.iter().any(|(c, _)| c == INSPECTIONS_COLLECTION) {
        let path = Path::new(&config.data.dir).join(&config.data.export_file);
        let exported =
            ingest::export_collection(documents.as_ref(), INSPECTIONS_COLLECTION, &path).await?;
        println!(
            "   exported {} inspection documents to {}",
            exported,
            path.display()
        );
    }
    Ok(())
}

async fn transform_stage(config: &Config, documents: &Arc<dyn DocumentStore>) {
    println!("🔧 Applying transformation rules...");
    let report = RuleEngine::new(documents.clone(), config.rules.clone())
        .run()
        .await;
    println!(
        "   {} rules run, {} failed, {} documents touched",
        report.rules_run, report.rules_failed, report.documents_touched
    );
    if !report.errors.is_empty() {
        println!("\n⚠️  Rule failures:");
        for error in &report.errors {
            println!("   - {}", error);
        }
    }
}

async fn project_stage(
    documents: &Arc<dyn DocumentStore>,
    graph: &Arc<dyn GraphStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🗺️  Projecting records into the graph store...");
    let report = GraphProjector::new(documents.clone(), graph.clone())
        .run()
        .await?;
    println!(
        "   {} of {} records projected ({} skipped)",
        report.records_projected, report.records_seen, report.records_skipped
    );
    println!(
        "   nodes: {} districts, {} neighborhoods, {} venues, {} terraces; {} edges",
        report.counts.districts,
        report.counts.neighborhoods,
        report.counts.venues,
        report.counts.terraces,
        report.counts.edges
    );
    if !report.failures.is_empty() {
        println!("\n⚠️  Projection failures:");
        for failure in &report.failures {
            println!("   - {}", failure);
        }
    }
    Ok(())
}

async fn report_stage(
    config: &Config,
    documents: &Arc<dyn DocumentStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("📊 Neighborhood statistics:");
    let stats = neighborhood_stats(documents.as_ref(), &config.report).await?;
    print!("{}", stats.render());
    Ok(())
}

async fn run_command(
    command: &Commands,
    config: &Config,
    documents: &Arc<dyn DocumentStore>,
    graph: Option<&Arc<dyn GraphStore>>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Ingest => {
            ingest_stage(config, documents).await?;
        }
        Commands::Transform => {
            ingest_stage(config, documents).await?;
            transform_stage(config, documents).await;
        }
        Commands::Project => {
            // Projection reads rule-derived fields, so the rule set always
            // runs first within a process
            let graph = graph.ok_or("graph store not initialized")?;
            ingest_stage(config, documents).await?;
            transform_stage(config, documents).await;
            project_stage(documents, graph).await?;
        }
        Commands::Report => {
            ingest_stage(config, documents).await?;
            report_stage(config, documents).await?;
        }
        Commands::Run => {
            let graph = graph.ok_or("graph store not initialized")?;
            ingest_stage(config, documents).await?;
            transform_stage(config, documents).await;
            project_stage(documents, graph).await?;
            report_stage(config, documents).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;

    let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    if let Err(e) = documents.ping().await {
        error!("Document store unreachable: {}", e);
        return Err(e.into());
    }

    let graph = match cli.command {
        Commands::Project | Commands::Run => {
            let graph = build_graph_store(&config).await?;
            if let Err(e) = graph.ping().await {
                error!("Graph store unreachable: {}", e);
                return Err(e.into());
            }
            Some(graph)
        }
        _ => None,
    };

    let outcome = run_command(&cli.command, &config, &documents, graph.as_ref()).await;

    // Both stores close no matter how the run went
    if let Err(e) = documents.close().await {
        error!("Failed to close document store: {}", e);
    }
    if let Some(graph) = &graph {
        if let Err(e) = graph.close().await {
            error!("Failed to close graph store: {}", e);
        }
    }

    match &outcome {
        Ok(()) => println!("\n✅ Done"),
        Err(e) => println!("\n❌ Run failed: {}", e),
    }
    outcome
}
