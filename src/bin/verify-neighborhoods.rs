use std::sync::Arc;

use terrazas_etl::config::Config;
use terrazas_etl::ingest;
use terrazas_etl::pipeline::neighborhood_stats;
use terrazas_etl::storage::InMemoryDocumentStore;

/// Standalone check that the bounded sample used for visualization actually
/// covers the neighborhoods present in the full collection.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let config = Config::load()?;
    let store = Arc::new(InMemoryDocumentStore::new());

    println!("🔎 Checking neighborhood coverage...");
    ingest::load_payloads(store.as_ref(), &config.data).await?;

    let stats = neighborhood_stats(store.as_ref(), &config.report).await?;
    print!("{}", stats.render());

    Ok(())
}
