mod batch;
mod error;
mod loader;
mod record;
mod row_parser;
mod schema;
mod store;
mod subgraph;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use loader::{LoadSummary, Loader, LoaderOptions, DEFAULT_BATCH_SIZE};
use std::env;
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use store::bolt::BoltStore;
use store::memory::MemoryStore;
use store::rest::{Credentials, RestBatchStore};
use store::StoreBackend;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

// ============================================================================
// Command Line
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "npi-graph", version, about = "Load the NPI provider registry into a graph store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a registry CSV file into the store at <STORE_URL>
    Load(LoadArgs),
}

#[derive(Debug, Args)]
struct LoadArgs {
    /// Registry CSV file
    csv_file: PathBuf,

    /// http(s):// for the REST batch endpoint, bolt:// or neo4j:// for Bolt
    store_url: String,

    /// The file has no header row
    #[arg(long)]
    no_header: bool,

    /// Records per submitted batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Apply batches to an in-memory graph instead of the store
    #[arg(long)]
    dry_run: bool,
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Config {
    neo4j_user: Option<String>,
    neo4j_password: Option<String>,
    batch_size: usize,
    connect_retries: u32,
}

impl Config {
    fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let batch_size = match lookup("NPI_BATCH_SIZE") {
            Some(value) => value
                .parse()
                .with_context(|| format!("NPI_BATCH_SIZE is not a number: {}", value))?,
            None => DEFAULT_BATCH_SIZE,
        };
        let connect_retries = match lookup("NPI_CONNECT_RETRIES") {
            Some(value) => value
                .parse()
                .with_context(|| format!("NPI_CONNECT_RETRIES is not a number: {}", value))?,
            None => 4,
        };

        Ok(Config {
            neo4j_user: lookup("NEO4J_USER").filter(|u| !u.is_empty()),
            neo4j_password: lookup("NEO4J_PASSWORD"),
            batch_size,
            connect_retries,
        })
    }

    fn rest_credentials(&self) -> Option<Credentials> {
        self.neo4j_user.as_ref().map(|user| Credentials {
            user: user.clone(),
            password: self.neo4j_password.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StoreKind {
    Rest,
    Bolt,
}

fn store_kind(url: &str) -> Result<StoreKind> {
    let scheme = url
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .with_context(|| format!("Store URL has no scheme: {}", url))?;

    match scheme.as_str() {
        "http" | "https" => Ok(StoreKind::Rest),
        "bolt" | "bolt+s" | "bolt+ssc" | "neo4j" | "neo4j+s" | "neo4j+ssc" => Ok(StoreKind::Bolt),
        other => anyhow::bail!("Unsupported store URL scheme: {}", other),
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Wait before the retry that follows `attempt`: 1s, 2s, 4s, 8s, ...
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Run `connect` until it succeeds, with exponential backoff between attempts
async fn connect_with_retry<T, E, F, Fut>(what: &str, max_retries: u32, mut connect: F) -> Result<T>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let max_retries = max_retries.max(1);
    for attempt in 1..=max_retries {
        info!("🔄 Attempting to connect to {}... (attempt {}/{})", what, attempt, max_retries);

        match connect().await {
            Ok(connection) => {
                info!("✅ Successfully connected to {}", what);
                return Ok(connection);
            }
            Err(e) => {
                if attempt < max_retries {
                    let wait_time = backoff_delay(attempt);
                    warn!(
                        "⚠️  Failed to connect to {}: {}. Retrying in {}s (attempt {}/{})...",
                        what,
                        e,
                        wait_time.as_secs(),
                        attempt,
                        max_retries
                    );
                    sleep(wait_time).await;
                } else {
                    error!("❌ Failed to connect to {} after {} attempts: {}", what, max_retries, e);
                    return Err(anyhow::anyhow!(
                        "{} connection failed after {} retries: {}",
                        what,
                        max_retries,
                        e
                    ));
                }
            }
        }
    }

    Err(anyhow::anyhow!("Failed to connect to {}", what))
}

async fn open_store(args: &LoadArgs, config: &Config) -> Result<StoreBackend> {
    if args.dry_run {
        info!("🧪 Dry run: batches go to an in-memory graph");
        return Ok(StoreBackend::Memory(MemoryStore::new()));
    }

    match store_kind(&args.store_url)? {
        StoreKind::Rest => {
            let store = RestBatchStore::new(args.store_url.as_str(), config.rest_credentials());
            connect_with_retry("REST endpoint", config.connect_retries, || store.ping()).await?;
            Ok(StoreBackend::Rest(store))
        }
        StoreKind::Bolt => {
            let user = config.neo4j_user.clone().unwrap_or_else(|| "neo4j".to_string());
            let password = config.neo4j_password.clone().unwrap_or_default();
            let graph = connect_with_retry("Neo4j", config.connect_retries, || {
                neo4rs::Graph::new(args.store_url.as_str(), user.as_str(), password.as_str())
            })
            .await?;

            let store = BoltStore::new(graph);
            store
                .ensure_constraints()
                .await
                .context("Failed to create uniqueness constraints")?;
            Ok(StoreBackend::Bolt(store))
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

async fn run_load(args: LoadArgs, config: Config) -> Result<LoadSummary> {
    let options = LoaderOptions {
        batch_size: args.batch_size.unwrap_or(config.batch_size),
        has_header: !args.no_header,
    };
    info!(
        "📋 Batch size {}, header row {}",
        options.batch_size,
        if options.has_header { "skipped" } else { "absent" }
    );

    let store = open_store(&args, &config).await?;
    info!("🗄️  Using {} store", store.name());

    let loader = Loader::new(store, options).context("Failed to set up loader")?;
    let summary = loader
        .load_file(&args.csv_file)
        .await
        .with_context(|| format!("Failed to load {}", args.csv_file.display()))?;

    if let StoreBackend::Memory(graph) = loader.store() {
        info!(
            "🧪 In-memory graph holds {} nodes and {} relationships",
            graph.node_count().await,
            graph.relationship_count().await
        );
    }
    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", run_id = %run_id);

    async move {
        info!("🚀 NPI graph loader starting...");
        match cli.command {
            Command::Load(args) => match run_load(args, config).await {
                Ok(summary) => {
                    info!(
                        "🎉 Done: {} rows, {} batches, {} operations",
                        summary.rows, summary.batches, summary.operations
                    );
                    Ok(())
                }
                Err(e) => {
                    error!("❌ Load failed: {:#}", e);
                    Err(e)
                }
            },
        }
    }
    .instrument(span)
    .await
}
