//! Ingestion pipeline binary entry point.
//!
//! This binary runs the offline ingestion pipeline: it reads paper
//! metadata from a JSON export, generates embeddings through the hosted
//! API, and builds or extends the searchable corpus database.
//!
//! # Examples
//!
//! Initialize a new corpus:
//! ```bash
//! OPENAI_API_KEY=sk-... ingestion --mode init-new --input papers.json --db-path papers.db
//! ```
//!
//! Add papers to an existing corpus:
//! ```bash
//! OPENAI_API_KEY=sk-... ingestion --input new_papers.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use paper_retrieval::{
    embedding::{openai::OpenAiEmbedding, EmbeddingProvider},
    ingestion::IngestionPipeline,
    provider::{json::JsonFilePaperProvider, PaperProvider},
    storage::{sqlite::SqliteStore, PaperStore},
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Operation mode for the ingestion pipeline
#[derive(Debug, Clone, ValueEnum)]
enum Mode {
    /// Connect to an existing corpus and validate its embedding config (default)
    Connect,
    /// Initialize a new corpus with a fresh schema
    InitNew,
}

/// Ingestion pipeline CLI for building and updating the paper corpus
#[derive(Parser, Debug)]
#[command(
    name = "ingestion",
    version,
    about = "Build and update the paper retrieval corpus",
    long_about = "Ingestion pipeline for embedding research papers and building the \
                  searchable corpus database.

EXAMPLES:
  Initialize a new corpus:
    ingestion --mode init-new --input papers.json --db-path papers.db

  Add papers to an existing corpus:
    ingestion --input new_papers.json

  Custom batch size and logging:
    ingestion --input papers.json --batch-size 50 --log-level debug"
)]
struct IngestionArgs {
    /// Input JSON file containing paper metadata
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Corpus database file path
    #[arg(long, value_name = "PATH", default_value = "papers.db")]
    db_path: String,

    /// Operation mode: connect to an existing corpus or initialize a new one
    #[arg(long, value_enum, default_value = "connect")]
    mode: Mode,

    /// Embedding model name (defaults to text-embedding-3-small)
    #[arg(long, value_name = "MODEL")]
    embedding_model: Option<String>,

    /// Number of papers to process per embedding batch
    #[arg(long, value_name = "N", default_value = "100")]
    batch_size: usize,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Create the embedding client from the environment and CLI arguments
fn create_embedding_provider(args: &IngestionArgs) -> Result<OpenAiEmbedding> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .context("OPENAI_API_KEY environment variable must be set for ingestion")?;

    let provider = OpenAiEmbedding::new(api_key, args.embedding_model.clone());
    info!(
        "Embedding provider initialized: model={}, dimension={}",
        provider.model_name(),
        provider.dimension()
    );
    Ok(provider)
}

/// Create the storage instance, ensuring the parent directory exists
fn create_storage(db_path: &str) -> Result<SqliteStore> {
    debug!("Creating SQLite storage at: {}", db_path);

    if let Some(parent) = PathBuf::from(db_path).parent() {
        if !parent.exists() && !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {parent:?}"))?;
            info!("Created database directory: {:?}", parent);
        }
    }

    SqliteStore::open(db_path).with_context(|| format!("Failed to open database at {db_path}"))
}

/// Create a progress bar for tracking ingestion
fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} papers")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = IngestionArgs::parse();
    init_logging(&args.log_level);

    info!("Starting paper ingestion pipeline");
    debug!("CLI arguments: {:?}", args);

    let start_time = Instant::now();

    if !args.input.exists() {
        error!("Input file does not exist: {:?}", args.input);
        anyhow::bail!("Input file not found: {:?}", args.input);
    }
    info!("Input file: {:?}", args.input);

    let embedding_provider =
        create_embedding_provider(&args).context("Failed to create embedding provider")?;

    let store = create_storage(&args.db_path).context("Failed to create storage")?;
    store
        .initialize()
        .await
        .context("Failed to initialize storage schema")?;
    info!("Database path: {}", args.db_path);

    let mut pipeline = match args.mode {
        Mode::Connect => {
            info!("Connecting to existing corpus with config validation");
            IngestionPipeline::connect(embedding_provider, store, Some(args.batch_size))
                .await
                .context(
                    "Failed to connect to existing corpus. \
                     Use --mode init-new to create a new one.",
                )?
        }
        Mode::InitNew => {
            info!("Initializing new corpus");
            IngestionPipeline::initialize_new(embedding_provider, store, Some(args.batch_size))
                .await
                .context("Failed to initialize new corpus")?
        }
    };

    info!("Loading papers from {:?}...", args.input);
    let provider = JsonFilePaperProvider::from_file(args.input.clone())
        .await
        .with_context(|| format!("Failed to load papers from {:?}", args.input))?;

    let paper_count = provider.count_papers().await?;
    info!("Found {} papers from {}", paper_count, provider.name());

    if paper_count == 0 {
        warn!("No papers found in input file");
        return Ok(());
    }

    let progress = create_progress_bar(paper_count);

    info!("Processing papers with batch_size={}...", args.batch_size);
    let stats = pipeline
        .ingest_from_provider(&provider)
        .await
        .context("Failed to ingest papers")?;

    progress.finish_and_clear();

    let elapsed = start_time.elapsed();
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Ingestion Completed               ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Total processed:      {:>16} ║", stats.total_processed);
    println!("║ Inserted:             {:>16} ║", stats.inserted);
    println!("║ Duplicates skipped:   {:>16} ║", stats.duplicates_skipped);
    println!("║ Failed:               {:>16} ║", stats.failed);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");

    if stats.failed > 0 {
        warn!(
            "{} papers failed to process - check logs for details",
            stats.failed
        );
    }

    info!("Ingestion pipeline completed successfully");
    Ok(())
}
