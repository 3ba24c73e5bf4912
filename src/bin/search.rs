//! Search binary entry point.
//!
//! Command-line interface for semantic retrieval over a pre-built corpus.
//! Supports single-query and interactive REPL modes, global and
//! per-conference ranking, and table or JSON output.
//!
//! # Examples
//!
//! Global top-k with a similarity threshold:
//! ```bash
//! search --db-path papers.db --query "diffusion models" --top-k 10 --threshold 0.7
//! ```
//!
//! Top 3 per conference within one field:
//! ```bash
//! search --db-path papers.db --query "RLHF" --per-conference 3 --field "Natural Language Processing (NLP)"
//! ```
//!
//! Interactive mode:
//! ```bash
//! search --db-path papers.db --interactive
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use paper_retrieval::{
    catalog::FieldCatalogCache,
    embedding::{openai::OpenAiEmbedding, EmbeddingProvider},
    models::{PaperFilter, RelevanceLevel, ScoredPaper},
    retrieval::RetrievalEngine,
    storage::{sqlite::SqliteStore, PaperStore},
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for retrieval results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored relevance levels
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Search CLI for querying the paper corpus
#[derive(Parser, Debug)]
#[command(
    name = "search",
    version,
    about = "Semantic search over the paper corpus",
    long_about = "Query the paper corpus using embedding similarity. Supports global \
                  top-k ranking with a threshold, per-conference top-k ranking, and \
                  an interactive mode.

EXAMPLES:
  Global top-k:
    search --db-path papers.db --query \"diffusion models\"

  Per-conference ranking:
    search --db-path papers.db --query \"RLHF\" --per-conference 3

  Restrict to one field, JSON output:
    search --db-path papers.db --query \"3d scenes\" --field \"Computer Vision (CV)\" --format json

  List known fields:
    search --db-path papers.db --list-fields"
)]
struct Args {
    /// Corpus database file path
    #[arg(long, value_name = "PATH")]
    db_path: PathBuf,

    /// Search query (required unless --interactive or --list-fields)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Number of results to return (global mode)
    #[arg(long, value_name = "N", default_value = "10")]
    top_k: usize,

    /// Minimum similarity a result must reach (global mode)
    #[arg(long, value_name = "SCORE", default_value = "0.7")]
    threshold: f32,

    /// Rank top N per conference instead of globally
    #[arg(long, value_name = "N")]
    per_conference: Option<usize>,

    /// Restrict the scan to one research field
    #[arg(long, value_name = "FIELD")]
    field: Option<String>,

    /// Print the known research fields and exit
    #[arg(long)]
    list_fields: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Build the embedding client for the model the corpus was embedded with.
fn create_embedding_provider(model_name: &str, dimension: usize) -> Result<OpenAiEmbedding> {
    let api_key = std::env::var("OPENAI_API_KEY").with_context(|| {
        "OPENAI_API_KEY environment variable required for query embeddings.\n\
         Set it with: export OPENAI_API_KEY=your-api-key"
    })?;

    let provider = OpenAiEmbedding::new(api_key, Some(model_name.to_string()));
    if provider.dimension() != dimension {
        anyhow::bail!(
            "Dimension mismatch: corpus config says {}, but provider returns {}",
            dimension,
            provider.dimension()
        );
    }
    Ok(provider)
}

fn build_filter(field: Option<&str>) -> PaperFilter {
    match field {
        Some(field) => PaperFilter::for_field(field),
        None => PaperFilter::any_embedded(),
    }
}

/// Format a flat result list as a pretty table
fn format_results_table(results: &[ScoredPaper]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Conference").add_attribute(Attribute::Bold),
        Cell::new("Year").add_attribute(Attribute::Bold),
        Cell::new("Relevance").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for (idx, result) in results.iter().enumerate() {
        let title_display = if result.paper.title.chars().count() > 60 {
            let truncated: String = result.paper.title.chars().take(57).collect();
            format!("{truncated}...")
        } else {
            result.paper.title.clone()
        };

        let (relevance_str, color) = match result.relevance {
            RelevanceLevel::Identical => ("IDENTICAL", Color::Green),
            RelevanceLevel::HighlySimilar => ("HIGHLY_SIMILAR", Color::Cyan),
            RelevanceLevel::Similar => ("SIMILAR", Color::Yellow),
            RelevanceLevel::Relevant => ("RELEVANT", Color::White),
        };

        table.add_row(vec![
            Cell::new(format!("{}", idx + 1)),
            Cell::new(title_display),
            Cell::new(result.paper.conference_key()),
            Cell::new(
                result
                    .paper
                    .year
                    .map(|y| y.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(relevance_str).fg(color),
            Cell::new(format!("{:.4}", result.similarity)),
        ]);
    }

    table.to_string()
}

/// Format per-conference groups, one table per conference
fn format_groups_table(groups: &BTreeMap<String, Vec<ScoredPaper>>) -> String {
    if groups.is_empty() {
        return "No results found.".to_string();
    }

    let mut out = String::new();
    for (conference, results) in groups {
        out.push_str(&format!("\n{conference}\n"));
        out.push_str(&format_results_table(results));
        out.push('\n');
    }
    out
}

fn format_results_json(results: &[ScoredPaper]) -> Result<String> {
    serde_json::to_string_pretty(results).with_context(|| "Failed to serialize results to JSON")
}

fn format_groups_json(groups: &BTreeMap<String, Vec<ScoredPaper>>) -> Result<String> {
    serde_json::to_string_pretty(groups).with_context(|| "Failed to serialize results to JSON")
}

/// Display detailed view of a single result
fn display_result_detail(result: &ScoredPaper, rank: usize) {
    println!("\n{}", "═".repeat(80));
    println!("Rank: {rank}");
    println!("Title: {}", result.paper.title);
    println!("Conference: {}", result.paper.conference_key());
    if let Some(field) = &result.paper.field {
        println!("Field: {field}");
    }
    if let Some(year) = result.paper.year {
        println!("Year: {year}");
    }
    if let Some(url) = &result.paper.url {
        println!("URL: {url}");
    }
    println!("Relevance: {:?}", result.relevance);
    println!("Score: {:.4}", result.similarity);
    println!("\nAbstract:\n{}", result.paper.abstract_text);
    println!("{}", "═".repeat(80));
}

struct SessionSettings {
    top_k: usize,
    threshold: f32,
    per_conference: Option<usize>,
    field: Option<String>,
    format: OutputFormat,
}

/// Run one query under the current settings and print the results.
async fn run_query<S: PaperStore>(
    engine: &RetrievalEngine<OpenAiEmbedding, Arc<S>>,
    settings: &SessionSettings,
    query: &str,
    last_results: &mut Vec<ScoredPaper>,
) -> Result<()> {
    let filter = build_filter(settings.field.as_deref());
    let start = Instant::now();

    if let Some(k_per_conference) = settings.per_conference {
        let groups = engine
            .retrieve_per_conference_top_k(query, &filter, k_per_conference)
            .await
            .with_context(|| format!("Per-conference retrieval failed for query: '{query}'"))?;
        let elapsed = start.elapsed();

        *last_results = groups.values().flatten().cloned().collect();
        match settings.format {
            OutputFormat::Table => {
                println!("{}", format_groups_table(&groups));
                println!(
                    "Found {} results across {} conferences in {:.2}s",
                    groups.values().map(Vec::len).sum::<usize>(),
                    groups.len(),
                    elapsed.as_secs_f64()
                );
            }
            OutputFormat::Json => println!("{}", format_groups_json(&groups)?),
        }
    } else {
        let results = engine
            .retrieve_global_top_k(query, &filter, settings.top_k, settings.threshold)
            .await
            .with_context(|| format!("Retrieval failed for query: '{query}'"))?;
        let elapsed = start.elapsed();

        *last_results = results.clone();
        match settings.format {
            OutputFormat::Table => {
                println!("{}", format_results_table(&results));
                println!(
                    "\nFound {} results in {:.2}s",
                    results.len(),
                    elapsed.as_secs_f64()
                );
            }
            OutputFormat::Json => println!("{}", format_results_json(&results)?),
        }
    }

    Ok(())
}

fn print_repl_help() {
    println!("Commands:");
    println!("  <query>           - Search for papers");
    println!("  /top N            - Set number of results to N (global mode)");
    println!("  /threshold S      - Set minimum similarity (global mode)");
    println!("  /conf N           - Rank top N per conference");
    println!("  /conf off         - Back to global ranking");
    println!("  /field NAME       - Restrict to one research field");
    println!("  /field clear      - Clear the field filter");
    println!("  /fields           - List known research fields");
    println!("  /format table|json - Set output format");
    println!("  /detail N         - Show full details for result rank N");
    println!("  /help             - Show this help");
    println!("  Ctrl+D or Ctrl+C  - Exit");
}

/// Run interactive REPL mode
async fn run_interactive<S: PaperStore + Send + Sync + 'static>(
    engine: RetrievalEngine<OpenAiEmbedding, Arc<S>>,
    catalog: FieldCatalogCache<S>,
    mut settings: SessionSettings,
) -> Result<()> {
    println!("Interactive Paper Search");
    print_repl_help();
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;
    let mut last_results: Vec<ScoredPaper> = Vec::new();

    loop {
        match rl.readline("Search> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line).ok();

                if let Some(rest) = line.strip_prefix('/') {
                    let parts: Vec<&str> = rest.split_whitespace().collect();
                    match parts.first().copied() {
                        Some("help") => print_repl_help(),
                        Some("top") => match parts.get(1).and_then(|p| p.parse::<usize>().ok()) {
                            Some(n) if n > 0 => {
                                settings.top_k = n;
                                println!("Set top-k to {n}");
                            }
                            _ => eprintln!("Usage: /top N (positive integer)"),
                        },
                        Some("threshold") => {
                            match parts.get(1).and_then(|p| p.parse::<f32>().ok()) {
                                Some(s) if (0.0..=1.0).contains(&s) => {
                                    settings.threshold = s;
                                    println!("Set threshold to {s}");
                                }
                                _ => eprintln!("Usage: /threshold S with S in [0.0, 1.0]"),
                            }
                        }
                        Some("conf") => match parts.get(1).copied() {
                            Some("off") => {
                                settings.per_conference = None;
                                println!("Back to global ranking");
                            }
                            Some(n) => match n.parse::<usize>() {
                                Ok(n) if n > 0 => {
                                    settings.per_conference = Some(n);
                                    println!("Ranking top {n} per conference");
                                }
                                _ => eprintln!("Usage: /conf N  or  /conf off"),
                            },
                            None => eprintln!("Usage: /conf N  or  /conf off"),
                        },
                        Some("field") => match parts.get(1).copied() {
                            Some("clear") => {
                                settings.field = None;
                                println!("Cleared field filter");
                            }
                            Some(_) => {
                                let name = rest["field".len()..].trim().to_string();
                                println!("Set field filter: {name}");
                                settings.field = Some(name);
                            }
                            None => eprintln!("Usage: /field NAME  or  /field clear"),
                        },
                        Some("fields") => match catalog.list_fields().await {
                            Ok(fields) if fields.is_empty() => {
                                println!("No research fields found in the corpus.")
                            }
                            Ok(fields) => {
                                for field in fields {
                                    println!("  {field}");
                                }
                            }
                            Err(e) => eprintln!("Failed to list fields: {e}"),
                        },
                        Some("format") => match parts.get(1).copied() {
                            Some("table") => {
                                settings.format = OutputFormat::Table;
                                println!("Set output format to table");
                            }
                            Some("json") => {
                                settings.format = OutputFormat::Json;
                                println!("Set output format to JSON");
                            }
                            _ => eprintln!("Usage: /format [table|json]"),
                        },
                        Some("detail") => match parts.get(1).and_then(|p| p.parse::<usize>().ok())
                        {
                            Some(rank) if rank > 0 && rank <= last_results.len() => {
                                display_result_detail(&last_results[rank - 1], rank);
                            }
                            Some(rank) => eprintln!(
                                "Rank {} out of range (last search had {} results)",
                                rank,
                                last_results.len()
                            ),
                            None => eprintln!("Usage: /detail N"),
                        },
                        Some(other) => {
                            eprintln!("Unknown command: /{other}. Type /help for available commands.")
                        }
                        None => eprintln!("Type /help for available commands."),
                    }
                } else if let Err(e) = run_query(&engine, &settings, line, &mut last_results).await
                {
                    eprintln!("Search failed: {e:#}");
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    if !args.interactive && !args.list_fields && args.query.is_none() {
        anyhow::bail!(
            "One of --query, --interactive, or --list-fields must be specified.\n\
             Use --help for usage information."
        );
    }

    if !args.db_path.exists() {
        anyhow::bail!(
            "Corpus database not found: {}\n\
             Please run the ingestion binary first to build it.",
            args.db_path.display()
        );
    }

    info!("Loading corpus from: {}", args.db_path.display());
    let store = SqliteStore::open(&args.db_path.to_string_lossy())
        .with_context(|| "Failed to open corpus database")?;
    store
        .initialize()
        .await
        .with_context(|| "Failed to initialize storage")?;
    let store = Arc::new(store);

    let catalog = FieldCatalogCache::new(Arc::clone(&store));

    if args.list_fields {
        let fields = catalog
            .list_fields()
            .await
            .with_context(|| "Failed to enumerate research fields")?;
        if fields.is_empty() {
            println!("No research fields found in the corpus.");
        } else {
            for field in fields {
                println!("{field}");
            }
        }
        return Ok(());
    }

    let config = store
        .get_config()
        .await
        .with_context(|| "Failed to read embedding configuration from the corpus")?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Corpus has no embedding configuration.\n\
                 Please run the ingestion binary with --mode init-new first."
            )
        })?;

    info!(
        "Using embedding model: {} (dimension: {})",
        config.model_name, config.dimension
    );

    let paper_count = store
        .count_papers()
        .await
        .with_context(|| "Failed to count papers in the corpus")?;
    if paper_count == 0 {
        anyhow::bail!(
            "Corpus is empty (0 papers found).\n\
             Please run the ingestion binary to add papers first."
        );
    }
    info!("Corpus contains {} papers", paper_count);

    let embedding_provider = create_embedding_provider(&config.model_name, config.dimension)?;
    let engine = RetrievalEngine::new(embedding_provider, Arc::clone(&store));

    let settings = SessionSettings {
        top_k: args.top_k,
        threshold: args.threshold,
        per_conference: args.per_conference,
        field: args.field.clone(),
        format: args.format,
    };

    if args.interactive {
        run_interactive(engine, catalog, settings).await?;
    } else {
        let query = args.query.unwrap_or_default();
        let mut last_results = Vec::new();
        run_query(&engine, &settings, &query, &mut last_results).await?;
    }

    Ok(())
}
