//! Semantic retrieval and ranking engine for research papers.
//!
//! This library is the retrieval core of a research-assistant backend. It
//! embeds query text through a hosted embedding API, streams a paginated
//! corpus of papers whose vectors are stored as opaque JSON blobs, scores
//! candidates by cosine similarity, and selects ranked subsets under two
//! policies: global top-k with a similarity threshold, and top-k per
//! conference.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Paper, ScoredPaper, SelectionPolicy)
//! - **vector**: Stored-vector decoding and cosine similarity
//! - **embedding**: Text embedding generation via the hosted API
//! - **storage**: Corpus persistence and paged retrieval (SQLite-based)
//! - **scan**: Bounded, best-effort corpus scanning
//! - **retrieval**: Ranking engine and selection policies
//! - **catalog**: Short-TTL cache of the known research fields
//! - **ingestion**: Offline pipeline that embeds and stores papers
//!
//! # Workflow
//!
//! ## Offline Ingestion
//!
//! 1. Load paper metadata from input sources
//! 2. Normalize titles for deduplication
//! 3. Generate embeddings for title + abstract in batches
//! 4. Store papers and embeddings in the SQLite corpus
//!
//! ## Online Retrieval
//!
//! 1. Receive query text and a selection policy
//! 2. Normalize and embed the query (one embedding call per retrieval)
//! 3. Stream candidate papers from the corpus in bounded pages
//! 4. Decode each stored vector and compute cosine similarity; skip
//!    malformed candidates without aborting the scan
//! 5. Return ranked results (flat top-k, or top-k per conference)
//!
//! # Example
//!
//! ```ignore
//! use paper_retrieval::{
//!     embedding::openai::OpenAiEmbedding,
//!     storage::sqlite::SqliteStore,
//!     retrieval::RetrievalEngine,
//!     models::PaperFilter,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let embedding = OpenAiEmbedding::new(api_key, None);
//!     let store = SqliteStore::open("papers.db").await?;
//!     let engine = RetrievalEngine::new(embedding, store);
//!
//!     let filter = PaperFilter::for_field("Computer Vision (CV)");
//!     let results = engine
//!         .retrieve_global_top_k("diffusion models", &filter, 10, 0.7)
//!         .await?;
//!
//!     for result in results {
//!         println!("{}: {:.3}", result.paper.title, result.similarity);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod catalog;
pub mod embedding;
pub mod ingestion;
pub mod models;
pub mod provider;
pub mod retrieval;
pub mod scan;
pub mod storage;
pub mod vector;

// Re-export commonly used types at the crate root
pub use embedding::EmbeddingProvider;
pub use models::{EmbeddingConfig, Paper, PaperFilter, RelevanceLevel, ScoredPaper, SelectionPolicy};
pub use retrieval::RetrievalEngine;
pub use storage::PaperStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model name
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension for text-embedding-3-small
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
