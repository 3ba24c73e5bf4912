//! Paper provider module.
//!
//! This module defines the interface for sourcing paper metadata and
//! includes implementations for different data sources. The `PaperProvider`
//! trait abstracts where papers come from (JSON exports, conference crawls,
//! APIs) so the ingestion pipeline never couples to a specific source.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Paper;

pub mod json;

/// Errors that can occur when fetching papers from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the data format
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for sourcing paper metadata.
///
/// Providers return papers without embeddings; embedding generation is the
/// ingestion pipeline's job. Providers handle their own pagination and
/// error recovery, but not deduplication.
#[async_trait]
pub trait PaperProvider: Send + Sync {
    /// Fetch all available papers from this provider.
    async fn fetch_papers(&self) -> ProviderResult<Vec<Paper>>;

    /// Get the total count of papers available from this provider.
    ///
    /// The default implementation fetches everything and counts; override
    /// when the source offers a cheaper way.
    async fn count_papers(&self) -> ProviderResult<usize> {
        self.fetch_papers().await.map(|papers| papers.len())
    }

    /// Get a human-readable name for this provider, for logging.
    fn name(&self) -> &str;
}
