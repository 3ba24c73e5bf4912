//! Storage layer abstraction and implementations.
//!
//! This module defines the interface for persisting papers and streaming
//! them back out in pages. The abstraction allows different storage
//! backends (SQLite here, a hosted Postgres elsewhere) while keeping a
//! consistent API for the scanner and the catalog.

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{EmbeddingConfig, Paper, PaperFilter};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error
    #[error("database connection failed: {0}")]
    Connection(String),

    /// Query execution error
    #[error("query execution failed: {0}")]
    Query(String),

    /// Data serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Duplicate entry (e.g., same normalized title already exists)
    #[error("duplicate entry: {0}")]
    Duplicate(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for paper storage backends.
///
/// All methods take `&self`: independent retrieval calls run concurrently
/// over one store, so implementations serialize access internally where
/// the backend requires it.
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Initialize the storage (create tables, indexes, etc.).
    ///
    /// This should be idempotent and safe to call multiple times.
    async fn initialize(&self) -> StorageResult<()>;

    /// Store the embedding configuration.
    ///
    /// Persisted so that query-time embedding generation uses the same
    /// model the corpus was embedded with.
    async fn store_config(&self, config: &EmbeddingConfig) -> StorageResult<()>;

    /// Retrieve the embedding configuration, or `None` if not set.
    async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>>;

    /// Insert a new paper into storage.
    ///
    /// # Returns
    /// The assigned paper ID
    async fn insert_paper(&self, paper: &Paper) -> StorageResult<i64>;

    /// Check if a paper with the given normalized title exists.
    ///
    /// Used for deduplication during ingestion.
    async fn exists_by_title(&self, normalized_title: &str) -> StorageResult<bool>;

    /// Fetch one page of papers matching the filter, in storage order.
    ///
    /// The page window is `[offset, offset + limit)`. A short page means
    /// the matching rows are exhausted. No relevance ordering happens at
    /// this layer.
    async fn fetch_page(
        &self,
        filter: &PaperFilter,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<Paper>>;

    /// Check whether at least one paper carries the given field value.
    ///
    /// A membership probe: one indexed lookup instead of a corpus scan.
    async fn probe_field_exists(&self, field: &str) -> StorageResult<bool>;

    /// Get the total count of papers in storage.
    async fn count_papers(&self) -> StorageResult<usize>;
}

// Shared handles are stores too, so an engine and a catalog can use the
// same backend.
#[async_trait]
impl<T: PaperStore + ?Sized> PaperStore for std::sync::Arc<T> {
    async fn initialize(&self) -> StorageResult<()> {
        (**self).initialize().await
    }

    async fn store_config(&self, config: &EmbeddingConfig) -> StorageResult<()> {
        (**self).store_config(config).await
    }

    async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>> {
        (**self).get_config().await
    }

    async fn insert_paper(&self, paper: &Paper) -> StorageResult<i64> {
        (**self).insert_paper(paper).await
    }

    async fn exists_by_title(&self, normalized_title: &str) -> StorageResult<bool> {
        (**self).exists_by_title(normalized_title).await
    }

    async fn fetch_page(
        &self,
        filter: &PaperFilter,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<Paper>> {
        (**self).fetch_page(filter, offset, limit).await
    }

    async fn probe_field_exists(&self, field: &str) -> StorageResult<bool> {
        (**self).probe_field_exists(field).await
    }

    async fn count_papers(&self) -> StorageResult<usize> {
        (**self).count_papers().await
    }
}
