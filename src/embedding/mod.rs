//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for text embedding generation and
//! provides the hosted-API implementation. The abstraction allows the
//! system to swap embedding backends without changing ingestion or
//! retrieval logic.

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

/// Maximum number of characters submitted per embedding input. Longer
/// texts (typically abstracts) are truncated to this budget before the
/// request is built, so the provider never sees an over-long input.
pub const MAX_EMBED_CHARS: usize = 8000;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The provider answered with a rate-limit response. Handled inside
    /// the retry loop; callers only see it if they bypass the retries.
    #[error("rate limited by the embedding provider")]
    RateLimited,

    /// Rate-limit retries were exhausted without a successful response
    #[error("embedding retry budget exhausted after {attempts} attempts")]
    Exhausted {
        /// Number of requests that were rate limited
        attempts: usize,
    },

    /// The request never produced an HTTP response (connect failure,
    /// timeout, broken transport)
    #[error("embedding transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-success, non-rate-limit status
    #[error("embedding API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or status text
        message: String,
    },

    /// Invalid input text (e.g., empty)
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., missing API key)
    #[error("embedding configuration error: {0}")]
    Config(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementors of this trait can generate vector embeddings from text
/// inputs. The trait is async to support API-based embedding services.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Arguments
    /// * `text` - The input text to embed (should be pre-normalized)
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    ///
    /// More efficient than calling `embed` repeatedly for API-based
    /// providers that support batch requests. The output preserves input
    /// order: `result[i]` is the embedding of `texts[i]`.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if any embedding generation fails
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Get the dimension of embeddings produced by this provider.
    fn dimension(&self) -> usize;

    /// Get the model name/identifier for this provider.
    fn model_name(&self) -> &str;
}

/// Normalizes text for consistent embedding generation.
///
/// This function applies the following transformations:
/// - Converts to lowercase
/// - Trims leading/trailing whitespace
/// - Collapses multiple consecutive spaces to a single space
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate a text to the embedding character budget.
///
/// Cuts on a character boundary so multi-byte input never produces an
/// invalid slice.
pub fn truncate_for_embedding(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_CHARS) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
