//! OpenAI embedding provider implementation.
//!
//! This module implements the `EmbeddingProvider` trait against OpenAI's
//! text embedding endpoint. The endpoint accepts one or many inputs per
//! request and returns one vector per input in request order; it rate
//! limits with HTTP 429, which is the only failure the client retries.

use super::{truncate_for_embedding, EmbeddingError, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Default number of retries after rate-limit responses
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Number of inputs submitted per API request when batching
pub const API_BATCH_SIZE: usize = 100;

/// Maximum number of concurrent in-flight embedding requests
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Hard deadline for a single HTTP request, independent of the retry
/// schedule
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI embedding provider.
///
/// Cheap to clone; clones share the HTTP connection pool and the request
/// concurrency limiter.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedding {
    /// HTTP client (connection pool shared across clones)
    client: reqwest::Client,

    /// OpenAI API key for authentication
    api_key: String,

    /// API base URL, overridable for gateways and tests
    base_url: String,

    /// Model identifier (e.g., "text-embedding-3-small")
    model: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,

    /// Retry budget for rate-limit responses
    max_retries: usize,

    /// Limits concurrent in-flight requests across `embed_batch` chunks
    permits: Arc<Semaphore>,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (defaults to "text-embedding-3-small" if None)
    pub fn new(api_key: String, model: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "text-embedding-3-small".to_string());
        let embedding_dimension = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            _ => 1536, // default fallback
        };

        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            embedding_dimension,
            max_retries: DEFAULT_MAX_RETRIES,
            permits: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
        }
    }

    /// Point the client at a different API base URL (proxy, gateway, or a
    /// test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the rate-limit retry budget.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Issue one embeddings request, retrying only on rate-limit
    /// responses. Transport and API errors fail immediately.
    async fn request_embeddings(&self, inputs: Vec<String>) -> EmbeddingResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let mut rate_limited = 0usize;

        loop {
            let permit = match self.permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return Err(EmbeddingError::Transport(
                        "request limiter closed".to_string(),
                    ))
                }
            };

            let body = EmbeddingRequest {
                input: &inputs,
                model: &self.model,
            };
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .timeout(REQUEST_TIMEOUT)
                .json(&body)
                .send()
                .await;
            drop(permit);

            let response = match response {
                Ok(response) => response,
                Err(e) => return Err(EmbeddingError::Transport(e.to_string())),
            };

            let status = response.status();
            if status.is_success() {
                let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
                    EmbeddingError::Api {
                        status: status.as_u16(),
                        message: format!("malformed response body: {e}"),
                    }
                })?;
                if parsed.data.len() != inputs.len() {
                    return Err(EmbeddingError::Api {
                        status: status.as_u16(),
                        message: format!(
                            "expected {} embeddings, got {}",
                            inputs.len(),
                            parsed.data.len()
                        ),
                    });
                }
                let mut data = parsed.data;
                data.sort_by_key(|d| d.index);
                return Ok(data.into_iter().map(|d| d.embedding).collect());
            }

            if status.as_u16() == 429 {
                rate_limited += 1;
                if rate_limited > self.max_retries {
                    return Err(EmbeddingError::Exhausted {
                        attempts: rate_limited,
                    });
                }
                let delay = backoff_delay(rate_limited);
                warn!(
                    attempt = rate_limited,
                    delay_ms = delay.as_millis() as u64,
                    "embedding request rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }
    }
}

/// Exponential backoff schedule for rate-limit retries: 500ms, 1s, 2s, ...
/// The exponent is clamped so a large retry budget cannot overflow.
fn backoff_delay(attempt: usize) -> Duration {
    let exponent = attempt.saturating_sub(1).min(8) as u32;
    BACKOFF_BASE * (1 << exponent)
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "text cannot be empty".to_string(),
            ));
        }

        let input = truncate_for_embedding(text).to_string();
        let mut embeddings = self.request_embeddings(vec![input]).await?;
        embeddings.pop().ok_or(EmbeddingError::Api {
            status: 200,
            message: "response contained no embedding".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        for text in texts {
            if text.trim().is_empty() {
                return Err(EmbeddingError::InvalidInput(
                    "all texts must be non-empty".to_string(),
                ));
            }
        }

        let chunks: Vec<Vec<String>> = texts
            .chunks(API_BATCH_SIZE)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|text| truncate_for_embedding(text).to_string())
                    .collect()
            })
            .collect();

        debug!(
            inputs = texts.len(),
            requests = chunks.len(),
            "dispatching batch embedding"
        );

        if chunks.len() == 1 {
            let only = chunks.into_iter().next().unwrap_or_default();
            return self.request_embeddings(only).await;
        }

        // Chunks are independent requests; dispatch them concurrently and
        // reassemble in input order. The shared semaphore bounds how many
        // are actually in flight.
        let mut handles = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let client = self.clone();
            handles.push(tokio::spawn(
                async move { client.request_embeddings(chunk).await },
            ));
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for handle in handles {
            let chunk_result = handle
                .await
                .map_err(|e| EmbeddingError::Transport(format!("embedding task failed: {e}")))?;
            embeddings.extend(chunk_result?);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}
