//! Offline ingestion pipeline.
//!
//! This module processes paper metadata in batches: it normalizes titles
//! for deduplication, generates embeddings for the combined title and
//! abstract text, and persists papers to storage. Individual papers that
//! fail (empty text, insert error, a rate-limited embedding chunk) are
//! counted and skipped; the pipeline itself keeps going.
//!
//! Two entry points mirror the two deployment situations:
//!
//! - [`IngestionPipeline::connect`] attaches to an existing corpus and
//!   validates that the provider matches the stored embedding
//!   configuration, so new papers are embedded the same way the old ones
//!   were.
//! - [`IngestionPipeline::initialize_new`] creates a fresh corpus and
//!   writes the provider's configuration into it.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::models::{EmbeddingConfig, Paper};
use crate::provider::{PaperProvider, ProviderError};
use crate::storage::PaperStore;

/// Default number of papers embedded per provider request
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Provider operation failed
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Stored embedding configuration does not match the provider
    #[error("embedding config mismatch: {0}")]
    ConfigMismatch(String),
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Statistics from an ingestion run.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestionStats {
    /// Total number of input papers processed
    pub total_processed: usize,

    /// Number of papers successfully inserted
    pub inserted: usize,

    /// Number of papers skipped as duplicates
    pub duplicates_skipped: usize,

    /// Number of papers that failed to embed or insert
    pub failed: usize,
}

/// Pipeline that embeds papers and writes them to a store.
pub struct IngestionPipeline<E, S>
where
    E: EmbeddingProvider,
    S: PaperStore,
{
    embedding_provider: E,
    store: S,
    batch_size: usize,
}

impl<E, S> IngestionPipeline<E, S>
where
    E: EmbeddingProvider,
    S: PaperStore,
{
    /// Attach to an existing corpus.
    ///
    /// Fails if the store has no embedding configuration, or if the
    /// configuration does not match the provider's model and dimension.
    pub async fn connect(
        embedding_provider: E,
        store: S,
        batch_size: Option<usize>,
    ) -> IngestionResult<Self> {
        let config = store
            .get_config()
            .await
            .map_err(|e| IngestionError::Storage(e.to_string()))?
            .ok_or_else(|| {
                IngestionError::ConfigMismatch(
                    "store has no embedding configuration; initialize it first".to_string(),
                )
            })?;

        if config.model_name != embedding_provider.model_name()
            || config.dimension != embedding_provider.dimension()
        {
            return Err(IngestionError::ConfigMismatch(format!(
                "store was embedded with {} ({}d), provider is {} ({}d)",
                config.model_name,
                config.dimension,
                embedding_provider.model_name(),
                embedding_provider.dimension(),
            )));
        }

        Ok(Self {
            embedding_provider,
            store,
            batch_size: batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
        })
    }

    /// Create a fresh corpus and record the provider's configuration.
    pub async fn initialize_new(
        embedding_provider: E,
        store: S,
        batch_size: Option<usize>,
    ) -> IngestionResult<Self> {
        store
            .initialize()
            .await
            .map_err(|e| IngestionError::Storage(e.to_string()))?;

        let config = EmbeddingConfig {
            model_name: embedding_provider.model_name().to_string(),
            dimension: embedding_provider.dimension(),
        };
        store
            .store_config(&config)
            .await
            .map_err(|e| IngestionError::Storage(e.to_string()))?;

        info!(
            model = %config.model_name,
            dimension = config.dimension,
            "initialized new corpus"
        );

        Ok(Self {
            embedding_provider,
            store,
            batch_size: batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
        })
    }

    /// Ingest a set of papers, embedding them in batches.
    ///
    /// Papers whose title duplicates one already stored (or one earlier in
    /// the same run) are skipped. An embedding failure fails the chunk it
    /// belongs to, not the run.
    pub async fn ingest_batch(&mut self, papers: &[Paper]) -> IngestionResult<IngestionStats> {
        let mut stats = IngestionStats::default();
        let mut seen_titles: HashSet<String> = HashSet::new();

        for chunk in papers.chunks(self.batch_size) {
            // Decide per paper what happens before spending an embedding
            // request on it.
            let mut to_embed: Vec<(&Paper, String)> = Vec::new();
            for paper in chunk {
                stats.total_processed += 1;

                let text = prepare_embedding_text(&paper.title, &paper.abstract_text);
                if text.trim().is_empty() {
                    warn!(title = %paper.title, "paper has no text to embed, skipping");
                    stats.failed += 1;
                    continue;
                }

                let normalized = normalize_text(&paper.title);
                if normalized.is_empty() {
                    warn!("paper has an empty title, skipping");
                    stats.failed += 1;
                    continue;
                }
                if seen_titles.contains(&normalized) {
                    stats.duplicates_skipped += 1;
                    continue;
                }
                let already_stored = self
                    .store
                    .exists_by_title(&normalized)
                    .await
                    .map_err(|e| IngestionError::Storage(e.to_string()))?;
                if already_stored {
                    debug!(title = %paper.title, "duplicate title, skipping");
                    stats.duplicates_skipped += 1;
                    continue;
                }

                seen_titles.insert(normalized);
                to_embed.push((paper, text));
            }

            if to_embed.is_empty() {
                continue;
            }

            let texts: Vec<&str> = to_embed.iter().map(|(_, text)| text.as_str()).collect();
            let embeddings = match self.embedding_provider.embed_batch(&texts).await {
                Ok(embeddings) => embeddings,
                Err(e) => {
                    warn!(error = %e, papers = to_embed.len(), "embedding chunk failed");
                    stats.failed += to_embed.len();
                    continue;
                }
            };

            for ((paper, _), embedding) in to_embed.iter().zip(embeddings) {
                let mut stored = (*paper).clone();
                stored.embedding = Some(embedding_to_value(&embedding));

                match self.store.insert_paper(&stored).await {
                    Ok(_) => stats.inserted += 1,
                    Err(e) => {
                        warn!(title = %paper.title, error = %e, "failed to insert paper");
                        stats.failed += 1;
                    }
                }
            }
        }

        info!(
            total = stats.total_processed,
            inserted = stats.inserted,
            duplicates = stats.duplicates_skipped,
            failed = stats.failed,
            "ingestion batch finished"
        );
        Ok(stats)
    }

    /// Ingest papers from a provider.
    pub async fn ingest_from_provider<P>(&mut self, provider: &P) -> IngestionResult<IngestionStats>
    where
        P: PaperProvider,
    {
        let papers = provider.fetch_papers().await?;
        self.ingest_batch(&papers).await
    }
}

/// Combine title and abstract into the text that gets embedded. Leading
/// the title keeps it weighted in the embedding.
pub fn prepare_embedding_text(title: &str, abstract_text: &str) -> String {
    let title = title.trim();
    let abstract_text = abstract_text.trim();
    if title.is_empty() && abstract_text.is_empty() {
        return String::new();
    }
    format!("Title: {title}\n\nAbstract: {abstract_text}")
}

fn embedding_to_value(embedding: &[f32]) -> serde_json::Value {
    serde_json::Value::Array(
        embedding
            .iter()
            .map(|v| {
                serde_json::Number::from_f64(f64::from(*v))
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingResult};
    use crate::models::PaperFilter;
    use crate::storage::{StorageError, StorageResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubEmbedding {
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbedding {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            if let Some(marker) = self.fail_on {
                if text.contains(marker) {
                    return Err(EmbeddingError::Exhausted { attempts: 4 });
                }
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "stub-model"
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        config: Mutex<Option<EmbeddingConfig>>,
        inserted: Mutex<Vec<Paper>>,
        preexisting_titles: Vec<String>,
    }

    #[async_trait]
    impl PaperStore for RecordingStore {
        async fn initialize(&self) -> StorageResult<()> {
            Ok(())
        }

        async fn store_config(&self, config: &EmbeddingConfig) -> StorageResult<()> {
            *self.config.lock().unwrap() = Some(config.clone());
            Ok(())
        }

        async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>> {
            Ok(self.config.lock().unwrap().clone())
        }

        async fn insert_paper(&self, paper: &Paper) -> StorageResult<i64> {
            let mut inserted = self.inserted.lock().unwrap();
            inserted.push(paper.clone());
            Ok(inserted.len() as i64)
        }

        async fn exists_by_title(&self, normalized_title: &str) -> StorageResult<bool> {
            Ok(self
                .preexisting_titles
                .iter()
                .any(|t| t == normalized_title))
        }

        async fn fetch_page(
            &self,
            _filter: &PaperFilter,
            _offset: usize,
            _limit: usize,
        ) -> StorageResult<Vec<Paper>> {
            Ok(vec![])
        }

        async fn probe_field_exists(&self, _field: &str) -> StorageResult<bool> {
            Ok(false)
        }

        async fn count_papers(&self) -> StorageResult<usize> {
            Err(StorageError::Query("not used".to_string()))
        }
    }

    fn input_paper(title: &str, abstract_text: &str) -> Paper {
        Paper {
            id: None,
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
            conference: Some("CVPR".to_string()),
            field: Some("Computer Vision (CV)".to_string()),
            year: Some(2024),
            url: None,
            embedding: None,
        }
    }

    #[tokio::test]
    async fn test_initialize_new_records_config() {
        let store = RecordingStore::default();
        let pipeline = IngestionPipeline::initialize_new(
            StubEmbedding { fail_on: None },
            store,
            None,
        )
        .await
        .unwrap();

        let config = pipeline.store.get_config().await.unwrap().unwrap();
        assert_eq!(config.model_name, "stub-model");
        assert_eq!(config.dimension, 2);
    }

    #[tokio::test]
    async fn test_connect_rejects_config_mismatch() {
        let store = RecordingStore::default();
        store
            .store_config(&EmbeddingConfig {
                model_name: "some-other-model".to_string(),
                dimension: 384,
            })
            .await
            .unwrap();

        let result =
            IngestionPipeline::connect(StubEmbedding { fail_on: None }, store, None).await;
        assert!(matches!(result, Err(IngestionError::ConfigMismatch(_))));
    }

    #[tokio::test]
    async fn test_connect_requires_existing_config() {
        let result = IngestionPipeline::connect(
            StubEmbedding { fail_on: None },
            RecordingStore::default(),
            None,
        )
        .await;
        assert!(matches!(result, Err(IngestionError::ConfigMismatch(_))));
    }

    #[tokio::test]
    async fn test_ingest_attaches_embeddings_and_counts() {
        let store = RecordingStore::default();
        let mut pipeline =
            IngestionPipeline::initialize_new(StubEmbedding { fail_on: None }, store, None)
                .await
                .unwrap();

        let papers = vec![
            input_paper("Paper A", "About vision"),
            input_paper("Paper B", "About language"),
        ];
        let stats = pipeline.ingest_batch(&papers).await.unwrap();

        assert_eq!(stats.total_processed, 2);
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.failed, 0);

        let inserted = pipeline.store.inserted.lock().unwrap();
        for paper in inserted.iter() {
            let raw = paper.embedding.as_ref().unwrap();
            assert_eq!(crate::vector::decode_embedding(raw).unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_ingest_skips_duplicates() {
        let store = RecordingStore {
            preexisting_titles: vec![normalize_text("Stored Before")],
            ..Default::default()
        };
        store
            .store_config(&EmbeddingConfig {
                model_name: "stub-model".to_string(),
                dimension: 2,
            })
            .await
            .unwrap();

        let mut pipeline =
            IngestionPipeline::connect(StubEmbedding { fail_on: None }, store, None)
                .await
                .unwrap();

        let papers = vec![
            input_paper("Stored Before", "Already in the corpus"),
            input_paper("New Paper", "Fresh"),
            // Same title again within the run, different spacing.
            input_paper("  New   Paper ", "Fresh duplicate"),
        ];
        let stats = pipeline.ingest_batch(&papers).await.unwrap();

        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.duplicates_skipped, 2);
    }

    #[tokio::test]
    async fn test_embedding_chunk_failure_does_not_abort_run() {
        let store = RecordingStore::default();
        let mut pipeline = IngestionPipeline::initialize_new(
            StubEmbedding {
                fail_on: Some("poison"),
            },
            store,
            Some(1),
        )
        .await
        .unwrap();

        let papers = vec![
            input_paper("Fine paper", "Good text"),
            input_paper("Bad paper", "Contains poison text"),
            input_paper("Another fine paper", "More good text"),
        ];
        let stats = pipeline.ingest_batch(&papers).await.unwrap();

        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_empty_paper_counts_as_failed() {
        let store = RecordingStore::default();
        let mut pipeline =
            IngestionPipeline::initialize_new(StubEmbedding { fail_on: None }, store, None)
                .await
                .unwrap();

        let stats = pipeline
            .ingest_batch(&[input_paper("", ""), input_paper("Real", "Text")])
            .await
            .unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.inserted, 1);
    }

    #[test]
    fn test_prepare_embedding_text() {
        assert_eq!(
            prepare_embedding_text("A Title", "An abstract."),
            "Title: A Title\n\nAbstract: An abstract."
        );
        assert_eq!(prepare_embedding_text("  ", ""), "");
    }
}
