//! Retrieval engine and selection policies.
//!
//! This module coordinates the embedding provider, the corpus scanner, and
//! the similarity scorer to produce ranked results. A retrieval call moves
//! through four stages: embed the query, scan and score candidates, select
//! under the policy, return. Only the embedding stage can fail the call;
//! everything that goes wrong with an individual candidate (missing
//! vector, malformed vector, wrong dimensionality) drops that candidate
//! with a log line and the scan continues.
//!
//! # Usage
//!
//! ```ignore
//! use paper_retrieval::retrieval::RetrievalEngine;
//! use paper_retrieval::models::PaperFilter;
//!
//! let engine = RetrievalEngine::new(embedding_provider, store);
//!
//! let filter = PaperFilter::for_field("Computer Vision (CV)");
//! let top = engine
//!     .retrieve_global_top_k("contrastive pretraining", &filter, 10, 0.7)
//!     .await?;
//!
//! let per_conf = engine
//!     .retrieve_per_conference_top_k("contrastive pretraining", &filter, 3)
//!     .await?;
//! ```

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::embedding::{normalize_text, EmbeddingError, EmbeddingProvider};
use crate::models::{Paper, PaperFilter, PolicyError, ScoredPaper, SelectionPolicy};
use crate::scan::{CorpusScanner, DEFAULT_PAGE_SIZE, DEFAULT_SCAN_CAP};
use crate::storage::PaperStore;
use crate::vector::{cosine_similarity, decode_embedding};

/// Errors that can fail a retrieval call.
///
/// Per-candidate problems never surface here; an empty result is how the
/// caller learns that nothing matched or nothing was scoreable.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Query embedding failed; nothing can be scored without it
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Selection policy violated its invariants
    #[error("invalid policy: {0}")]
    Policy(#[from] PolicyError),
}

/// Result type for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Brute-force retrieval engine over an embedding provider and a paper
/// store.
///
/// Scans the filtered corpus in bounded pages and scores each candidate
/// against a single query embedding. Suitable for corpora in the tens of
/// thousands; an approximate index is the upgrade path beyond that.
pub struct RetrievalEngine<E, S>
where
    E: EmbeddingProvider,
    S: PaperStore,
{
    embedding_provider: E,
    store: S,
    page_size: usize,
    max_scan: usize,
}

impl<E, S> RetrievalEngine<E, S>
where
    E: EmbeddingProvider,
    S: PaperStore,
{
    /// Create a new retrieval engine with default scan limits.
    pub fn new(embedding_provider: E, store: S) -> Self {
        Self {
            embedding_provider,
            store,
            page_size: DEFAULT_PAGE_SIZE,
            max_scan: DEFAULT_SCAN_CAP,
        }
    }

    /// Override the page size and scan cap.
    pub fn with_scan_limits(mut self, page_size: usize, max_scan: usize) -> Self {
        self.page_size = page_size;
        self.max_scan = max_scan;
        self
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Retrieve the `k` most similar papers above `threshold`.
    ///
    /// Embeds the query once, scores every scanned candidate, keeps those
    /// with `similarity >= threshold`, and returns them sorted by
    /// descending similarity, truncated to `k`. Equal scores keep their
    /// scan order, so results are deterministic for a stable corpus.
    ///
    /// An empty corpus, or a corpus where nothing decodes, yields an empty
    /// list, not an error.
    pub async fn retrieve_global_top_k(
        &self,
        query_text: &str,
        filter: &PaperFilter,
        k: usize,
        threshold: f32,
    ) -> RetrievalResult<Vec<ScoredPaper>> {
        SelectionPolicy::GlobalTopK { k, threshold }.validate()?;

        let query_embedding = self.embed_query(query_text).await?;

        let mut scanner =
            CorpusScanner::new(&self.store, filter.clone(), self.page_size, self.max_scan);
        let mut results: Vec<ScoredPaper> = Vec::new();
        while let Some(paper) = scanner.next().await {
            if let Some(similarity) = score_candidate(&query_embedding, &paper) {
                if similarity >= threshold {
                    results.push(ScoredPaper::new(paper, similarity));
                }
            }
        }

        debug!(
            scanned = scanner.yielded(),
            above_threshold = results.len(),
            "global retrieval scored corpus"
        );

        // Stable sort: ties keep scan order.
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);
        Ok(results)
    }

    /// Retrieve the `k_per_conference` most similar papers within each
    /// conference.
    ///
    /// Embeds the query once and partitions candidates by conference as
    /// they are scanned, keeping a bounded, sorted top list per group.
    /// There is no threshold; each group's list is sorted descending.
    /// Conferences with zero scoreable papers are absent from the map.
    pub async fn retrieve_per_conference_top_k(
        &self,
        query_text: &str,
        filter: &PaperFilter,
        k_per_conference: usize,
    ) -> RetrievalResult<BTreeMap<String, Vec<ScoredPaper>>> {
        SelectionPolicy::PerConferenceTopK { k_per_conference }.validate()?;

        let query_embedding = self.embed_query(query_text).await?;

        let mut scanner =
            CorpusScanner::new(&self.store, filter.clone(), self.page_size, self.max_scan);
        let mut groups: BTreeMap<String, Vec<ScoredPaper>> = BTreeMap::new();
        while let Some(paper) = scanner.next().await {
            if let Some(similarity) = score_candidate(&query_embedding, &paper) {
                let key = paper.conference_key().to_string();
                let group = groups.entry(key).or_default();
                insert_bounded(group, ScoredPaper::new(paper, similarity), k_per_conference);
            }
        }

        debug!(
            scanned = scanner.yielded(),
            conferences = groups.len(),
            "per-conference retrieval scored corpus"
        );

        Ok(groups)
    }

    async fn embed_query(&self, query_text: &str) -> RetrievalResult<Vec<f32>> {
        let normalized = normalize_text(query_text);
        let embedding = self.embedding_provider.embed(&normalized).await?;
        Ok(embedding)
    }
}

/// Decode and score one candidate. Returns `None` (after logging) on any
/// per-document failure so the scan loop stays a straight line.
fn score_candidate(query_embedding: &[f32], paper: &Paper) -> Option<f32> {
    let raw = match &paper.embedding {
        Some(raw) => raw,
        None => {
            debug!(paper_id = ?paper.id, "paper has no stored embedding, skipping");
            return None;
        }
    };

    let candidate = match decode_embedding(raw) {
        Ok(candidate) => candidate,
        Err(e) => {
            warn!(paper_id = ?paper.id, error = %e, "failed to decode stored embedding, skipping");
            return None;
        }
    };

    match cosine_similarity(query_embedding, &candidate) {
        Ok(similarity) => Some(similarity),
        Err(e) => {
            warn!(paper_id = ?paper.id, error = %e, "embedding dimension mismatch, skipping");
            None
        }
    }
}

/// Insert into a descending-sorted list bounded at `k`. A new entry goes
/// after any entry with an equal or higher score, which preserves scan
/// order among ties.
fn insert_bounded(group: &mut Vec<ScoredPaper>, candidate: ScoredPaper, k: usize) {
    let position = group
        .iter()
        .position(|entry| entry.similarity < candidate.similarity)
        .unwrap_or(group.len());
    if position < k {
        group.insert(position, candidate);
        group.truncate(k);
    }
}
