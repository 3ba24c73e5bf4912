//! Short-TTL cache of the research fields known to exist in the corpus.
//!
//! Enumerating the distinct field values with a corpus scan is too
//! expensive to run on every request, so the catalog keeps one cached
//! entry with a five-minute lifetime. A refresh probes one representative
//! row per candidate field; only if no candidate matches does it fall back
//! to a bounded scan that collects distinct values. Expired entries are
//! still served immediately while a background refresh replaces them, so
//! only the very first call ever waits on the store. Concurrent callers
//! racing a miss may refresh twice; the computation is idempotent and
//! read-only, so the duplicate work is harmless.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::models::PaperFilter;
use crate::scan::CorpusScanner;
use crate::storage::{PaperStore, StorageResult};

/// How long a catalog entry stays fresh
pub const CATALOG_TTL: Duration = Duration::from_secs(300);

/// Cap on the fallback distinct-value scan
pub const CATALOG_SCAN_LIMIT: usize = 1000;

/// Field values the corpus is expected to carry. Probed one by one on
/// refresh; only fields that actually have at least one paper are listed.
pub const CANDIDATE_FIELDS: &[&str] = &[
    "Computer Vision (CV)",
    "Natural Language Processing (NLP)",
    "Multimodal",
    "Machine Learning / Deep Learning (ML/DL)",
];

/// One cached enumeration result. Replaced wholesale on refresh, never
/// patched in place.
struct CatalogEntry {
    fields: Vec<String>,
    cached_at: Instant,
}

/// TTL cache over the store's field enumeration.
///
/// Cheap to clone; clones share the cached entry.
pub struct FieldCatalogCache<S> {
    store: Arc<S>,
    candidates: Vec<String>,
    ttl: Duration,
    entry: Arc<RwLock<Option<CatalogEntry>>>,
}

impl<S> Clone for FieldCatalogCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            candidates: self.candidates.clone(),
            ttl: self.ttl,
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<S> FieldCatalogCache<S>
where
    S: PaperStore + Send + Sync + 'static,
{
    /// Create a cache over `store` with the default candidates and TTL.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            candidates: CANDIDATE_FIELDS.iter().map(|s| s.to_string()).collect(),
            ttl: CATALOG_TTL,
            entry: Arc::new(RwLock::new(None)),
        }
    }

    /// Override the candidate field list.
    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Override the TTL. Used by tests.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// List the fields known to exist in the corpus.
    ///
    /// Serves the cached entry when present, kicking off a background
    /// refresh if it has expired. Only a true miss (first call after
    /// startup) refreshes synchronously.
    pub async fn list_fields(&self) -> StorageResult<Vec<String>> {
        let cached = {
            let guard = self.entry.read().unwrap_or_else(|e| e.into_inner());
            guard.as_ref().map(|entry| {
                (entry.fields.clone(), entry.cached_at.elapsed() > self.ttl)
            })
        };

        if let Some((fields, stale)) = cached {
            if stale {
                debug!("field catalog expired, refreshing in background");
                let cache = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = cache.refresh().await {
                        warn!(error = %e, "background field catalog refresh failed");
                    }
                });
            }
            return Ok(fields);
        }

        self.refresh().await
    }

    /// Recompute the field list and replace the cached entry.
    async fn refresh(&self) -> StorageResult<Vec<String>> {
        let mut fields = Vec::new();
        for candidate in &self.candidates {
            if self.store.probe_field_exists(candidate).await? {
                fields.push(candidate.clone());
            }
        }

        if fields.is_empty() {
            debug!("no candidate field matched, falling back to corpus scan");
            fields = self.scan_distinct_fields().await;
        }

        let mut guard = self.entry.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(CatalogEntry {
            fields: fields.clone(),
            cached_at: Instant::now(),
        });
        Ok(fields)
    }

    /// Bounded scan collecting distinct field values in sorted order.
    async fn scan_distinct_fields(&self) -> Vec<String> {
        let mut scanner = CorpusScanner::new(
            self.store.as_ref(),
            PaperFilter::default(),
            crate::scan::DEFAULT_PAGE_SIZE,
            CATALOG_SCAN_LIMIT,
        );

        let mut distinct = std::collections::BTreeSet::new();
        while let Some(paper) = scanner.next().await {
            if let Some(field) = paper.field {
                distinct.insert(field);
            }
        }
        distinct.into_iter().collect()
    }
}
