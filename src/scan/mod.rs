//! Bounded, best-effort corpus scanning.
//!
//! A scanner pulls matching papers out of the store one page at a time and
//! hands them to the caller in storage order. Two properties matter here:
//! the total number of yielded papers is hard-capped so a pathologically
//! large corpus cannot blow up latency or memory, and a page-fetch failure
//! ends the scan early instead of failing the whole retrieval. Ranking is
//! entirely downstream.

use std::collections::VecDeque;

use crate::models::{Paper, PaperFilter};
use crate::storage::PaperStore;
use tracing::{debug, warn};

/// Default number of rows fetched per page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default cap on the total number of papers one scan may yield
pub const DEFAULT_SCAN_CAP: usize = 500;

/// Position of an in-progress scan. Owned by a single scanner and
/// discarded with it.
#[derive(Debug, Clone, Copy)]
struct ScanCursor {
    offset: usize,
    page_size: usize,
    yielded: usize,
}

/// A finite, non-restartable pass over the filtered corpus.
///
/// Call [`CorpusScanner::next`] until it returns `None`. The sequence ends
/// when the store runs out of matching rows, when the cap is reached, or
/// when a page fetch fails (logged, not propagated).
pub struct CorpusScanner<'a, S: PaperStore> {
    store: &'a S,
    filter: PaperFilter,
    cursor: ScanCursor,
    max_total: usize,
    buffer: VecDeque<Paper>,
    exhausted: bool,
}

impl<'a, S: PaperStore> CorpusScanner<'a, S> {
    /// Start a scan over `store` with the given filter and limits.
    pub fn new(store: &'a S, filter: PaperFilter, page_size: usize, max_total: usize) -> Self {
        Self {
            store,
            filter,
            cursor: ScanCursor {
                offset: 0,
                page_size: page_size.max(1),
                yielded: 0,
            },
            max_total,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Start a scan with the default page size and cap.
    pub fn with_defaults(store: &'a S, filter: PaperFilter) -> Self {
        Self::new(store, filter, DEFAULT_PAGE_SIZE, DEFAULT_SCAN_CAP)
    }

    /// Number of papers yielded so far.
    pub fn yielded(&self) -> usize {
        self.cursor.yielded
    }

    /// Pull the next paper, fetching a new page from the store when the
    /// buffer runs dry.
    pub async fn next(&mut self) -> Option<Paper> {
        if self.cursor.yielded >= self.max_total {
            return None;
        }

        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_next_page().await;
        }

        let paper = self.buffer.pop_front()?;
        self.cursor.yielded += 1;
        Some(paper)
    }

    async fn fetch_next_page(&mut self) {
        let page = self
            .store
            .fetch_page(&self.filter, self.cursor.offset, self.cursor.page_size)
            .await;

        match page {
            Ok(papers) => {
                debug!(
                    offset = self.cursor.offset,
                    fetched = papers.len(),
                    "fetched corpus page"
                );
                if papers.len() < self.cursor.page_size {
                    self.exhausted = true;
                }
                self.cursor.offset += papers.len();
                self.buffer.extend(papers);
            }
            Err(e) => {
                // Best effort over a large corpus: keep what was already
                // scored, stop paging.
                warn!(
                    offset = self.cursor.offset,
                    error = %e,
                    "corpus page fetch failed, ending scan early"
                );
                self.exhausted = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmbeddingConfig;
    use crate::storage::{StorageError, StorageResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store serving `total` rows, optionally failing from a given page
    /// index onward.
    struct PagedStore {
        total: usize,
        fail_at_offset: Option<usize>,
        fetch_calls: AtomicUsize,
    }

    impl PagedStore {
        fn new(total: usize) -> Self {
            Self {
                total,
                fail_at_offset: None,
                fetch_calls: AtomicUsize::new(0),
            }
        }

        fn failing_from(total: usize, offset: usize) -> Self {
            Self {
                total,
                fail_at_offset: Some(offset),
                fetch_calls: AtomicUsize::new(0),
            }
        }

        fn paper(i: usize) -> Paper {
            Paper {
                id: Some(i as i64),
                title: format!("Paper {i}"),
                abstract_text: String::new(),
                conference: None,
                field: None,
                year: None,
                url: None,
                embedding: None,
            }
        }
    }

    #[async_trait]
    impl PaperStore for PagedStore {
        async fn initialize(&self) -> StorageResult<()> {
            Ok(())
        }

        async fn store_config(&self, _config: &EmbeddingConfig) -> StorageResult<()> {
            Ok(())
        }

        async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>> {
            Ok(None)
        }

        async fn insert_paper(&self, _paper: &Paper) -> StorageResult<i64> {
            Ok(0)
        }

        async fn exists_by_title(&self, _normalized_title: &str) -> StorageResult<bool> {
            Ok(false)
        }

        async fn fetch_page(
            &self,
            _filter: &PaperFilter,
            offset: usize,
            limit: usize,
        ) -> StorageResult<Vec<Paper>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(fail_at) = self.fail_at_offset {
                if offset >= fail_at {
                    return Err(StorageError::Query("simulated page failure".to_string()));
                }
            }
            let end = (offset + limit).min(self.total);
            Ok((offset..end).map(Self::paper).collect())
        }

        async fn probe_field_exists(&self, _field: &str) -> StorageResult<bool> {
            Ok(false)
        }

        async fn count_papers(&self) -> StorageResult<usize> {
            Ok(self.total)
        }
    }

    async fn drain<S: PaperStore>(mut scanner: CorpusScanner<'_, S>) -> Vec<Paper> {
        let mut out = Vec::new();
        while let Some(paper) = scanner.next().await {
            out.push(paper);
        }
        out
    }

    #[tokio::test]
    async fn test_scan_yields_everything_in_storage_order() {
        let store = PagedStore::new(25);
        let papers = drain(CorpusScanner::new(&store, PaperFilter::default(), 10, 500)).await;

        assert_eq!(papers.len(), 25);
        for (i, paper) in papers.iter().enumerate() {
            assert_eq!(paper.id, Some(i as i64));
        }
    }

    #[tokio::test]
    async fn test_scan_respects_cap() {
        let store = PagedStore::new(1000);
        let papers = drain(CorpusScanner::new(&store, PaperFilter::default(), 100, 250)).await;
        assert_eq!(papers.len(), 250);

        // The cap also bounds the number of pages requested.
        assert!(store.fetch_calls.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_scan_stops_early_on_page_failure() {
        // First two pages (20 rows) succeed, the third errors.
        let store = PagedStore::failing_from(100, 20);
        let papers = drain(CorpusScanner::new(&store, PaperFilter::default(), 10, 500)).await;
        assert_eq!(papers.len(), 20);
    }

    #[tokio::test]
    async fn test_scan_empty_corpus() {
        let store = PagedStore::new(0);
        let papers = drain(CorpusScanner::with_defaults(&store, PaperFilter::default())).await;
        assert!(papers.is_empty());
    }

    #[tokio::test]
    async fn test_scan_cap_of_zero_yields_nothing() {
        let store = PagedStore::new(10);
        let papers = drain(CorpusScanner::new(&store, PaperFilter::default(), 10, 0)).await;
        assert!(papers.is_empty());
        assert_eq!(store.fetch_calls.load(Ordering::SeqCst), 0);
    }
}
