//! JSON file paper provider.
//!
//! Reads paper metadata from a JSON file containing an array of records.
//! This is the format the conference crawlers export, so it is also the
//! primary ingestion input.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

use super::{PaperProvider, ProviderError, ProviderResult};
use crate::models::Paper;

/// One record of the crawler export format.
#[derive(Debug, Deserialize)]
struct PaperRecord {
    title: String,
    #[serde(default, alias = "abstract")]
    abstract_text: String,
    #[serde(default)]
    conference: Option<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    url: Option<String>,
}

impl From<PaperRecord> for Paper {
    fn from(record: PaperRecord) -> Self {
        Paper {
            id: None,
            title: record.title,
            abstract_text: record.abstract_text,
            conference: record.conference,
            field: record.field,
            year: record.year,
            url: record.url,
            embedding: None,
        }
    }
}

/// Provider that loads papers from a JSON file once and serves them from
/// memory.
pub struct JsonFilePaperProvider {
    papers: Vec<Paper>,
    source: String,
}

impl JsonFilePaperProvider {
    /// Load and parse the given file.
    pub async fn from_file(path: PathBuf) -> ProviderResult<Self> {
        let raw = tokio::fs::read_to_string(&path).await?;
        let records: Vec<PaperRecord> =
            serde_json::from_str(&raw).map_err(|e| ProviderError::Parse(e.to_string()))?;

        debug!(count = records.len(), path = %path.display(), "loaded paper records");
        Ok(Self {
            papers: records.into_iter().map(Paper::from).collect(),
            source: path.display().to_string(),
        })
    }

    /// Build a provider from already-parsed papers. Used by tests.
    pub fn from_papers(papers: Vec<Paper>) -> Self {
        Self {
            papers,
            source: "in-memory".to_string(),
        }
    }
}

#[async_trait]
impl PaperProvider for JsonFilePaperProvider {
    async fn fetch_papers(&self) -> ProviderResult<Vec<Paper>> {
        Ok(self.papers.clone())
    }

    async fn count_papers(&self) -> ProviderResult<usize> {
        Ok(self.papers.len())
    }

    fn name(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_parsing_with_abstract_alias() {
        let raw = r#"[
            {"title": "Paper A", "abstract": "Text A", "conference": "CVPR",
             "field": "Computer Vision (CV)", "year": 2024, "url": "https://example.org/a"},
            {"title": "Paper B"}
        ]"#;
        let records: Vec<PaperRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].abstract_text, "Text A");
        assert_eq!(records[1].abstract_text, "");
        assert!(records[1].conference.is_none());
    }

    #[tokio::test]
    async fn test_in_memory_provider() {
        let provider = JsonFilePaperProvider::from_papers(vec![Paper {
            id: None,
            title: "Only".to_string(),
            abstract_text: String::new(),
            conference: None,
            field: None,
            year: None,
            url: None,
            embedding: None,
        }]);

        assert_eq!(provider.count_papers().await.unwrap(), 1);
        assert_eq!(provider.fetch_papers().await.unwrap()[0].title, "Only");
        assert_eq!(provider.name(), "in-memory");
    }
}
