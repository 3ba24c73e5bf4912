//! SQLite storage implementation.
//!
//! This module provides a SQLite-based implementation of the `PaperStore`
//! trait using rusqlite. The embedding column is TEXT holding whatever the
//! ingestion path wrote: a JSON array of floats, a JSON-encoded string
//! containing one, or NULL for papers that were never embedded. Rows are
//! handed out verbatim; interpretation is the vector codec's job.

use super::{PaperStore, StorageError, StorageResult};
use crate::embedding::normalize_text;
use crate::models::{EmbeddingConfig, Paper, PaperFilter};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::debug;

const CONFIG_KEY: &str = "embedding";

/// SQLite-backed paper store.
///
/// The connection is serialized behind an async mutex so the trait can
/// take `&self` and independent retrieval calls can share one store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(db_path: &str) -> StorageResult<Self> {
        let conn =
            Connection::open(db_path).map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a fresh in-memory database. Used by tests.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_paper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Paper> {
        let embedding_text: Option<String> = row.get(7)?;
        // Malformed TEXT is preserved as a JSON string so the codec can
        // report the parse failure instead of the store guessing.
        let embedding = embedding_text.map(|text| {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        });

        Ok(Paper {
            id: Some(row.get(0)?),
            title: row.get(1)?,
            abstract_text: row.get(2)?,
            conference: row.get(3)?,
            field: row.get(4)?,
            year: row.get(5)?,
            url: row.get(6)?,
            embedding,
        })
    }
}

#[async_trait]
impl PaperStore for SqliteStore {
    async fn initialize(&self) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS papers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                title_norm TEXT NOT NULL,
                abstract TEXT NOT NULL DEFAULT '',
                conference TEXT,
                field TEXT,
                year INTEGER,
                url TEXT,
                embedding TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_papers_title_norm ON papers(title_norm);
            CREATE INDEX IF NOT EXISTS idx_papers_field ON papers(field);",
        )
        .map_err(|e| StorageError::Query(e.to_string()))?;
        debug!("sqlite schema ready");
        Ok(())
    }

    async fn store_config(&self, config: &EmbeddingConfig) -> StorageResult<()> {
        let value = serde_json::to_string(config)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![CONFIG_KEY, value],
        )
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT value FROM config WHERE key = ?1")
            .map_err(|e| StorageError::Query(e.to_string()))?;
        let mut rows = stmt
            .query(rusqlite::params![CONFIG_KEY])
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match rows.next().map_err(|e| StorageError::Query(e.to_string()))? {
            Some(row) => {
                let value: String = row.get(0).map_err(|e| StorageError::Query(e.to_string()))?;
                let config = serde_json::from_str(&value)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    async fn insert_paper(&self, paper: &Paper) -> StorageResult<i64> {
        let embedding_text = match &paper.embedding {
            Some(value) => Some(
                serde_json::to_string(value)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO papers (title, title_norm, abstract, conference, field, year, url, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                paper.title,
                normalize_text(&paper.title),
                paper.abstract_text,
                paper.conference,
                paper.field,
                paper.year,
                paper.url,
                embedding_text,
            ],
        )
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    async fn exists_by_title(&self, normalized_title: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM papers WHERE title_norm = ?1)",
            rusqlite::params![normalized_title],
            |row| row.get::<_, bool>(0),
        )
        .map_err(|e| StorageError::Query(e.to_string()))
    }

    async fn fetch_page(
        &self,
        filter: &PaperFilter,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<Paper>> {
        let mut sql = String::from(
            "SELECT id, title, abstract, conference, field, year, url, embedding FROM papers",
        );
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();

        if let Some(field) = &filter.field {
            clauses.push("field = ?");
            params.push(SqlValue::Text(field.clone()));
        }
        if let Some(conference) = &filter.conference {
            clauses.push("conference = ?");
            params.push(SqlValue::Text(conference.clone()));
        }
        if filter.require_embedding {
            clauses.push("embedding IS NOT NULL");
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id LIMIT ? OFFSET ?");
        params.push(SqlValue::Integer(limit as i64));
        params.push(SqlValue::Integer(offset as i64));

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StorageError::Query(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), Self::row_to_paper)
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let mut papers = Vec::new();
        for row in rows {
            papers.push(row.map_err(|e| StorageError::Query(e.to_string()))?);
        }
        Ok(papers)
    }

    async fn probe_field_exists(&self, field: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM papers WHERE field = ?1)",
            rusqlite::params![field],
            |row| row.get::<_, bool>(0),
        )
        .map_err(|e| StorageError::Query(e.to_string()))
    }

    async fn count_papers(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT COUNT(*) FROM papers", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|count| count as usize)
        .map_err(|e| StorageError::Query(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_paper(title: &str, field: &str, embedding: Option<serde_json::Value>) -> Paper {
        Paper {
            id: None,
            title: title.to_string(),
            abstract_text: format!("Abstract of {title}"),
            conference: Some("CVPR".to_string()),
            field: Some(field.to_string()),
            year: Some(2024),
            url: None,
            embedding,
        }
    }

    async fn fresh_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = fresh_store().await;
        store.initialize().await.unwrap();
        assert_eq!(store.count_papers().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let store = fresh_store().await;
        assert!(store.get_config().await.unwrap().is_none());

        let config = EmbeddingConfig {
            model_name: "text-embedding-3-small".to_string(),
            dimension: 1536,
        };
        store.store_config(&config).await.unwrap();
        assert_eq!(store.get_config().await.unwrap(), Some(config.clone()));

        // Overwrite replaces, not duplicates.
        let updated = EmbeddingConfig {
            model_name: "text-embedding-3-large".to_string(),
            dimension: 3072,
        };
        store.store_config(&updated).await.unwrap();
        assert_eq!(store.get_config().await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_insert_and_fetch_page_windows() {
        let store = fresh_store().await;
        for i in 0..5 {
            store
                .insert_paper(&sample_paper(
                    &format!("Paper {i}"),
                    "Computer Vision (CV)",
                    Some(json!([0.1, 0.2])),
                ))
                .await
                .unwrap();
        }

        let filter = PaperFilter::default();
        let first = store.fetch_page(&filter, 0, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].title, "Paper 0");

        let second = store.fetch_page(&filter, 2, 2).await.unwrap();
        assert_eq!(second[0].title, "Paper 2");

        let tail = store.fetch_page(&filter, 4, 2).await.unwrap();
        assert_eq!(tail.len(), 1);

        let past_end = store.fetch_page(&filter, 10, 2).await.unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_page_filters() {
        let store = fresh_store().await;
        store
            .insert_paper(&sample_paper("CV paper", "Computer Vision (CV)", Some(json!([1.0]))))
            .await
            .unwrap();
        store
            .insert_paper(&sample_paper("NLP paper", "Natural Language Processing (NLP)", None))
            .await
            .unwrap();

        let cv_only = store
            .fetch_page(&PaperFilter::for_field("Computer Vision (CV)"), 0, 10)
            .await
            .unwrap();
        assert_eq!(cv_only.len(), 1);
        assert_eq!(cv_only[0].title, "CV paper");

        // require_embedding drops the un-embedded NLP paper.
        let embedded = store
            .fetch_page(&PaperFilter::any_embedded(), 0, 10)
            .await
            .unwrap();
        assert_eq!(embedded.len(), 1);

        let everything = store
            .fetch_page(&PaperFilter::default(), 0, 10)
            .await
            .unwrap();
        assert_eq!(everything.len(), 2);
    }

    #[tokio::test]
    async fn test_probe_field_exists() {
        let store = fresh_store().await;
        store
            .insert_paper(&sample_paper("A", "Multimodal", None))
            .await
            .unwrap();

        assert!(store.probe_field_exists("Multimodal").await.unwrap());
        assert!(!store.probe_field_exists("Robotics").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_by_title_uses_normalized_form() {
        let store = fresh_store().await;
        store
            .insert_paper(&sample_paper("  Attention   Is All You Need ", "NLP", None))
            .await
            .unwrap();

        assert!(store
            .exists_by_title(&normalize_text("Attention Is All You Need"))
            .await
            .unwrap());
        assert!(!store
            .exists_by_title(&normalize_text("A Different Title"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_malformed_embedding_text_survives_fetch() {
        let store = fresh_store().await;
        {
            let conn = store.conn.lock().await;
            conn.execute(
                "INSERT INTO papers (title, title_norm, abstract, embedding)
                 VALUES ('Broken', 'broken', '', 'not json at all')",
                [],
            )
            .unwrap();
        }

        let papers = store
            .fetch_page(&PaperFilter::any_embedded(), 0, 10)
            .await
            .unwrap();
        assert_eq!(papers.len(), 1);
        // The raw text comes back as a JSON string; decoding it is the
        // codec's problem, and it fails without touching the store.
        let raw = papers[0].embedding.as_ref().unwrap();
        assert!(crate::vector::decode_embedding(raw).is_err());
    }

    #[tokio::test]
    async fn test_embedding_stringified_form_roundtrip() {
        let store = fresh_store().await;
        // A JSON-encoded string containing an array, as the legacy write
        // path produced.
        store
            .insert_paper(&sample_paper(
                "Legacy",
                "Multimodal",
                Some(json!("[0.5, 0.5]")),
            ))
            .await
            .unwrap();

        let papers = store
            .fetch_page(&PaperFilter::any_embedded(), 0, 10)
            .await
            .unwrap();
        let raw = papers[0].embedding.as_ref().unwrap();
        assert_eq!(
            crate::vector::decode_embedding(raw).unwrap(),
            vec![0.5, 0.5]
        );
    }
}
