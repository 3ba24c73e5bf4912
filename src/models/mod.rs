//! Core data models for the paper retrieval engine.
//!
//! This module contains the fundamental data structures used across the
//! application: paper metadata, scored results, corpus filters, and the
//! selection policies that drive ranking.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core metadata for a research paper.
///
/// This struct represents one row of the corpus as the store hands it out.
/// The `embedding` field carries the stored vector column verbatim: a JSON
/// numeric array, a JSON-encoded string containing one, or nothing at all.
/// Only [`crate::vector::decode_embedding`] interprets it; a paper whose
/// embedding is absent or malformed is simply never scored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    /// Unique identifier (database primary key)
    pub id: Option<i64>,

    /// Paper title
    pub title: String,

    /// Abstract text
    #[serde(default)]
    pub abstract_text: String,

    /// Publishing venue, e.g. "CVPR" (group key for per-conference ranking)
    #[serde(default)]
    pub conference: Option<String>,

    /// Research field, e.g. "Computer Vision (CV)" (category key)
    #[serde(default)]
    pub field: Option<String>,

    /// Year of publication
    #[serde(default)]
    pub year: Option<i32>,

    /// Link to the paper page
    #[serde(default)]
    pub url: Option<String>,

    /// Stored vector column, uninterpreted. `None` means the paper was
    /// never embedded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<serde_json::Value>,
}

impl Paper {
    /// Group key used by per-conference selection. Papers without a
    /// conference value share the `"Unknown"` group.
    pub fn conference_key(&self) -> &str {
        self.conference.as_deref().unwrap_or("Unknown")
    }
}

/// Relevance classification for scored results.
///
/// Papers are categorized by their semantic similarity to the query,
/// allowing clients to understand the quality of matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelevanceLevel {
    /// Extremely high similarity (cosine similarity > 0.95)
    Identical,

    /// Very high similarity (cosine similarity > 0.85)
    HighlySimilar,

    /// Moderate similarity (cosine similarity > 0.70)
    Similar,

    /// Lower similarity but still relevant
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a cosine similarity score.
    pub fn from_score(score: f32) -> Self {
        if score > 0.95 {
            RelevanceLevel::Identical
        } else if score > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if score > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }
}

/// A paper together with its similarity to the query.
///
/// Derived per retrieval call and never cached; the similarity is always
/// recomputed against the current query embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPaper {
    /// The paper metadata
    pub paper: Paper,

    /// Cosine similarity score in [-1.0, 1.0] (higher is better)
    pub similarity: f32,

    /// Categorical relevance classification
    pub relevance: RelevanceLevel,
}

impl ScoredPaper {
    /// Create a new scored result from a paper and similarity score.
    pub fn new(paper: Paper, similarity: f32) -> Self {
        Self {
            paper,
            similarity,
            relevance: RelevanceLevel::from_score(similarity),
        }
    }
}

/// Corpus filter passed through to the store when fetching pages.
#[derive(Debug, Clone, Default)]
pub struct PaperFilter {
    /// Restrict to one research field
    pub field: Option<String>,

    /// Restrict to one conference
    pub conference: Option<String>,

    /// Only return rows whose embedding column is non-null. Retrieval sets
    /// this; catalog enumeration does not care.
    pub require_embedding: bool,
}

impl PaperFilter {
    /// Filter to a single research field, embedded rows only.
    pub fn for_field(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            conference: None,
            require_embedding: true,
        }
    }

    /// Match every embedded row.
    pub fn any_embedded() -> Self {
        Self {
            require_embedding: true,
            ..Self::default()
        }
    }
}

/// Errors raised when a selection policy violates its invariants.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// `k` must be at least 1
    #[error("k must be at least 1, got {0}")]
    ZeroK(usize),

    /// Threshold must lie in [0.0, 1.0]
    #[error("threshold must be within [0.0, 1.0], got {0}")]
    ThresholdOutOfRange(f32),
}

/// How the engine selects from the scored candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionPolicy {
    /// Keep the `k` highest-scoring papers overall, after dropping
    /// everything below `threshold`.
    GlobalTopK {
        /// Maximum number of results
        k: usize,
        /// Minimum similarity a result must reach
        threshold: f32,
    },

    /// Keep the `k_per_conference` highest-scoring papers within each
    /// conference, with no global threshold.
    PerConferenceTopK {
        /// Maximum number of results per conference
        k_per_conference: usize,
    },
}

impl SelectionPolicy {
    /// Check the policy invariants before a retrieval runs.
    pub fn validate(&self) -> Result<(), PolicyError> {
        match *self {
            SelectionPolicy::GlobalTopK { k, threshold } => {
                if k == 0 {
                    return Err(PolicyError::ZeroK(k));
                }
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(PolicyError::ThresholdOutOfRange(threshold));
                }
                Ok(())
            }
            SelectionPolicy::PerConferenceTopK { k_per_conference } => {
                if k_per_conference == 0 {
                    return Err(PolicyError::ZeroK(k_per_conference));
                }
                Ok(())
            }
        }
    }
}

/// Configuration for the embedding model.
///
/// This configuration is stored alongside the corpus to ensure consistency
/// between ingestion and query-time embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Name/identifier of the embedding model (e.g., "text-embedding-3-small")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_level_from_score() {
        assert_eq!(RelevanceLevel::from_score(0.96), RelevanceLevel::Identical);
        assert_eq!(RelevanceLevel::from_score(0.90), RelevanceLevel::HighlySimilar);
        assert_eq!(RelevanceLevel::from_score(0.75), RelevanceLevel::Similar);
        assert_eq!(RelevanceLevel::from_score(0.60), RelevanceLevel::Relevant);
    }

    #[test]
    fn test_conference_key_defaults_to_unknown() {
        let mut paper = Paper {
            id: None,
            title: "Untitled".to_string(),
            abstract_text: String::new(),
            conference: None,
            field: None,
            year: None,
            url: None,
            embedding: None,
        };
        assert_eq!(paper.conference_key(), "Unknown");

        paper.conference = Some("NeurIPS".to_string());
        assert_eq!(paper.conference_key(), "NeurIPS");
    }

    #[test]
    fn test_policy_validation() {
        assert!(SelectionPolicy::GlobalTopK { k: 5, threshold: 0.7 }
            .validate()
            .is_ok());
        assert!(SelectionPolicy::PerConferenceTopK { k_per_conference: 3 }
            .validate()
            .is_ok());

        assert!(matches!(
            SelectionPolicy::GlobalTopK { k: 0, threshold: 0.5 }.validate(),
            Err(PolicyError::ZeroK(0))
        ));
        assert!(matches!(
            SelectionPolicy::GlobalTopK { k: 5, threshold: 1.5 }.validate(),
            Err(PolicyError::ThresholdOutOfRange(_))
        ));
        assert!(matches!(
            SelectionPolicy::GlobalTopK { k: 5, threshold: -0.1 }.validate(),
            Err(PolicyError::ThresholdOutOfRange(_))
        ));
        assert!(matches!(
            SelectionPolicy::PerConferenceTopK { k_per_conference: 0 }.validate(),
            Err(PolicyError::ZeroK(0))
        ));
    }
}
