//! Evidence and search types shared by the retrieval components.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// One retrieved document chunk with its source location.
///
/// Immutable once created; two items are the same evidence when their
/// [`EvidenceId`]s match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub text: String,
    pub filename: String,
    pub page_number: i64,
}

impl EvidenceItem {
    pub fn new(text: impl Into<String>, filename: impl Into<String>, page_number: i64) -> Self {
        Self {
            text: text.into(),
            filename: filename.into(),
            page_number,
        }
    }

    /// Content hash over `(filename, page_number, text)`.
    pub fn identity(&self) -> EvidenceId {
        let mut hasher = Sha256::new();
        hasher.update(self.filename.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.page_number.to_le_bytes());
        hasher.update([0u8]);
        hasher.update(self.text.as_bytes());

        let digest = hasher.finalize();
        EvidenceId(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

impl From<SearchHit> for EvidenceItem {
    fn from(hit: SearchHit) -> Self {
        Self {
            text: hit.text,
            filename: hit.filename,
            page_number: hit.page_number,
        }
    }
}

/// Deduplication key for an [`EvidenceItem`] (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvidenceId(String);

impl EvidenceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One similarity-search result as returned by a [`crate::VectorIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub filename: String,
    pub page_number: i64,
    /// Cosine similarity, higher is closer
    pub score: f32,
}

/// Hard metadata filter applied inside the index query.
///
/// An empty filename set matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub filenames: BTreeSet<String>,
}

impl SearchFilter {
    pub fn new<I, S>(filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filenames: filenames.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, filename: &str) -> bool {
        self.filenames.contains(filename)
    }

    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }
}

/// A chunk together with its vector, used to seed an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub text: String,
    pub filename: String,
    pub page_number: i64,
    pub vector: Vec<f32>,
}

/// Collection health report for a set of requested filenames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionReport {
    pub collection: String,
    pub total_chunks: u64,
    pub files: Vec<FileCoverage>,
}

impl CollectionReport {
    /// Requested filenames with no chunk in the collection.
    pub fn missing(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| f.chunks == 0)
            .map(|f| f.filename.as_str())
            .collect()
    }
}

/// Chunk count for one requested filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    pub filename: String,
    pub chunks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_stable_and_distinguishing() {
        let a = EvidenceItem::new("Reset by holding the button.", "router.pdf", 4);
        let b = EvidenceItem::new("Reset by holding the button.", "router.pdf", 4);
        let other_page = EvidenceItem::new("Reset by holding the button.", "router.pdf", 5);
        let other_file = EvidenceItem::new("Reset by holding the button.", "modem.pdf", 4);

        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), other_page.identity());
        assert_ne!(a.identity(), other_file.identity());
        assert_eq!(a.identity().as_str().len(), 64);
    }

    #[test]
    fn test_identity_field_boundaries() {
        // Shifting bytes between fields must not collide.
        let a = EvidenceItem::new("bc", "a", 1);
        let b = EvidenceItem::new("c", "ab", 1);
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        let filter = SearchFilter::default();
        assert!(filter.is_empty());
        assert!(!filter.matches("anything.pdf"));

        let filter = SearchFilter::new(["manual.pdf"]);
        assert!(filter.matches("manual.pdf"));
        assert!(!filter.matches("Manual.pdf"));
    }

    #[test]
    fn test_report_missing() {
        let report = CollectionReport {
            collection: "document_chunks".to_string(),
            total_chunks: 12,
            files: vec![
                FileCoverage {
                    filename: "a.pdf".to_string(),
                    chunks: 12,
                },
                FileCoverage {
                    filename: "b.pdf".to_string(),
                    chunks: 0,
                },
            ],
        };
        assert_eq!(report.missing(), vec!["b.pdf"]);
    }
}
