//! Storage abstraction for the search core.
//!
//! Two traits describe the collaborators the engine consumes:
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`IndexStore`] | keyword/vector retrieval and CRUD over [`SearchIndexRecord`]s |
//! | [`DocumentRegistry`] | document metadata and parsed version text |
//!
//! Both are implemented by [`InMemoryStore`](memory::InMemoryStore) (tests,
//! embedding in other programs) and [`SqliteStore`](sqlite::SqliteStore).
//! Implementations must be `Send + Sync`; the engine shares them behind an
//! `Arc` across concurrent requests.
//!
//! # Shared semantics
//!
//! - Keyword search matches a record when its content contains **any**
//!   token (case-insensitive), newest first. Records carry score `0.0`;
//!   the engine computes keyword scores itself.
//! - Case folding differs for non-ASCII text: [`InMemoryStore`](memory::InMemoryStore)
//!   lowercases full Unicode, while [`SqliteStore`](sqlite::SqliteStore) relies on
//!   SQLite `LIKE`, which folds ASCII letters only. `"ÉTÉ"` finds `"été"` in
//!   memory but not in SQLite.
//! - Vector search scores at most [`VECTOR_CANDIDATE_LIMIT`] candidates with
//!   [`vector_score`], sorts by descending score, then paginates. `total`
//!   is the filtered candidate count before the cap.
//! - Filters are described on [`RecordFilter`].

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, euclidean_distance};
use crate::models::{
    Document, DocumentVersion, IndexingStatus, RecordPage, SearchFilters, SearchIndexRecord,
};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Upper bound on records scored by a single vector search.
pub const VECTOR_CANDIDATE_LIMIT: usize = 1000;

/// Persistence for index records.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn search_by_keywords(
        &self,
        keywords: &[String],
        filters: &SearchFilters,
        page: u32,
        size: u32,
    ) -> Result<RecordPage>;

    /// Records come back with their similarity score attached.
    async fn search_by_vector(
        &self,
        vector: &[f32],
        filters: &SearchFilters,
        page: u32,
        size: u32,
    ) -> Result<RecordPage>;

    async fn create(&self, record: &SearchIndexRecord) -> Result<()>;

    /// Insert all records or none.
    async fn create_batch(&self, records: &[SearchIndexRecord]) -> Result<()>;

    /// Returns the number of records removed.
    async fn delete_by_document_id(&self, document_id: &str) -> Result<u64>;

    /// Returns the number of records removed. Stored versions are compared trimmed.
    async fn delete_by_document_id_and_version(
        &self,
        document_id: &str,
        version: &str,
    ) -> Result<u64>;

    async fn get_indexing_status(&self, document_id: &str) -> Result<IndexingStatus>;
}

/// Source of documents and their parsed text.
#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn get_version(&self, document_id: &str, version: &str)
        -> Result<Option<DocumentVersion>>;
}

/// Typed view of the recognised request filters.
///
/// | Key | Matches when |
/// |-----|--------------|
/// | `document_id` | equal |
/// | `version` | equal to the stored version with surrounding whitespace trimmed |
/// | `content_type` | equal |
/// | `section` | equal |
///
/// Null and empty values are ignored, numbers and booleans compare by their
/// JSON text, and unrecognised keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub document_id: Option<String>,
    pub version: Option<String>,
    pub content_type: Option<String>,
    pub section: Option<String>,
}

impl RecordFilter {
    pub fn from_filters(filters: &SearchFilters) -> Self {
        let get = |key: &str| filters.get(key).and_then(filter_text);
        Self {
            document_id: get("document_id"),
            version: get("version"),
            content_type: get("content_type"),
            section: get("section"),
        }
    }

    pub fn matches(&self, record: &SearchIndexRecord) -> bool {
        fn eq(expected: &Option<String>, actual: &str) -> bool {
            expected.as_deref().map_or(true, |e| e == actual)
        }
        eq(&self.document_id, &record.document_id)
            && eq(&self.version, record.version.trim())
            && eq(&self.content_type, &record.content_type)
            && eq(&self.section, &record.section)
    }
}

fn filter_text(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::Null => return None,
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Blended similarity: `0.7 * cosine + 0.3 * 1 / (1 + euclidean)`.
///
/// The native embedding is used when its length matches the query's,
/// otherwise the legacy vector. A record with no vector of the query's
/// length scores `0.0`.
pub fn vector_score(query: &[f32], record: &SearchIndexRecord) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let stored = match &record.native_embedding {
        Some(v) if v.len() == query.len() => v.clone(),
        _ => match record.legacy_vector_values() {
            Some(v) => v,
            None => return 0.0,
        },
    };
    match euclidean_distance(query, &stored) {
        Some(distance) => 0.7 * cosine_similarity(query, &stored) + 0.3 * (1.0 / (1.0 + distance)),
        None => 0.0,
    }
}

/// Whether `record` can take part in vector search.
pub fn has_vector(record: &SearchIndexRecord) -> bool {
    record
        .native_embedding
        .as_ref()
        .is_some_and(|v| !v.is_empty())
        || !record.legacy_vector.is_empty()
}

/// 1-based page slice of `items`.
pub fn paginate<T>(items: Vec<T>, page: u32, size: u32) -> Vec<T> {
    let start = (page.max(1) as usize - 1).saturating_mul(size as usize);
    items.into_iter().skip(start).take(size as usize).collect()
}
