//! Core data models used throughout docsearch.
//!
//! These types represent the documents, index records, and search
//! requests/responses that flow through the indexing and retrieval pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Filters forwarded verbatim to the index store.
///
/// A `BTreeMap` keeps iteration order stable, which the cache key relies on.
pub type SearchFilters = BTreeMap<String, serde_json::Value>;

/// Document metadata supplied by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub doc_type: String,
    pub library: String,
}

/// Processing state of a document version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    /// Parse a stored status string. Unknown values map to `Pending`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "processing" => DocumentStatus::Processing,
            "completed" => DocumentStatus::Completed,
            "failed" => DocumentStatus::Failed,
            _ => DocumentStatus::Pending,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One version of a document's parsed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub document_id: String,
    pub version: String,
    pub content: String,
    pub status: DocumentStatus,
}

/// One persisted, searchable unit of a document version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexRecord {
    pub id: String,
    pub document_id: String,
    pub version: String,
    pub content: String,
    pub content_type: String,
    /// Display label (the document name for whole-document records).
    pub section: String,
    /// JSON array of floats, kept as text for older readers.
    pub legacy_vector: String,
    /// Present only when embedding generation succeeded.
    pub native_embedding: Option<Vec<f32>>,
    /// JSON object serialized as text.
    pub metadata: String,
    /// Character offset into `content`.
    pub start_position: usize,
    /// Character offset into `content`; `start_position <= end_position <= len`.
    pub end_position: usize,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SearchIndexRecord {
    /// Decode the legacy vector column. Malformed JSON decodes to `None`.
    pub fn legacy_vector_values(&self) -> Option<Vec<f32>> {
        if self.legacy_vector.is_empty() {
            return None;
        }
        serde_json::from_str(&self.legacy_vector).ok()
    }
}

/// An index record paired with the score assigned by a retrieval strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: SearchIndexRecord,
    pub score: f32,
}

/// One page of records returned by the index store.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<ScoredRecord>,
    /// Unpaginated match count as reported by the store.
    pub total: u64,
}

/// Retrieval strategy requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SearchType {
    #[default]
    Keyword,
    Semantic,
    Hybrid,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Keyword => "keyword",
            SearchType::Semantic => "semantic",
            SearchType::Hybrid => "hybrid",
        }
    }

    /// Lenient parse: anything unrecognised falls back to keyword search.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "semantic" => SearchType::Semantic,
            "hybrid" => SearchType::Hybrid,
            _ => SearchType::Keyword,
        }
    }
}

impl From<String> for SearchType {
    fn from(name: String) -> Self {
        SearchType::from_name(&name)
    }
}

impl From<SearchType> for String {
    fn from(t: SearchType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public search contract: the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default, rename = "searchType")]
    pub search_type: SearchType,
}

fn default_page() -> u32 {
    1
}

fn default_size() -> u32 {
    10
}

impl SearchRequest {
    /// A first-page keyword request with no filters.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: SearchFilters::new(),
            page: default_page(),
            size: default_size(),
            search_type: SearchType::Keyword,
        }
    }

    pub fn with_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    pub fn with_page(mut self, page: u32, size: u32) -> Self {
        self.page = page;
        self.size = size;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.filters.insert(key.into(), value);
        self
    }
}

/// A single ranked hit in a [`SearchResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub document_id: String,
    pub version: String,
    pub library: String,
    pub content: String,
    pub snippet: String,
    /// Not normalized across search types.
    pub score: f32,
    pub content_type: String,
    pub section: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Public search contract: the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total: u64,
    pub items: Vec<SearchResult>,
    pub page: u32,
    pub size: u32,
}

/// Indexing progress for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingStatus {
    pub document_id: String,
    /// Number of registered versions.
    pub total: u64,
    /// Number of live index records.
    pub indexed: u64,
    /// `indexed / total` as a percentage; 0 when there are no versions.
    pub progress: f64,
    pub status: String,
}

impl IndexingStatus {
    pub fn new(document_id: &str, total: u64, indexed: u64) -> Self {
        let progress = if total > 0 {
            indexed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            document_id: document_id.to_string(),
            total,
            indexed,
            progress,
            status: "indexed".to_string(),
        }
    }
}
