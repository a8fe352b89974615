//! In-memory [`IndexStore`] and [`DocumentRegistry`].
//!
//! Uses `HashMap` and `Vec` behind `parking_lot::RwLock`. Keyword search is
//! a case-insensitive substring scan with full Unicode lowercasing; vector
//! search is brute force.

use std::collections::HashMap;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::models::{
    Document, DocumentVersion, IndexingStatus, RecordPage, ScoredRecord, SearchFilters,
    SearchIndexRecord,
};

use super::{
    has_vector, paginate, vector_score, DocumentRegistry, IndexStore, RecordFilter,
    VECTOR_CANDIDATE_LIMIT,
};

/// In-memory store for tests and embedded use.
pub struct InMemoryStore {
    documents: RwLock<HashMap<String, Document>>,
    versions: RwLock<Vec<DocumentVersion>>,
    records: RwLock<Vec<SearchIndexRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            versions: RwLock::new(Vec::new()),
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn insert_document(&self, document: Document) {
        self.documents.write().insert(document.id.clone(), document);
    }

    /// Insert or replace the version keyed by `(document_id, version)`.
    pub fn insert_version(&self, version: DocumentVersion) {
        let mut versions = self.versions.write();
        versions.retain(|v| !(v.document_id == version.document_id && v.version == version.version));
        versions.push(version);
    }

    /// Snapshot of every stored record.
    pub fn records(&self) -> Vec<SearchIndexRecord> {
        self.records.read().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest first, matching `ORDER BY created_at DESC`.
fn newest_first(records: &mut [SearchIndexRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn search_by_keywords(
        &self,
        keywords: &[String],
        filters: &SearchFilters,
        page: u32,
        size: u32,
    ) -> Result<RecordPage> {
        let filter = RecordFilter::from_filters(filters);
        let needles: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

        let mut matched: Vec<SearchIndexRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| filter.matches(r))
            .filter(|r| {
                let content = r.content.to_lowercase();
                needles.iter().any(|n| content.contains(n.as_str()))
            })
            .cloned()
            .collect();
        newest_first(&mut matched);

        let total = matched.len() as u64;
        let records = paginate(matched, page, size)
            .into_iter()
            .map(|record| ScoredRecord { record, score: 0.0 })
            .collect();
        Ok(RecordPage { records, total })
    }

    async fn search_by_vector(
        &self,
        vector: &[f32],
        filters: &SearchFilters,
        page: u32,
        size: u32,
    ) -> Result<RecordPage> {
        let filter = RecordFilter::from_filters(filters);

        let mut candidates: Vec<SearchIndexRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| has_vector(r) && filter.matches(r))
            .cloned()
            .collect();
        let total = candidates.len() as u64;
        newest_first(&mut candidates);
        candidates.truncate(VECTOR_CANDIDATE_LIMIT);

        let mut scored: Vec<ScoredRecord> = candidates
            .into_iter()
            .map(|record| ScoredRecord {
                score: vector_score(vector, &record),
                record,
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(RecordPage {
            records: paginate(scored, page, size),
            total,
        })
    }

    async fn create(&self, record: &SearchIndexRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.iter().any(|r| r.id == record.id) {
            anyhow::bail!("duplicate index record id: {}", record.id);
        }
        records.push(record.clone());
        Ok(())
    }

    async fn create_batch(&self, batch: &[SearchIndexRecord]) -> Result<()> {
        let mut records = self.records.write();
        for (i, record) in batch.iter().enumerate() {
            if records.iter().any(|r| r.id == record.id)
                || batch[..i].iter().any(|r| r.id == record.id)
            {
                anyhow::bail!("duplicate index record id: {}", record.id);
            }
        }
        records.extend(batch.iter().cloned());
        Ok(())
    }

    async fn delete_by_document_id(&self, document_id: &str) -> Result<u64> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.document_id != document_id);
        Ok((before - records.len()) as u64)
    }

    async fn delete_by_document_id_and_version(
        &self,
        document_id: &str,
        version: &str,
    ) -> Result<u64> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| !(r.document_id == document_id && r.version.trim() == version));
        Ok((before - records.len()) as u64)
    }

    async fn get_indexing_status(&self, document_id: &str) -> Result<IndexingStatus> {
        let total = self
            .versions
            .read()
            .iter()
            .filter(|v| v.document_id == document_id)
            .count() as u64;
        let indexed = self
            .records
            .read()
            .iter()
            .filter(|r| r.document_id == document_id)
            .count() as u64;
        Ok(IndexingStatus::new(document_id, total, indexed))
    }
}

#[async_trait]
impl DocumentRegistry for InMemoryStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().get(id).cloned())
    }

    async fn get_version(
        &self,
        document_id: &str,
        version: &str,
    ) -> Result<Option<DocumentVersion>> {
        Ok(self
            .versions
            .read()
            .iter()
            .find(|v| v.document_id == document_id && v.version.trim() == version)
            .cloned())
    }
}
