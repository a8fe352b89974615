//! SQLite-backed [`IndexStore`] and [`DocumentRegistry`].
//!
//! Tables (see [`crate::migrate`]): `documents`, `document_versions`,
//! `search_indices`. Native embeddings are stored as little-endian `f32`
//! blobs; the legacy vector stays a JSON text column.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{
    Document, DocumentStatus, DocumentVersion, IndexingStatus, RecordPage, ScoredRecord,
    SearchFilters, SearchIndexRecord,
};

use super::{paginate, vector_score, DocumentRegistry, IndexStore, RecordFilter, VECTOR_CANDIDATE_LIMIT};

const RECORD_COLUMNS: &str = "id, document_id, version, content, content_type, section, \
     vector, embedding, metadata, start_position, end_position, created_at, updated_at";

/// SQLite implementation of both storage traits over one pool.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or update a document's metadata.
    pub async fn upsert_document(&self, document: &Document) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO documents (id, name, doc_type, library, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                doc_type = excluded.doc_type,
                library = excluded.library,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&document.id)
        .bind(&document.name)
        .bind(&document.doc_type)
        .bind(&document.library)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace the text and status of one version.
    pub async fn upsert_version(&self, version: &DocumentVersion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document_versions (document_id, version, content, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id, version) DO UPDATE SET
                content = excluded.content,
                status = excluded.status
            "#,
        )
        .bind(&version.document_id)
        .bind(&version.version)
        .bind(&version.content)
        .bind(version.status.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn escape_like(token: &str) -> String {
    token
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &RecordFilter) {
    if let Some(v) = &filter.document_id {
        qb.push(" AND document_id = ").push_bind(v.clone());
    }
    if let Some(v) = &filter.version {
        qb.push(" AND TRIM(version) = ").push_bind(v.clone());
    }
    if let Some(v) = &filter.content_type {
        qb.push(" AND content_type = ").push_bind(v.clone());
    }
    if let Some(v) = &filter.section {
        qb.push(" AND section = ").push_bind(v.clone());
    }
}

/// `LIKE` folds ASCII case only; non-ASCII tokens match case-sensitively.
fn push_keywords(qb: &mut QueryBuilder<'_, Sqlite>, keywords: &[String]) {
    qb.push(" AND (");
    if keywords.is_empty() {
        qb.push("1 = 0");
    }
    for (i, keyword) in keywords.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push("content LIKE ")
            .push_bind(format!("%{}%", escape_like(keyword)))
            .push(" ESCAPE '\\'");
    }
    qb.push(")");
}

const HAS_VECTOR: &str = " AND (embedding IS NOT NULL OR vector != '')";

fn row_to_record(row: &SqliteRow) -> Result<SearchIndexRecord> {
    let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
    let start: i64 = row.try_get("start_position")?;
    let end: i64 = row.try_get("end_position")?;
    Ok(SearchIndexRecord {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        version: row.try_get("version")?,
        content: row.try_get("content")?,
        content_type: row.try_get("content_type")?,
        section: row.try_get("section")?,
        legacy_vector: row.try_get("vector")?,
        native_embedding: embedding
            .filter(|b| !b.is_empty())
            .map(|b| blob_to_vec(&b)),
        metadata: row.try_get("metadata")?,
        start_position: start.max(0) as usize,
        end_position: end.max(0) as usize,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn search_by_keywords(
        &self,
        keywords: &[String],
        filters: &SearchFilters,
        page: u32,
        size: u32,
    ) -> Result<RecordPage> {
        let filter = RecordFilter::from_filters(filters);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM search_indices WHERE 1 = 1");
        push_filters(&mut count, &filter);
        push_keywords(&mut count, keywords);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let offset = (page.max(1) as i64 - 1) * size as i64;
        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM search_indices WHERE 1 = 1",
            RECORD_COLUMNS
        ));
        push_filters(&mut select, &filter);
        push_keywords(&mut select, keywords);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(size as i64)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select.build().fetch_all(&self.pool).await?;
        let records = rows
            .iter()
            .map(|row| row_to_record(row).map(|record| ScoredRecord { record, score: 0.0 }))
            .collect::<Result<Vec<_>>>()?;

        Ok(RecordPage {
            records,
            total: total.max(0) as u64,
        })
    }

    async fn search_by_vector(
        &self,
        vector: &[f32],
        filters: &SearchFilters,
        page: u32,
        size: u32,
    ) -> Result<RecordPage> {
        let filter = RecordFilter::from_filters(filters);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM search_indices WHERE 1 = 1");
        count.push(HAS_VECTOR);
        push_filters(&mut count, &filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM search_indices WHERE 1 = 1",
            RECORD_COLUMNS
        ));
        select.push(HAS_VECTOR);
        push_filters(&mut select, &filter);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(VECTOR_CANDIDATE_LIMIT as i64);

        let rows = select.build().fetch_all(&self.pool).await?;
        let mut scored = rows
            .iter()
            .map(|row| {
                row_to_record(row).map(|record| ScoredRecord {
                    score: vector_score(vector, &record),
                    record,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(RecordPage {
            records: paginate(scored, page, size),
            total: total.max(0) as u64,
        })
    }

    async fn create(&self, record: &SearchIndexRecord) -> Result<()> {
        self.create_batch(std::slice::from_ref(record)).await
    }

    async fn create_batch(&self, records: &[SearchIndexRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO search_indices (id, document_id, version, content, content_type,
                                            section, vector, embedding, metadata,
                                            start_position, end_position, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.document_id)
            .bind(&record.version)
            .bind(&record.content)
            .bind(&record.content_type)
            .bind(&record.section)
            .bind(&record.legacy_vector)
            .bind(record.native_embedding.as_deref().map(vec_to_blob))
            .bind(&record.metadata)
            .bind(record.start_position as i64)
            .bind(record.end_position as i64)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_document_id(&self, document_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_indices WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_document_id_and_version(
        &self,
        document_id: &str,
        version: &str,
    ) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM search_indices WHERE document_id = ? AND TRIM(version) = ?")
                .bind(document_id)
                .bind(version)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn get_indexing_status(&self, document_id: &str) -> Result<IndexingStatus> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_versions WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?;
        let indexed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM search_indices WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(IndexingStatus::new(
            document_id,
            total.max(0) as u64,
            indexed.max(0) as u64,
        ))
    }
}

#[async_trait]
impl DocumentRegistry for SqliteStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT id, name, doc_type, library FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> Result<Document> {
            Ok(Document {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                doc_type: row.try_get("doc_type")?,
                library: row.try_get("library")?,
            })
        })
        .transpose()
    }

    async fn get_version(
        &self,
        document_id: &str,
        version: &str,
    ) -> Result<Option<DocumentVersion>> {
        let row = sqlx::query(
            "SELECT document_id, version, content, status FROM document_versions \
             WHERE document_id = ? AND TRIM(version) = ?",
        )
        .bind(document_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| -> Result<DocumentVersion> {
            let status: String = row.try_get("status")?;
            Ok(DocumentVersion {
                document_id: row.try_get("document_id")?,
                version: row.try_get("version")?,
                content: row.try_get("content")?,
                status: DocumentStatus::from_name(&status),
            })
        })
        .transpose()
    }
}
