//! Integration tests for the SQLite store and the engine wired over it.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use docsearch::config::Config;
use docsearch::db;
use docsearch::embedding::EmbeddingProvider;
use docsearch::migrate;
use docsearch::models::{
    Document, DocumentStatus, DocumentVersion, SearchFilters, SearchIndexRecord, SearchRequest,
    SearchType,
};
use docsearch::store::{DocumentRegistry, IndexStore, SqliteStore};
use docsearch::SearchEngine;
use serde_json::json;
use tempfile::TempDir;

struct UnitProvider;

#[async_trait]
impl EmbeddingProvider for UnitProvider {
    fn model_name(&self) -> &str {
        "unit"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }
}

async fn setup() -> (TempDir, Config, Arc<SqliteStore>) {
    let tmp = TempDir::new().unwrap();
    let config = Config::with_db_path(tmp.path().join("data").join("search.db"));
    let pool = db::connect(&config).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    // Idempotent.
    migrate::apply_schema(&pool).await.unwrap();
    (tmp, config, Arc::new(SqliteStore::new(pool)))
}

async fn register(store: &SqliteStore, id: &str, version: &str, content: &str) {
    store
        .upsert_document(&Document {
            id: id.to_string(),
            name: format!("{} reference", id),
            doc_type: "markdown".to_string(),
            library: "serde".to_string(),
        })
        .await
        .unwrap();
    store
        .upsert_version(&DocumentVersion {
            document_id: id.to_string(),
            version: version.to_string(),
            content: content.to_string(),
            status: DocumentStatus::Completed,
        })
        .await
        .unwrap();
}

fn record(id: &str, content: &str, created_at: i64) -> SearchIndexRecord {
    SearchIndexRecord {
        id: id.to_string(),
        document_id: "d1".to_string(),
        version: " 1.0 ".to_string(),
        content: content.to_string(),
        content_type: "text".to_string(),
        section: "Guide".to_string(),
        legacy_vector: "[0.0,1.0]".to_string(),
        native_embedding: None,
        metadata: "{}".to_string(),
        start_position: 0,
        end_position: content.chars().count(),
        created_at,
        updated_at: created_at,
    }
}

#[tokio::test]
async fn test_registry_round_trip() {
    let (_tmp, _config, store) = setup().await;
    register(&store, "d1", "1.0", "body").await;

    let doc = store.get_document("d1").await.unwrap().unwrap();
    assert_eq!(doc.library, "serde");
    let version = store.get_version("d1", "1.0").await.unwrap().unwrap();
    assert_eq!(version.status, DocumentStatus::Completed);
    assert!(store.get_version("d1", "2.0").await.unwrap().is_none());
    assert!(store.get_document("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_keyword_search_matches_any_token_newest_first() {
    let (_tmp, _config, store) = setup().await;
    store
        .create_batch(&[
            record("old", "derive Serialize", 1),
            record("new", "serde_json values", 2),
            record("none", "unrelated text", 3),
        ])
        .await
        .unwrap();

    let keywords = vec!["SERIALIZE".to_string(), "serde_json".to_string()];
    let page = store
        .search_by_keywords(&keywords, &SearchFilters::new(), 1, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    let ids: Vec<_> = page.records.iter().map(|r| r.record.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);

    let page = store
        .search_by_keywords(&[], &SearchFilters::new(), 1, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_keyword_case_folding_is_ascii_only() {
    let (_tmp, _config, store) = setup().await;
    store
        .create(&record("fr", "un été chaud", 1))
        .await
        .unwrap();

    let folded = store
        .search_by_keywords(&["ÉTÉ".to_string()], &SearchFilters::new(), 1, 10)
        .await
        .unwrap();
    assert_eq!(folded.total, 0);

    let ascii = store
        .search_by_keywords(&["CHAUD".to_string()], &SearchFilters::new(), 1, 10)
        .await
        .unwrap();
    assert_eq!(ascii.total, 1);
}

#[tokio::test]
async fn test_like_wildcards_are_literal() {
    let (_tmp, _config, store) = setup().await;
    store
        .create_batch(&[record("pct", "50% off", 1), record("plain", "fifty off", 2)])
        .await
        .unwrap();

    let page = store
        .search_by_keywords(&["%".to_string()], &SearchFilters::new(), 1, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].record.id, "pct");
}

#[tokio::test]
async fn test_version_filter_and_delete_compare_trimmed() {
    let (_tmp, _config, store) = setup().await;
    store.create(&record("r1", "serde guide", 1)).await.unwrap();

    let mut filters = SearchFilters::new();
    filters.insert("version".to_string(), json!("1.0"));
    let page = store.search_by_vector(&[0.0, 1.0], &filters, 1, 10).await.unwrap();
    assert_eq!(page.total, 1);
    // Identical vectors: 0.7 * 1 + 0.3 * 1
    assert!((page.records[0].score - 1.0).abs() < 1e-5);

    assert_eq!(
        store.delete_by_document_id_and_version("d1", "1.0").await.unwrap(),
        1
    );
    assert_eq!(store.delete_by_document_id("d1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_create_batch_is_atomic() {
    let (_tmp, _config, store) = setup().await;
    store.create(&record("dup", "first", 1)).await.unwrap();

    let result = store
        .create_batch(&[record("fresh", "second", 2), record("dup", "third", 3)])
        .await;
    assert!(result.is_err());

    let page = store
        .search_by_keywords(&["second".to_string()], &SearchFilters::new(), 1, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_engine_over_sqlite() {
    let (_tmp, config, store) = setup().await;
    let content = "Use #[derive(Serialize)] on the struct.";
    register(&store, "d1", " 1.0 ", content).await;
    register(&store, "d1", "2.0", "Newer text about Deserialize.").await;

    let engine = SearchEngine::from_parts(store.clone(), Arc::new(UnitProvider), &config);
    let built = engine.build_index("d1", "1.0").await.unwrap();
    assert_eq!(built.native_embedding, Some(vec![1.0, 0.0]));

    let response = engine
        .search(&SearchRequest::new("derive").with_type(SearchType::Hybrid))
        .await
        .unwrap();
    assert_eq!(response.total, 1);
    let item = &response.items[0];
    assert_eq!(item.library, "serde");
    assert_eq!(item.snippet, content);
    assert_eq!(item.metadata["end_position"], json!(content.chars().count()));
    // 0.6 * 1.0 + 0.4 * 1.0
    assert!((item.score - 1.0).abs() < 1e-5);

    let status = engine.get_indexing_status("d1").await.unwrap();
    assert_eq!(status.total, 2);
    assert_eq!(status.indexed, 1);
    assert!((status.progress - 50.0).abs() < 1e-9);

    assert_eq!(engine.delete_index("d1").await.unwrap(), 1);
}
