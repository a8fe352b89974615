//! Hybrid search engine: retrieval, ranking, snippets, and response caching.
//!
//! # Retrieval
//!
//! | Type | Pipeline |
//! |------|----------|
//! | `keyword` | whitespace tokens → [`IndexStore::search_by_keywords`] → [`keyword_score`] |
//! | `semantic` | [`EmbeddingAdapter::query_vector`] → [`IndexStore::search_by_vector`] (store score used as-is) |
//! | `hybrid` | both of the above concurrently → [`merge_results`] |
//!
//! # Hybrid Scoring
//!
//! 1. Each keyword score is multiplied by `0.6`, each semantic score by `0.4`.
//! 2. A record present in both lists gets the sum of its two weighted scores.
//! 3. Results are sorted by descending score.
//! 4. `total` is the larger of the two store totals.
//!
//! Scores are not normalised across strategies. Any store failure aborts
//! the whole request; there are no partial results.
//!
//! # Caching
//!
//! Responses are cached under a [`CacheKey`] with a TTL chosen by
//! [`CachePolicy`] from the search type, the result count, and the
//! retrieval time. Cache failures are logged and never surfaced. Index
//! writes do not invalidate cached responses; call
//! [`SearchEngine::clear_cache`] after re-indexing if stale pages matter.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheKey, CachePolicy, ResponseCache};
use crate::circuit_breaker::{BreakerError, BreakerRegistry, BreakerState, CircuitBreaker};
use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, EmbeddingAdapter, EmbeddingProvider};
use crate::error::{CacheError, Result, SearchError};
use crate::models::{
    Document, DocumentStatus, DocumentVersion, IndexingStatus, ScoredRecord, SearchIndexRecord,
    SearchRequest, SearchResponse, SearchResult, SearchType,
};
use crate::snippet::extract_snippet;
use crate::store::{DocumentRegistry, IndexStore, SqliteStore};

pub const KEYWORD_WEIGHT: f32 = 0.6;
pub const SEMANTIC_WEIGHT: f32 = 0.4;

/// Breaker guarding the embedding provider.
pub const EMBEDDING_BREAKER: &str = "embedding";
/// Breaker guarding index store reads (retrieval and status).
pub const INDEX_STORE_BREAKER: &str = "index_store";
/// Breaker guarding index store writes, so rejected writes never block searches.
pub const INDEX_WRITE_BREAKER: &str = "index_store_write";

/// Engine tuning, decoupled from the on-disk config.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub snippet_max_length: usize,
    pub max_page_size: u32,
    pub cache_key: CacheKey,
    pub policy: CachePolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            snippet_max_length: 200,
            max_page_size: 100,
            cache_key: CacheKey::new(true),
            policy: CachePolicy::default(),
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            snippet_max_length: config.search.snippet_max_length,
            max_page_size: config.search.max_page_size,
            cache_key: CacheKey::new(config.cache.key_includes_filters),
            policy: CachePolicy::from_config(&config.cache),
        }
    }
}

/// Records plus the store-reported total for one retrieval strategy.
pub type Hits = (Vec<ScoredRecord>, u64);

pub struct SearchEngine {
    index: Arc<dyn IndexStore>,
    registry: Arc<dyn DocumentRegistry>,
    embeddings: EmbeddingAdapter,
    breakers: Arc<BreakerRegistry>,
    index_breaker: Arc<CircuitBreaker>,
    write_breaker: Arc<CircuitBreaker>,
    cache: Arc<ResponseCache>,
    options: EngineOptions,
}

impl SearchEngine {
    pub fn new(
        index: Arc<dyn IndexStore>,
        registry: Arc<dyn DocumentRegistry>,
        embeddings: EmbeddingAdapter,
        breakers: Arc<BreakerRegistry>,
        options: EngineOptions,
    ) -> Self {
        let index_breaker = breakers.get(INDEX_STORE_BREAKER);
        let write_breaker = breakers.get(INDEX_WRITE_BREAKER);
        Self {
            index,
            registry,
            embeddings,
            breakers,
            index_breaker,
            write_breaker,
            cache: Arc::new(ResponseCache::new()),
            options,
        }
    }

    /// Wire an engine over one store that serves as both index and registry.
    ///
    /// Breaker thresholds, embedding limits, and engine options come from
    /// `config`; the embedding provider is supplied by the caller.
    pub fn from_parts<S>(store: Arc<S>, provider: Arc<dyn EmbeddingProvider>, config: &Config) -> Self
    where
        S: IndexStore + DocumentRegistry + 'static,
    {
        let breakers = Arc::new(BreakerRegistry::new(
            config.breaker.max_failures,
            Duration::from_secs(config.breaker.reset_timeout_secs),
        ));
        let embeddings = EmbeddingAdapter::new(
            provider,
            breakers.get(EMBEDDING_BREAKER),
            Duration::from_secs(config.embedding.timeout_secs),
            config.embedding.max_input_chars,
        );
        let index: Arc<dyn IndexStore> = store.clone();
        let registry: Arc<dyn DocumentRegistry> = store;
        Self::new(
            index,
            registry,
            embeddings,
            breakers,
            EngineOptions::from_config(config),
        )
    }

    /// Open the configured SQLite database and provider, and start the
    /// cache sweeper when `cache.sweep_interval_secs > 0`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        let provider = create_provider(&config.embedding)?;
        let engine = Self::from_parts(Arc::new(SqliteStore::new(pool)), provider, config);
        if config.cache.sweep_interval_secs > 0 {
            let _sweeper = engine
                .cache
                .spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_secs));
        }
        Ok(engine)
    }

    /// Share an existing response cache.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn embeddings(&self) -> &EmbeddingAdapter {
        &self.embeddings
    }

    /// `(name, state, failures)` for every breaker this engine uses.
    pub fn breaker_states(&self) -> Vec<(String, BreakerState, u32)> {
        self.breakers.snapshot()
    }

    // ============ Search ============

    #[instrument(
        skip_all,
        fields(search_type = %request.search_type, page = request.page, size = request.size)
    )]
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.validate(request)?;

        let key = self.options.cache_key.for_request(request);
        match self.cache.get(&key) {
            Ok(Some(cached)) => {
                debug!("cache hit");
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => warn!("cache read failed: {}", e),
        }

        let started = Instant::now();
        let (records, total) = match request.search_type {
            SearchType::Keyword => self.keyword_hits(request).await?,
            SearchType::Semantic => self.semantic_hits(request).await?,
            SearchType::Hybrid => {
                let (keyword, semantic) =
                    tokio::try_join!(self.keyword_hits(request), self.semantic_hits(request))?;
                merge_results(keyword, semantic)
            }
        };
        let elapsed = started.elapsed();

        let response = SearchResponse {
            total,
            items: records
                .into_iter()
                .map(|hit| self.to_result(hit, &request.query))
                .collect(),
            page: request.page,
            size: request.size,
        };

        let ttl = self
            .options
            .policy
            .ttl_for(request.search_type, &response, elapsed);
        if let Err(e) = self.cache.set(key, response.clone(), ttl) {
            warn!("cache write failed: {}", e);
        }

        info!(
            total = response.total,
            returned = response.items.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            ttl_secs = ttl.as_secs(),
            "search completed"
        );
        Ok(response)
    }

    fn validate(&self, request: &SearchRequest) -> Result<()> {
        if request.page == 0 {
            return Err(SearchError::Validation("page must be >= 1".to_string()));
        }
        if request.size == 0 || request.size > self.options.max_page_size {
            return Err(SearchError::Validation(format!(
                "size must be between 1 and {}",
                self.options.max_page_size
            )));
        }
        Ok(())
    }

    async fn keyword_hits(&self, request: &SearchRequest) -> Result<Hits> {
        let keywords = extract_keywords(&request.query);
        let page = self
            .guarded("keyword search", || {
                self.index.search_by_keywords(
                    &keywords,
                    &request.filters,
                    request.page,
                    request.size,
                )
            })
            .await?;

        let records = page
            .records
            .into_iter()
            .map(|mut hit| {
                hit.score = keyword_score(&hit.record.content, &keywords);
                hit
            })
            .collect();
        Ok((records, page.total))
    }

    async fn semantic_hits(&self, request: &SearchRequest) -> Result<Hits> {
        let tokens = extract_keywords(&request.query);
        let vector = self
            .embeddings
            .query_vector(&request.query, &tokens)
            .await?;
        let page = self
            .guarded("vector search", || {
                self.index
                    .search_by_vector(&vector, &request.filters, request.page, request.size)
            })
            .await?;
        Ok((page.records, page.total))
    }

    fn to_result(&self, hit: ScoredRecord, query: &str) -> SearchResult {
        let record = hit.record;

        let mut metadata = if record.metadata.is_empty() {
            serde_json::Map::new()
        } else {
            match serde_json::from_str::<serde_json::Value>(&record.metadata) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!(record = %record.id, "index record metadata is not a JSON object");
                    serde_json::Map::new()
                }
            }
        };
        let library = metadata
            .get("document_library")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        metadata.insert("start_position".into(), record.start_position.into());
        metadata.insert("end_position".into(), record.end_position.into());

        SearchResult {
            snippet: extract_snippet(&record.content, query, self.options.snippet_max_length),
            id: record.id,
            document_id: record.document_id,
            version: record.version,
            library,
            content: record.content,
            score: hit.score,
            content_type: record.content_type,
            section: record.section,
            metadata,
        }
    }

    /// Run an index store read behind the `index_store` breaker.
    async fn guarded<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        run_guarded(&self.index_breaker, operation, f).await
    }

    /// Run an index store write behind the `index_store_write` breaker.
    async fn guarded_write<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        run_guarded(&self.write_breaker, operation, f).await
    }

    // ============ Indexing ============

    /// Rebuild the index for one document version.
    ///
    /// The version must exist and be `completed`. All existing records for
    /// `(document_id, version)` are deleted before the fresh record is
    /// inserted.
    #[instrument(skip(self))]
    pub async fn build_index(&self, document_id: &str, version: &str) -> Result<SearchIndexRecord> {
        let version = version.trim();
        let doc_version = self
            .registry
            .get_version(document_id, version)
            .await
            .map_err(|e| SearchError::dependency("load document version", e))?
            .ok_or_else(|| {
                SearchError::NotFound(format!("document {} version {}", document_id, version))
            })?;
        if doc_version.status != DocumentStatus::Completed {
            return Err(SearchError::NotReady(doc_version.status));
        }

        let document = self
            .registry
            .get_document(document_id)
            .await
            .map_err(|e| SearchError::dependency("load document", e))?
            .ok_or_else(|| SearchError::NotFound(format!("document {}", document_id)))?;

        let record = self.build_record(&document, &doc_version).await?;

        let removed = self
            .guarded_write("delete stale index records", || {
                self.index
                    .delete_by_document_id_and_version(document_id, version)
            })
            .await?;
        self.guarded_write("create index record", || self.index.create(&record))
            .await?;

        info!(record = %record.id, replaced = removed, "index built");
        Ok(record)
    }

    async fn build_record(
        &self,
        document: &Document,
        version: &DocumentVersion,
    ) -> Result<SearchIndexRecord> {
        let content = &version.content;
        let vectors = self.embeddings.content_vectors(content).await?;
        let legacy_vector = serde_json::to_string(&vectors.legacy)
            .context("serialize legacy vector")
            .map_err(|e| SearchError::Embedding(format!("{:#}", e)))?;

        let end = content.chars().count();
        let metadata = serde_json::json!({
            "document_name": document.name,
            "document_type": document.doc_type,
            "document_library": document.library,
            "version": version.version,
            "start_position": 0,
            "end_position": end,
        });

        let now = chrono::Utc::now().timestamp();
        Ok(SearchIndexRecord {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document.id.clone(),
            version: version.version.clone(),
            content: content.clone(),
            content_type: "text".to_string(),
            section: document.name.clone(),
            legacy_vector,
            native_embedding: vectors.native,
            metadata: metadata.to_string(),
            start_position: 0,
            end_position: end,
            created_at: now,
            updated_at: now,
        })
    }

    /// Insert pre-built records in one batch.
    pub async fn build_index_batch(&self, records: &[SearchIndexRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.guarded_write("create index batch", || self.index.create_batch(records))
            .await
    }

    pub async fn delete_index(&self, document_id: &str) -> Result<u64> {
        self.guarded_write("delete index", || {
            self.index.delete_by_document_id(document_id)
        })
        .await
    }

    pub async fn delete_index_by_version(&self, document_id: &str, version: &str) -> Result<u64> {
        let version = version.trim();
        self.guarded_write("delete index version", || {
            self.index
                .delete_by_document_id_and_version(document_id, version)
        })
        .await
    }

    pub async fn get_indexing_status(&self, document_id: &str) -> Result<IndexingStatus> {
        self.guarded("indexing status", || {
            self.index.get_indexing_status(document_id)
        })
        .await
    }

    pub fn clear_cache(&self) -> std::result::Result<(), CacheError> {
        self.cache.clear()?;
        info!("search cache cleared");
        Ok(())
    }
}

async fn run_guarded<T, F, Fut>(
    breaker: &CircuitBreaker,
    operation: &'static str,
    f: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    breaker.execute(f).await.map_err(|e| match e {
        BreakerError::Open(open) => SearchError::CircuitOpen(open),
        BreakerError::Inner(cause) => SearchError::dependency(operation, cause),
    })
}

/// Whitespace tokens of the trimmed query, case preserved.
pub fn extract_keywords(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_string).collect()
}

/// Fraction of distinct tokens found (case-insensitively) in `content`.
pub fn keyword_score(content: &str, keywords: &[String]) -> f32 {
    let distinct: BTreeSet<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    if distinct.is_empty() {
        return 0.0;
    }
    let haystack = content.to_lowercase();
    let found = distinct
        .iter()
        .filter(|k| haystack.contains(k.as_str()))
        .count();
    found as f32 / distinct.len() as f32
}

/// Weighted merge of keyword and semantic hits.
pub fn merge_results(keyword: Hits, semantic: Hits) -> Hits {
    let (keyword_hits, keyword_total) = keyword;
    let (semantic_hits, semantic_total) = semantic;

    let mut merged: Vec<ScoredRecord> = Vec::with_capacity(keyword_hits.len() + semantic_hits.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for mut hit in keyword_hits {
        hit.score *= KEYWORD_WEIGHT;
        positions.insert(hit.record.id.clone(), merged.len());
        merged.push(hit);
    }
    for mut hit in semantic_hits {
        let weighted = hit.score * SEMANTIC_WEIGHT;
        match positions.get(&hit.record.id) {
            Some(&i) => merged[i].score += weighted,
            None => {
                hit.score = weighted;
                positions.insert(hit.record.id.clone(), merged.len());
                merged.push(hit);
            }
        }
    }

    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    (merged, keyword_total.max(semantic_total))
}

// ============ CLI ============

/// `dsearch search`: run one query against the configured database and print results.
pub async fn run_search(
    config: &Config,
    request: &SearchRequest,
    json: bool,
) -> anyhow::Result<()> {
    let engine = SearchEngine::from_config(config).await?;
    let response = engine.search(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.items.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "{} result(s), page {} (size {})\n",
        response.total, response.page, response.size
    );
    for (i, item) in response.items.iter().enumerate() {
        let rank = (response.page as usize - 1) * response.size as usize + i + 1;
        let library = if item.library.is_empty() {
            "-"
        } else {
            item.library.as_str()
        };
        println!("{}. [{:.2}] {} / {}", rank, item.score, library, item.section);
        println!("    document: {} @ {}", item.document_id, item.version);
        println!(
            "    excerpt: \"{}\"",
            item.snippet.replace('\n', " ").trim()
        );
        println!("    id: {}", item.id);
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f32) -> ScoredRecord {
        ScoredRecord {
            record: SearchIndexRecord {
                id: id.into(),
                document_id: "d".into(),
                version: "1".into(),
                content: String::new(),
                content_type: "text".into(),
                section: String::new(),
                legacy_vector: String::new(),
                native_embedding: None,
                metadata: "{}".into(),
                start_position: 0,
                end_position: 0,
                created_at: 0,
                updated_at: 0,
            },
            score,
        }
    }

    #[test]
    fn test_extract_keywords() {
        assert_eq!(extract_keywords("  Rust   async\ttokio "), vec!["Rust", "async", "tokio"]);
        assert!(extract_keywords("   ").is_empty());
    }

    #[test]
    fn test_keyword_score_fraction_of_distinct_tokens() {
        let kw = extract_keywords("rust ASYNC missing rust");
        let score = keyword_score("Async Rust in practice", &kw);
        assert!((score - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(keyword_score("anything", &[]), 0.0);
    }

    #[test]
    fn test_merge_sums_overlap_and_weights_singletons() {
        let keyword = (vec![hit("both", 0.5), hit("kw-only", 0.9)], 7);
        let semantic = (vec![hit("both", 0.8), hit("sem-only", 0.5)], 4);
        let (merged, total) = merge_results(keyword, semantic);

        assert_eq!(total, 7);
        let scores: HashMap<_, _> = merged
            .iter()
            .map(|h| (h.record.id.as_str(), h.score))
            .collect();
        assert!((scores["both"] - 0.62).abs() < 1e-6);
        assert!((scores["kw-only"] - 0.54).abs() < 1e-6);
        assert!((scores["sem-only"] - 0.2).abs() < 1e-6);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].record.id, "both");
        assert_eq!(merged[2].record.id, "sem-only");
    }

    #[test]
    fn test_merge_total_is_max() {
        let (_, total) = merge_results((vec![], 2), (vec![], 9));
        assert_eq!(total, 9);
    }
}
