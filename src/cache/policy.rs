//! Cache key derivation and the adaptive TTL policy.
//!
//! # TTL selection
//!
//! 1. Base TTL by search type: keyword 5 min, semantic 10 min, hybrid 15 min.
//! 2. A response with no results is cached for 2 min regardless of type.
//! 3. If retrieval took longer than 500 ms, the TTL chosen above is doubled.
//!
//! All four durations and the slow-query threshold come from `[cache]`.

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::config::CacheConfig;
use crate::models::{SearchRequest, SearchResponse, SearchType};

/// Derives cache keys from search requests.
#[derive(Debug, Clone, Copy)]
pub struct CacheKey {
    include_filters: bool,
}

impl CacheKey {
    pub fn new(include_filters: bool) -> Self {
        Self { include_filters }
    }

    /// Deterministic key for `request`.
    ///
    /// The fields are JSON-encoded as an array before hashing, so no two
    /// distinct `(query, type, page, size[, filters])` tuples share an
    /// encoding.
    pub fn for_request(&self, request: &SearchRequest) -> String {
        let mut parts = vec![
            serde_json::Value::from(request.query.as_str()),
            serde_json::Value::from(request.search_type.as_str()),
            serde_json::Value::from(request.page),
            serde_json::Value::from(request.size),
        ];
        if self.include_filters {
            // BTreeMap serializes in key order.
            parts.push(serde_json::to_value(&request.filters).unwrap_or_default());
        }
        let encoded = serde_json::Value::Array(parts).to_string();

        let mut hasher = Sha256::new();
        hasher.update(encoded.as_bytes());
        format!("search:{}", hex::encode(hasher.finalize()))
    }
}

/// Picks a TTL for a freshly computed response.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub keyword_ttl: Duration,
    pub semantic_ttl: Duration,
    pub hybrid_ttl: Duration,
    pub empty_ttl: Duration,
    pub slow_query: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            keyword_ttl: Duration::from_secs(5 * 60),
            semantic_ttl: Duration::from_secs(10 * 60),
            hybrid_ttl: Duration::from_secs(15 * 60),
            empty_ttl: Duration::from_secs(2 * 60),
            slow_query: Duration::from_millis(500),
        }
    }
}

impl CachePolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            keyword_ttl: Duration::from_secs(config.keyword_ttl_secs),
            semantic_ttl: Duration::from_secs(config.semantic_ttl_secs),
            hybrid_ttl: Duration::from_secs(config.hybrid_ttl_secs),
            empty_ttl: Duration::from_secs(config.empty_ttl_secs),
            slow_query: Duration::from_millis(config.slow_query_ms),
        }
    }

    pub fn ttl_for(
        &self,
        search_type: SearchType,
        response: &SearchResponse,
        elapsed: Duration,
    ) -> Duration {
        let mut ttl = match search_type {
            SearchType::Keyword => self.keyword_ttl,
            SearchType::Semantic => self.semantic_ttl,
            SearchType::Hybrid => self.hybrid_ttl,
        };
        if response.total == 0 || response.items.is_empty() {
            ttl = self.empty_ttl;
        }
        if elapsed > self.slow_query {
            ttl *= 2;
        }
        ttl
    }
}
