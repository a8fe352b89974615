//! Guarded access to the embedding generator.
//!
//! [`EmbeddingAdapter::embed`] rejects blank input, truncates long input,
//! and calls the provider through a [`CircuitBreaker`] with a per-call
//! timeout. Any failure past validation is absorbed by the deterministic
//! 384-d [`mock_embedding`]; callers never see provider errors.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, warn};

use super::fallback::{legacy_content_vector, legacy_query_vector, mock_embedding};
use super::EmbeddingProvider;
use crate::circuit_breaker::{BreakerError, CircuitBreaker};
use crate::error::{Result, SearchError};

/// Vectors produced for one index record.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentVectors {
    /// Written to the legacy text column.
    pub legacy: Vec<f32>,
    /// Written to the native column when an embedding was produced.
    pub native: Option<Vec<f32>>,
}

pub struct EmbeddingAdapter {
    provider: Arc<dyn EmbeddingProvider>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
    max_input_chars: usize,
}

impl EmbeddingAdapter {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        breaker: Arc<CircuitBreaker>,
        timeout: Duration,
        max_input_chars: usize,
    ) -> Self {
        Self {
            provider,
            breaker,
            timeout,
            max_input_chars: max_input_chars.max(1),
        }
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Embed `text`, degrading to the mock generator on any provider failure.
    ///
    /// Only blank input is an error ([`SearchError::Validation`]).
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(SearchError::Validation("content is empty".to_string()));
        }

        let input = self.truncate(text);
        let outcome = self
            .breaker
            .execute(|| async {
                match tokio::time::timeout(self.timeout, self.provider.embed(input)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!("embedding timed out after {:?}", self.timeout)),
                }
            })
            .await;

        match outcome {
            Ok(vector) if !vector.is_empty() => Ok(vector),
            Ok(_) => {
                warn!("embedding provider returned an empty vector, using fallback");
                Ok(mock_embedding(text))
            }
            Err(BreakerError::Open(e)) => {
                debug!("{}, using fallback embedding", e);
                Ok(mock_embedding(text))
            }
            Err(BreakerError::Inner(e)) => {
                warn!(
                    model = self.provider.model_name(),
                    "embedding failed, using fallback: {:#}", e
                );
                Ok(mock_embedding(text))
            }
        }
    }

    /// Vector used to query the index.
    ///
    /// Blank queries get the 100-d keyword-hash vector over `tokens`.
    pub async fn query_vector(&self, query: &str, tokens: &[String]) -> Result<Vec<f32>> {
        match self.embed(query).await {
            Err(SearchError::Validation(_)) => Ok(legacy_query_vector(tokens)),
            other => other,
        }
    }

    /// Vectors stored with an index record.
    ///
    /// Blank content gets the 100-d positional vector and no native embedding.
    pub async fn content_vectors(&self, content: &str) -> Result<ContentVectors> {
        match self.embed(content).await {
            Ok(vector) => Ok(ContentVectors {
                legacy: vector.clone(),
                native: Some(vector),
            }),
            Err(SearchError::Validation(_)) => Ok(ContentVectors {
                legacy: legacy_content_vector(content),
                native: None,
            }),
            Err(e) => Err(e),
        }
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.max_input_chars) {
            Some((idx, _)) => {
                debug!(
                    limit = self.max_input_chars,
                    "embedding input truncated"
                );
                &text[..idx]
            }
            None => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::BreakerState;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records inputs and returns a fixed vector, or fails when `fail` is set.
    struct Scripted {
        fail: bool,
        delay: Option<Duration>,
        seen: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                delay: None,
                seen: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                delay: None,
                seen: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }
        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                delay: Some(delay),
                seen: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(text.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                anyhow::bail!("provider down");
            }
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    fn adapter(provider: Arc<Scripted>, max_failures: u32) -> EmbeddingAdapter {
        EmbeddingAdapter::new(
            provider,
            Arc::new(CircuitBreaker::new("embedding", max_failures, Duration::from_secs(60))),
            Duration::from_millis(200),
            10,
        )
    }

    #[tokio::test]
    async fn test_blank_input_is_validation_error() {
        let provider = Scripted::ok();
        let a = adapter(provider.clone(), 5);
        assert!(matches!(a.embed("   \n").await, Err(SearchError::Validation(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_returns_provider_vector() {
        let a = adapter(Scripted::ok(), 5);
        assert_eq!(a.embed("hello").await.unwrap(), vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_long_input_is_truncated_by_chars() {
        let provider = Scripted::ok();
        let a = adapter(provider.clone(), 5);
        a.embed("ééééééééééééééé").await.unwrap();
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].chars().count(), 10);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_mock() {
        let a = adapter(Scripted::failing(), 5);
        let v = a.embed("first content").await.unwrap();
        assert_eq!(v, mock_embedding("first content"));
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_mock() {
        let a = adapter(Scripted::slow(Duration::from_secs(2)), 5);
        let v = a.embed("slow").await.unwrap();
        assert_eq!(v, mock_embedding("slow"));
        assert_eq!(a.breaker().failures(), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_provider() {
        let provider = Scripted::failing();
        let a = adapter(provider.clone(), 2);
        a.embed("one").await.unwrap();
        a.embed("two").await.unwrap();
        assert_eq!(a.breaker().state(), BreakerState::Open);

        let v = a.embed("three").await.unwrap();
        assert_eq!(v, mock_embedding("three"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blank_query_uses_keyword_hash_vector() {
        let a = adapter(Scripted::ok(), 5);
        let v = a.query_vector("", &[]).await.unwrap();
        assert_eq!(v.len(), 100);
    }

    #[tokio::test]
    async fn test_content_vectors() {
        let a = adapter(Scripted::ok(), 5);
        let vectors = a.content_vectors("body").await.unwrap();
        assert_eq!(vectors.native, Some(vec![1.0, 0.0, 0.0]));
        assert_eq!(vectors.legacy, vec![1.0, 0.0, 0.0]);

        let blank = a.content_vectors("").await.unwrap();
        assert_eq!(blank.native, None);
        assert_eq!(blank.legacy.len(), 100);
    }
}
