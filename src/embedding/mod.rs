//! Embedding providers and vector helpers.
//!
//! The [`EmbeddingProvider`] trait is the seam to the external generator:
//! - **[`DisabledProvider`]**: always fails; the adapter then serves the local fallback.
//! - **[`OpenAIProvider`]**: `POST {base}/embeddings` on OpenAI or a compatible service.
//! - **[`OllamaProvider`]**: `POST {url}/api/embed` on a local Ollama instance.
//! - **`LocalProvider`**: in-process inference via fastembed (feature `local-embeddings-fastembed`).
//!
//! Search code never calls a provider directly; it goes through
//! [`EmbeddingAdapter`], which adds validation, truncation, a circuit
//! breaker, a timeout, and the deterministic fallback in [`fallback`].
//!
//! # Retry Strategy
//!
//! The HTTP providers retry transient errors with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, ... (capped at 2^5)

pub mod adapter;
pub mod fallback;

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::EmbeddingConfig;

pub use adapter::EmbeddingAdapter;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// A text-to-vector backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, e.g. `"text-embedding-3-small"`.
    fn model_name(&self) -> &str;
    /// Vector dimensionality, `0` when unknown.
    fn dims(&self) -> usize;
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============ Disabled Provider ============

/// Used when `embedding.provider = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider for the OpenAI embeddings API.
///
/// The API key comes from `OPENAI_API_KEY`. The endpoint defaults to
/// `https://api.openai.com/v1` and can be pointed at a compatible service
/// with `embedding.url` or the `OPENAI_BASE_URL` environment variable
/// (the variable wins).
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .or_else(|| config.url.clone())
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());

        Ok(Self {
            model,
            dims,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let url = format!("{}/embeddings", self.base_url);
        let json = post_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[0].embedding` from an OpenAI response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .ok_or_else(|| anyhow!("no embedding data returned"))?;
    let embedding = first
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
    Ok(to_f32_vec(embedding))
}

// ============ Ollama Provider ============

/// Embedding provider for a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let endpoint = format!("{}/api/embed", self.url);
        let json = post_with_retry("Ollama", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await
        .map_err(|e| anyhow!("{} (is Ollama running at {}?)", e, self.url))?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;
    let values = first
        .as_array()
        .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?;
    Ok(to_f32_vec(values))
}

// ============ Local Provider (fastembed) ============

/// In-process embedding via fastembed. The model is downloaded from
/// Hugging Face on first use and cached; later calls run offline.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            _ => 384,
        });
        Ok(Self {
            model_name,
            dims,
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let slot = Arc::clone(&self.model);
        let model_name = self.model_name.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(config_to_fastembed_model(&model_name)?)
                        .with_show_download_progress(false),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow!("local embedding model unavailable"))?;
            let mut out = model
                .embed(vec![text], None)
                .map_err(|e| anyhow!("Local embedding failed: {}", e))?;
            out.pop().ok_or_else(|| anyhow!("Empty embedding response"))
        })
        .await?
    }
}

// ============ Shared HTTP plumbing ============

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Send a JSON POST built by `build`, retrying 429/5xx and network errors.
async fn post_with_retry<F>(label: &str, max_retries: u32, build: F) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::debug!(attempt, %status, "{} embedding request failed, retrying", label);
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error: {}", label, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Build the provider named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings-fastembed`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Vector helpers ============

/// Encode a float vector as little-endian `f32` bytes for BLOB storage.
///
/// ```rust
/// use docsearch::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverse of [`vec_to_blob`]. Trailing bytes that do not form a full `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Euclidean distance, or `None` when the lengths differ.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    Some(
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    )
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_euclidean_distance() {
        let d = euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 5.0).abs() < 1e-6);
        assert_eq!(euclidean_distance(&[1.0], &[1.0, 2.0]), None);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({"data": [{"embedding": [0.25, -0.5]}]});
        assert_eq!(parse_openai_response(&json).unwrap(), vec![0.25, -0.5]);
        assert!(parse_openai_response(&serde_json::json!({"data": []})).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({"embeddings": [[1.0, 2.0]]});
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![1.0, 2.0]);
        assert!(parse_ollama_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_create_disabled_provider() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "disabled");
        assert_eq!(provider.dims(), 0);
    }

    #[tokio::test]
    async fn test_disabled_provider_fails() {
        let err = DisabledProvider.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
