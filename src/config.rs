//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! ```toml
//! [db]
//! path = "./data/docsearch.sqlite"
//!
//! [search]
//! snippet_max_length = 200
//!
//! [cache]
//! keyword_ttl_secs = 300
//! key_includes_filters = true
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [breaker]
//! max_failures = 5
//! reset_timeout_secs = 30
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_snippet_max_length")]
    pub snippet_max_length: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            snippet_max_length: default_snippet_max_length(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_snippet_max_length() -> usize {
    200
}
fn default_max_page_size() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_keyword_ttl")]
    pub keyword_ttl_secs: u64,
    #[serde(default = "default_semantic_ttl")]
    pub semantic_ttl_secs: u64,
    #[serde(default = "default_hybrid_ttl")]
    pub hybrid_ttl_secs: u64,
    #[serde(default = "default_empty_ttl")]
    pub empty_ttl_secs: u64,
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_ms: u64,
    /// Whether request filters take part in the cache key.
    #[serde(default = "default_true")]
    pub key_includes_filters: bool,
    /// Seconds between expired-entry sweeps; `0` disables the sweeper.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            keyword_ttl_secs: default_keyword_ttl(),
            semantic_ttl_secs: default_semantic_ttl(),
            hybrid_ttl_secs: default_hybrid_ttl(),
            empty_ttl_secs: default_empty_ttl(),
            slow_query_ms: default_slow_query_ms(),
            key_includes_filters: true,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_keyword_ttl() -> u64 {
    300
}
fn default_semantic_ttl() -> u64 {
    600
}
fn default_hybrid_ttl() -> u64 {
    900
}
fn default_empty_ttl() -> u64 {
    120
}
fn default_slow_query_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}
fn default_sweep_interval() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `ollama`, or an OpenAI-compatible endpoint for `openai`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    8192
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BreakerConfig {
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            reset_timeout_secs: default_reset_timeout(),
        }
    }
}

fn default_max_failures() -> u32 {
    5
}
fn default_reset_timeout() -> u64 {
    30
}

impl Config {
    /// A config with defaults everywhere and the database at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
            embedding: EmbeddingConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.search.snippet_max_length == 0 {
        bail!("search.snippet_max_length must be > 0");
    }
    if config.search.max_page_size == 0 {
        bail!("search.max_page_size must be > 0");
    }

    let cache = &config.cache;
    for (name, value) in [
        ("keyword_ttl_secs", cache.keyword_ttl_secs),
        ("semantic_ttl_secs", cache.semantic_ttl_secs),
        ("hybrid_ttl_secs", cache.hybrid_ttl_secs),
        ("empty_ttl_secs", cache.empty_ttl_secs),
    ] {
        if value == 0 {
            bail!("cache.{} must be > 0", name);
        }
    }

    if config.breaker.max_failures == 0 {
        bail!("breaker.max_failures must be >= 1");
    }

    if config.embedding.max_input_chars == 0 {
        bail!("embedding.max_input_chars must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config("[db]\npath = \"/tmp/ds.sqlite\"\n").unwrap();
        assert_eq!(cfg.search.snippet_max_length, 200);
        assert_eq!(cfg.cache.keyword_ttl_secs, 300);
        assert_eq!(cfg.cache.hybrid_ttl_secs, 900);
        assert!(cfg.cache.key_includes_filters);
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.embedding.max_input_chars, 8192);
        assert_eq!(cfg.breaker.max_failures, 5);
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        let err = parse_config(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let err =
            parse_config("[db]\npath = \"x\"\n[cache]\nempty_ttl_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("cache.empty_ttl_secs"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/docsearch.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
