//! # docsearch
//!
//! Hybrid document search over an index of document versions.
//!
//! A query is answered by lexical retrieval, vector retrieval, or a weighted
//! merge of both. Results carry query-centred snippets that avoid cutting
//! fenced code blocks, and whole responses are cached with an adaptive TTL.
//! Calls to the embedding generator and the index store sit behind circuit
//! breakers; a failing generator degrades to a deterministic local vector.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐
//!   request ───▶ │ SearchEngine │ ◀──▶ CacheStore (adaptive TTL)
//!                └──────┬───────┘
//!           ┌───────────┼────────────┐
//!           ▼           ▼            ▼
//!     IndexStore   EmbeddingAdapter  Snippet
//!     (breaker)      (breaker +      extractor
//!                     fallback)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dsearch init
//! dsearch register ./guide.md --name "Guide" --library tokio --version 1.0
//! dsearch index <document-id> 1.0
//! dsearch search "spawn_blocking" --mode hybrid
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`circuit_breaker`] | Failure-counting breaker and registry |
//! | [`cache`] | Expiring response cache and TTL policy |
//! | [`embedding`] | Providers, guarded adapter, deterministic fallback |
//! | [`snippet`] | Query-centred excerpts |
//! | [`store`] | Index store and document registry backends |
//! | [`search`] | The hybrid search engine |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`index_cmd`] | Index management commands |

pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index_cmd;
pub mod migrate;
pub mod models;
pub mod search;
pub mod snippet;
pub mod store;

pub use error::{CacheError, SearchError};
pub use search::SearchEngine;
