//! Index management commands: `register`, `index`, `status`, `delete`.
//!
//! `register` stores an already-parsed text file as a completed document
//! version so it can be indexed; the search core never parses raw files.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::db;
use crate::models::{Document, DocumentStatus, DocumentVersion};
use crate::search::SearchEngine;
use crate::store::SqliteStore;

/// Metadata supplied on the command line for `dsearch register`.
#[derive(Debug, Clone)]
pub struct RegisterArgs {
    pub id: Option<String>,
    pub name: Option<String>,
    pub library: String,
    pub doc_type: String,
    pub version: String,
}

pub async fn run_register(config: &Config, file: &Path, args: RegisterArgs) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let id = args
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let name = args.name.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.clone())
    });

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    store
        .upsert_document(&Document {
            id: id.clone(),
            name,
            doc_type: args.doc_type,
            library: args.library,
        })
        .await?;
    store
        .upsert_version(&DocumentVersion {
            document_id: id.clone(),
            version: args.version.trim().to_string(),
            content,
            status: DocumentStatus::Completed,
        })
        .await?;
    store.pool().close().await;

    println!("Registered document {} version {}", id, args.version.trim());
    Ok(())
}

pub async fn run_index(config: &Config, document_id: &str, version: &str) -> Result<()> {
    let engine = SearchEngine::from_config(config).await?;
    let record = engine.build_index(document_id, version).await?;
    println!(
        "Indexed {} @ {} ({} chars, native embedding: {})",
        record.document_id,
        record.version,
        record.end_position,
        if record.native_embedding.is_some() { "yes" } else { "no" }
    );
    println!("    record: {}", record.id);
    Ok(())
}

pub async fn run_status(config: &Config, document_id: &str) -> Result<()> {
    let engine = SearchEngine::from_config(config).await?;
    let status = engine.get_indexing_status(document_id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

pub async fn run_delete(config: &Config, document_id: &str, version: Option<&str>) -> Result<()> {
    let engine = SearchEngine::from_config(config).await?;
    let removed = match version {
        Some(v) => engine.delete_index_by_version(document_id, v).await?,
        None => engine.delete_index(document_id).await?,
    };
    println!("Removed {} index record(s) for {}", removed, document_id);
    Ok(())
}
