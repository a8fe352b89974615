use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// `docsearch init`: create the database and its schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            doc_type TEXT NOT NULL DEFAULT '',
            library TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_versions (
            document_id TEXT NOT NULL,
            version TEXT NOT NULL,
            content TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL,
            PRIMARY KEY (document_id, version),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // `vector` holds the legacy JSON array; `embedding` the native f32 blob.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_indices (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            version TEXT NOT NULL,
            content TEXT NOT NULL,
            content_type TEXT NOT NULL DEFAULT 'text',
            section TEXT NOT NULL DEFAULT '',
            vector TEXT NOT NULL DEFAULT '',
            embedding BLOB,
            metadata TEXT NOT NULL DEFAULT '{}',
            start_position INTEGER NOT NULL DEFAULT 0,
            end_position INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_search_indices_document_id ON search_indices(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_search_indices_doc_version ON search_indices(document_id, version)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_search_indices_created_at ON search_indices(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
