//! # docsearch CLI (`dsearch`)
//!
//! ## Usage
//!
//! ```bash
//! dsearch --config ./config/dsearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dsearch init` | Create the SQLite database and schema |
//! | `dsearch register <file>` | Store a text file as a completed document version |
//! | `dsearch index <doc> <version>` | (Re)build the index for one version |
//! | `dsearch search "<query>"` | Keyword, semantic, or hybrid search |
//! | `dsearch status <doc>` | Indexing progress for a document |
//! | `dsearch delete <doc>` | Remove index records for a document or one version |
//!
//! Logging goes to stderr. `RUST_LOG` overrides the default `info` level;
//! `--verbose` switches it to `debug`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docsearch::config;
use docsearch::index_cmd::{self, RegisterArgs};
use docsearch::migrate;
use docsearch::models::{SearchRequest, SearchType};
use docsearch::search;

/// Hybrid document search over indexed document versions.
#[derive(Parser)]
#[command(name = "dsearch", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dsearch.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Register a parsed text file as a completed document version.
    Register {
        /// Text file holding the version's content.
        file: PathBuf,

        /// Document id. A new UUID is generated when omitted.
        #[arg(long)]
        id: Option<String>,

        /// Display name. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "")]
        library: String,

        #[arg(long = "type", default_value = "markdown")]
        doc_type: String,

        #[arg(long, default_value = "1.0")]
        version: String,
    },

    /// Build (or rebuild) the index for one document version.
    Index { document_id: String, version: String },

    /// Search indexed documents.
    Search {
        query: String,

        /// keyword, semantic, or hybrid. Anything else runs a keyword search.
        #[arg(long, default_value = "keyword")]
        mode: String,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 10)]
        size: u32,

        /// Filter as KEY=VALUE (document_id, version, content_type, section).
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,

        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Show indexing progress for a document.
    Status { document_id: String },

    /// Delete index records for a document, or for one version of it.
    Delete {
        document_id: String,

        #[arg(long)]
        version: Option<String>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
        }
        Commands::Register {
            file,
            id,
            name,
            library,
            doc_type,
            version,
        } => {
            index_cmd::run_register(
                &cfg,
                &file,
                RegisterArgs {
                    id,
                    name,
                    library,
                    doc_type,
                    version,
                },
            )
            .await?;
        }
        Commands::Index {
            document_id,
            version,
        } => {
            index_cmd::run_index(&cfg, &document_id, &version).await?;
        }
        Commands::Search {
            query,
            mode,
            page,
            size,
            filters,
            json,
        } => {
            let search_type = SearchType::from_name(&mode);
            if search_type.as_str() != mode.trim().to_ascii_lowercase() {
                tracing::warn!("unknown search mode '{}', using keyword", mode);
            }
            let mut request = SearchRequest::new(query)
                .with_type(search_type)
                .with_page(page, size);
            for (key, value) in filters {
                request = request.with_filter(key, serde_json::Value::String(value));
            }
            search::run_search(&cfg, &request, json).await?;
        }
        Commands::Status { document_id } => {
            index_cmd::run_status(&cfg, &document_id).await?;
        }
        Commands::Delete {
            document_id,
            version,
        } => {
            index_cmd::run_delete(&cfg, &document_id, version.as_deref()).await?;
        }
    }

    Ok(())
}
