//! # Crawl Query CLI (`cq`)
//!
//! The `cq` binary initializes the page store, imports crawled pages, runs
//! searches and lookups from the terminal, and starts the HTTP/WebSocket
//! server.
//!
//! ## Usage
//!
//! ```bash
//! cq --config ./config/cq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cq init` | Create the SQLite database and run schema migrations |
//! | `cq import <file>` | Import pages from a JSON Lines file |
//! | `cq search "<pattern>"` | Search pages by title or content |
//! | `cq get <id>` | Print a page and its content |
//! | `cq extensions` | List (or add) forbidden extensions |
//! | `cq serve` | Start the HTTP/WebSocket server |
//!
//! ## Examples
//!
//! ```bash
//! cq init --config ./config/cq.toml
//! cq import crawl.jsonl
//! cq search "market" --url http://example.onion --limit 5
//! cq extensions --add pdf --add .ZIP
//! cq serve
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crawl_query::config::{self, Config};
use crawl_query::engine::QueryEngine;
use crawl_query::store::sqlite::SqliteRepository;
use crawl_query::{db, extensions, get, import, logging, migrate, search, server};

/// Crawl Query CLI: search and serve crawled pages.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "cq",
    about = "Crawl Query: search and stream crawled pages",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/cq.toml`.
    #[arg(long, global = true, default_value = "./config/cq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and its tables. Idempotent.
    Init,

    /// Import pages from a JSON Lines file.
    ///
    /// Each line holds `url`, `title`, `crawlDate` (RFC 3339), and `content`.
    Import {
        /// Path to the `.jsonl` file.
        file: PathBuf,
    },

    /// Search pages whose title or content matches a pattern.
    ///
    /// The pattern is a case-insensitive regular expression; an empty
    /// pattern matches everything.
    Search {
        pattern: String,

        /// Only pages crawled from exactly this URL.
        #[arg(long)]
        url: Option<String>,

        /// Stop after this many results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print a page and its content by id.
    Get {
        /// Page UUID.
        id: String,
    },

    /// List forbidden extensions.
    Extensions {
        /// Add an extension before listing. Repeatable.
        #[arg(long = "add")]
        add: Vec<String>,
    },

    /// Start the HTTP/WebSocket server on `[server].bind`.
    Serve,
}

async fn open_engine(cfg: &Config) -> anyhow::Result<QueryEngine> {
    let pool = db::connect(cfg).await?;
    let repo = Arc::new(SqliteRepository::new(pool));
    Ok(QueryEngine::from_config(repo, cfg))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.filter);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            let engine = open_engine(&cfg).await?;
            import::run_import(engine.repository().as_ref(), &file).await?;
        }
        Commands::Search {
            pattern,
            url,
            limit,
        } => {
            let engine = open_engine(&cfg).await?;
            search::run_search(&engine, &pattern, url.as_deref(), limit).await?;
        }
        Commands::Get { id } => {
            let engine = open_engine(&cfg).await?;
            get::run_get(&engine, &id).await?;
        }
        Commands::Extensions { add } => {
            let engine = open_engine(&cfg).await?;
            extensions::run_extensions(&engine, &add).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
