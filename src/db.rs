//! SQLite database connection management.
//!
//! WAL mode is enabled so the server's readers never block on the crawler's
//! writes. The pool holds up to `[db] max_connections` connections, shared
//! by every request, session, and cursor. An open search cursor keeps one of
//! them until it is dropped.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::debug;

use crate::config::Config;

/// Create a connection pool to the configured SQLite database.
///
/// Creates the database file and its parent directories if missing.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect_with(options)
        .await?;

    debug!(
        path = %db_path.display(),
        max_connections = config.db.max_connections,
        "database pool ready"
    );

    Ok(pool)
}
