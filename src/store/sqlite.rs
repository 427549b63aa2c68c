//! SQLite-backed [`Repository`] implementation.
//!
//! Pages live in the `pages` table with untyped columns, so whatever the
//! crawler wrote comes back verbatim and is validated only when decoded.
//! Rows are converted to [`RawRecord`] documents column by column,
//! according to each value's runtime SQLite type.
//!
//! # Cursors
//!
//! [`find`](SqliteRepository::find) spawns a producer task that owns a
//! pooled connection and the row stream. It feeds a channel with capacity 1,
//! so at most one row is read ahead of the consumer. The task exits, and
//! the connection goes back to the pool, as soon as the receiving cursor is
//! dropped, even while it is waiting on SQLite.
//!
//! Every open cursor holds one pooled connection for as long as its consumer
//! keeps it, and a WebSocket session with a slow reader can keep one for a
//! whole stream. `[db] max_connections` must therefore exceed the number of
//! concurrently open cursors, or other callers wait for a connection until
//! their deadline expires.
//!
//! The URL constraint is pushed down to SQL. The text pattern is evaluated
//! in process with [`QueryExpression::matches`] before a row is sent, which
//! keeps matching semantics identical across store implementations.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{trace, warn};

use crate::error::StoreError;
use crate::models::{normalize_extension, ForbiddenExtensionSet, NewPage, RecordId};
use crate::query::QueryExpression;

use super::{RawRecord, RecordCursor, Repository};

const FIND_ALL_SQL: &str =
    "SELECT id, url, title, crawl_date AS crawlDate, content FROM pages ORDER BY seq ASC";

const FIND_BY_URL_SQL: &str = "SELECT id, url, title, crawl_date AS crawlDate, content \
     FROM pages WHERE url = ? ORDER BY seq ASC";

const FIND_BY_ID_SQL: &str =
    "SELECT id, url, title, crawl_date AS crawlDate, content FROM pages WHERE id = ?";

/// SQLite implementation of the [`Repository`] trait.
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Reads one column as a JSON value according to its runtime SQLite type.
///
/// BLOBs have no document representation and become `null`.
fn column_value(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    let value = row.try_get_raw(index)?;
    if value.is_null() {
        return Ok(Value::Null);
    }
    let json = match value.type_info().name() {
        "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => serde_json::Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
            .map_or(Value::Null, Value::Number),
        "TEXT" => Value::String(row.try_get_unchecked::<String, _>(index)?),
        _ => Value::Null,
    };
    Ok(json)
}

/// Converts a row into a loose document keyed by column name.
///
/// A column that cannot be read (TEXT holding invalid UTF-8, say) becomes
/// `null` and the row is still returned, so a single damaged page is
/// rejected when decoded instead of failing the cursor.
fn row_to_raw(row: &SqliteRow) -> RawRecord {
    let mut raw = RawRecord::new();
    for column in row.columns() {
        let json = column_value(row, column.ordinal()).unwrap_or_else(|e| {
            warn!(column = column.name(), error = %e, "unreadable column, treating as null");
            Value::Null
        });
        raw.insert(column.name().to_string(), json);
    }
    raw
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn find(&self, query: &QueryExpression) -> Result<RecordCursor, StoreError> {
        let (tx, rx) = mpsc::channel(1);
        let pool = self.pool.clone();
        let query = query.clone();

        tokio::spawn(async move {
            let statement = match query.url_filter() {
                Some(url) => sqlx::query(FIND_BY_URL_SQL).bind(url.to_string()),
                None => sqlx::query(FIND_ALL_SQL),
            };
            let mut rows = statement.fetch(&pool);

            loop {
                let next = tokio::select! {
                    _ = tx.closed() => break,
                    next = rows.next() => next,
                };

                let item = match next {
                    None => break,
                    Some(Ok(row)) => {
                        let raw = row_to_raw(&row);
                        if !query.matches(&raw) {
                            continue;
                        }
                        Ok(raw)
                    }
                    Some(Err(e)) => Err(StoreError::from(e)),
                };

                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
            trace!("sqlite cursor released");
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn find_by_id(&self, id: &RecordId) -> Result<Option<RawRecord>, StoreError> {
        let row = sqlx::query(FIND_BY_ID_SQL)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_raw))
    }

    async fn list_forbidden_extensions(&self) -> Result<ForbiddenExtensionSet, StoreError> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT extension FROM forbidden_extensions")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|ext| normalize_extension(ext))
            .collect())
    }

    async fn insert_page(&self, page: &NewPage) -> Result<RecordId, StoreError> {
        let id = RecordId::generate();

        sqlx::query(
            "INSERT INTO pages (id, url, title, crawl_date, content) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(&page.url)
        .bind(&page.title)
        .bind(page.crawl_date.to_rfc3339())
        .bind(&page.content)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn add_forbidden_extension(&self, extension: &str) -> Result<(), StoreError> {
        let Some(ext) = normalize_extension(extension) else {
            return Ok(());
        };

        sqlx::query("INSERT OR IGNORE INTO forbidden_extensions (extension) VALUES (?)")
            .bind(ext)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
