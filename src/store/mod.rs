//! Repository abstraction over the crawl-result store.
//!
//! The [`Repository`] trait is the only data-access boundary of the query
//! core. It hands out raw documents ([`RawRecord`]) and leaves decoding to
//! the caller, so a single corrupt record can be skipped without failing the
//! cursor that produced it.
//!
//! Implementations must be `Send + Sync` and safe for concurrent use: one
//! repository value is shared by every HTTP request and every session.
//!
//! | Implementation | Purpose |
//! |----------------|---------|
//! | [`sqlite::SqliteRepository`] | Production store backed by a `sqlx` SQLite pool |
//! | [`memory::InMemoryRepository`] | Test double with cursor accounting and fault injection |

pub mod memory;
pub mod sqlite;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreError;
use crate::models::{ForbiddenExtensionSet, NewPage, RecordId};
use crate::query::QueryExpression;

/// A stored page before decoding: a loose JSON document with the fields
/// `id`, `url`, `title`, `crawlDate`, and `content`.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A live, resource-owning handle over a query's remaining matches.
///
/// Records arrive in store order. The underlying store resources are
/// released when the cursor is dropped, whether or not it was exhausted.
pub type RecordCursor = BoxStream<'static, Result<RawRecord, StoreError>>;

/// Shared handle injected into every component at construction time.
pub type SharedRepository = Arc<dyn Repository>;

/// Abstract crawl-result store.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Opens a cursor over all records matching `query`.
    async fn find(&self, query: &QueryExpression) -> Result<RecordCursor, StoreError>;

    /// Fetches one record by id, or `None` when no record has that id.
    async fn find_by_id(&self, id: &RecordId) -> Result<Option<RawRecord>, StoreError>;

    /// Extensions the crawler must skip.
    async fn list_forbidden_extensions(&self) -> Result<ForbiddenExtensionSet, StoreError>;

    /// Stores a new page and returns its assigned id. Used by tooling only;
    /// the query core never writes.
    async fn insert_page(&self, page: &NewPage) -> Result<RecordId, StoreError>;

    /// Adds an extension to the forbidden set. Used by tooling only.
    async fn add_forbidden_extension(&self, extension: &str) -> Result<(), StoreError>;
}

/// Runs one repository operation under a deadline.
pub async fn with_deadline<T>(
    deadline: Duration,
    op: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(deadline, op)
        .await
        .map_err(|_| StoreError::Timeout(deadline))?
}

/// Builds the raw document for a page about to be stored.
pub fn raw_page(id: &RecordId, page: &NewPage) -> RawRecord {
    let mut raw = RawRecord::new();
    raw.insert("id".into(), id.as_str().into());
    raw.insert("url".into(), page.url.clone().into());
    raw.insert("title".into(), page.title.clone().into());
    raw.insert("crawlDate".into(), page.crawl_date.to_rfc3339().into());
    raw.insert("content".into(), page.content.clone().into());
    raw
}
