//! In-memory [`Repository`] implementation for tests.
//!
//! Records live in a `Vec` behind a `parking_lot::RwLock` and are returned in
//! insertion order. Cursors scan lazily: the lock is taken once per step and
//! never held across an await.
//!
//! Extra knobs for exercising failure paths:
//!
//! - [`open_cursors`](InMemoryRepository::open_cursors) counts live cursors.
//! - [`fail_next_cursor_after`](InMemoryRepository::fail_next_cursor_after)
//!   makes the next cursor fail after `n` records.
//! - [`set_item_delay`](InMemoryRepository::set_item_delay) slows every
//!   cursor step down.
//! - [`insert_raw`](InMemoryRepository::insert_raw) stores arbitrary (even
//!   undecodable) documents.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};

use crate::error::StoreError;
use crate::models::{normalize_extension, ForbiddenExtensionSet, NewPage, RecordId};
use crate::query::QueryExpression;

use super::{raw_page, RawRecord, RecordCursor, Repository};

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    fail_after: Option<usize>,
    item_delay: Option<Duration>,
}

/// In-memory store for tests.
pub struct InMemoryRepository {
    records: Arc<RwLock<Vec<RawRecord>>>,
    extensions: RwLock<ForbiddenExtensionSet>,
    open_cursors: Arc<AtomicUsize>,
    faults: Mutex<Faults>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            extensions: RwLock::new(ForbiddenExtensionSet::new()),
            open_cursors: Arc::new(AtomicUsize::new(0)),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Stores a document as-is, bypassing validation.
    pub fn insert_raw(&self, raw: RawRecord) {
        self.records.write().push(raw);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of cursors handed out and not yet dropped.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// The next cursor yields `n` records, then fails with a backend error.
    pub fn fail_next_cursor_after(&self, n: usize) {
        self.faults.lock().fail_after = Some(n);
    }

    /// Delays every cursor step by `delay`.
    pub fn set_item_delay(&self, delay: Option<Duration>) {
        self.faults.lock().item_delay = delay;
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the open-cursor count when the owning cursor is dropped.
struct CursorGuard(Arc<AtomicUsize>);

impl CursorGuard {
    fn open(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct CursorState {
    records: Arc<RwLock<Vec<RawRecord>>>,
    query: QueryExpression,
    position: usize,
    yielded: usize,
    faults: Faults,
    _guard: CursorGuard,
}

impl CursorState {
    fn next_match(&mut self) -> Option<RawRecord> {
        let records = self.records.read();
        let found = records
            .iter()
            .enumerate()
            .skip(self.position)
            .find(|(_, r)| self.query.matches(r))
            .map(|(index, r)| (index, r.clone()));
        drop(records);

        let (index, record) = found?;
        self.position = index + 1;
        Some(record)
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find(&self, query: &QueryExpression) -> Result<RecordCursor, StoreError> {
        let faults = {
            let mut faults = self.faults.lock();
            let snapshot = *faults;
            faults.fail_after = None;
            snapshot
        };

        let state = CursorState {
            records: Arc::clone(&self.records),
            query: query.clone(),
            position: 0,
            yielded: 0,
            faults,
            _guard: CursorGuard::open(&self.open_cursors),
        };

        let cursor = stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            if let Some(delay) = state.faults.item_delay {
                tokio::time::sleep(delay).await;
            }
            if state.faults.fail_after == Some(state.yielded) {
                let err = StoreError::Backend("injected cursor failure".to_string());
                return Some((Err(err), None));
            }
            let record = state.next_match()?;
            state.yielded += 1;
            Some((Ok(record), Some(state)))
        });

        Ok(cursor.boxed())
    }

    async fn find_by_id(&self, id: &RecordId) -> Result<Option<RawRecord>, StoreError> {
        let records = self.records.read();
        Ok(records
            .iter()
            .find(|r| r.get("id").and_then(|v| v.as_str()) == Some(id.as_str()))
            .cloned())
    }

    async fn list_forbidden_extensions(&self) -> Result<ForbiddenExtensionSet, StoreError> {
        Ok(self.extensions.read().clone())
    }

    async fn insert_page(&self, page: &NewPage) -> Result<RecordId, StoreError> {
        let id = RecordId::generate();
        self.records.write().push(raw_page(&id, page));
        Ok(id)
    }

    async fn add_forbidden_extension(&self, extension: &str) -> Result<(), StoreError> {
        if let Some(ext) = normalize_extension(extension) {
            self.extensions.write().insert(ext);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_page(url: &str, title: &str) -> NewPage {
        NewPage {
            url: url.to_string(),
            title: title.to_string(),
            crawl_date: Utc::now(),
            content: format!("content of {url}"),
        }
    }

    #[tokio::test]
    async fn test_cursor_yields_in_insertion_order() {
        let repo = InMemoryRepository::new();
        for i in 0..5 {
            repo.insert_page(&new_page(&format!("http://{i}.onion"), "t"))
                .await
                .unwrap();
        }

        let cursor = repo.find(&QueryExpression::all()).await.unwrap();
        let urls: Vec<String> = cursor
            .map(|r| r.unwrap()["url"].as_str().unwrap().to_string())
            .collect()
            .await;
        assert_eq!(
            urls,
            (0..5).map(|i| format!("http://{i}.onion")).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_dropping_cursor_releases_it() {
        let repo = InMemoryRepository::new();
        repo.insert_page(&new_page("http://a.onion", "a")).await.unwrap();
        repo.insert_page(&new_page("http://b.onion", "b")).await.unwrap();

        let mut cursor = repo.find(&QueryExpression::all()).await.unwrap();
        assert_eq!(repo.open_cursors(), 1);
        cursor.next().await.unwrap().unwrap();
        drop(cursor);
        assert_eq!(repo.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let repo = InMemoryRepository::new();
        for i in 0..4 {
            repo.insert_page(&new_page(&format!("http://{i}.onion"), "t"))
                .await
                .unwrap();
        }

        repo.fail_next_cursor_after(2);
        let items: Vec<_> = repo
            .find(&QueryExpression::all())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 3);
        assert!(items[..2].iter().all(|r| r.is_ok()));
        assert!(items[2].is_err());

        let items: Vec<_> = repo
            .find(&QueryExpression::all())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 4);
        assert_eq!(repo.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_find_by_id_and_extensions() {
        let repo = InMemoryRepository::new();
        let id = repo.insert_page(&new_page("http://a.onion", "a")).await.unwrap();

        let raw = repo.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(raw["url"], "http://a.onion");
        assert!(repo
            .find_by_id(&RecordId::generate())
            .await
            .unwrap()
            .is_none());

        repo.add_forbidden_extension(".PNG").await.unwrap();
        repo.add_forbidden_extension("png").await.unwrap();
        repo.add_forbidden_extension("zip").await.unwrap();
        let exts: Vec<String> = repo
            .list_forbidden_extensions()
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(exts, vec!["png", "zip"]);
    }
}
