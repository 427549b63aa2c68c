//! Lazy result streams over a repository query.
//!
//! [`search`] opens one repository cursor and wraps it in a [`ResultStream`]
//! that decodes records one at a time as the cursor advances. Nothing is
//! buffered beyond the record being yielded.
//!
//! # Failure policy
//!
//! - A record that fails to decode is logged and skipped. The stream
//!   continues.
//! - A cursor failure, or a cursor step exceeding the deadline, ends the
//!   stream with [`QueryError::StoreIteration`]. Records already yielded stay
//!   valid.
//!
//! The cursor is owned by the stream and dropped on every exit path: after
//! exhaustion, right after a terminal error, or when the consumer drops the
//! stream early.

use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{error, warn};

use crate::engine::QueryEngine;
use crate::error::QueryError;
use crate::models::{ResourceRecord, SearchResultItem};
use crate::query::QueryExpression;
use crate::store::{with_deadline, RecordCursor, Repository};

/// Finite, single-pass sequence of matching records in store order.
pub type ResultStream = BoxStream<'static, Result<ResourceRecord, QueryError>>;

/// Runs `query` against `repo` and returns the lazy match stream.
///
/// Each call issues a new repository query. `deadline` bounds opening the
/// cursor and every individual cursor step.
pub async fn search(
    repo: &dyn Repository,
    query: &QueryExpression,
    deadline: Duration,
) -> Result<ResultStream, QueryError> {
    let cursor = with_deadline(deadline, repo.find(query)).await?;
    Ok(decode_cursor(cursor, deadline))
}

/// Wraps a raw cursor into a decoding [`ResultStream`].
pub fn decode_cursor(cursor: RecordCursor, deadline: Duration) -> ResultStream {
    stream::unfold(Some(cursor), move |cursor| async move {
        let mut cursor = cursor?;
        loop {
            let next = match with_deadline(deadline, async { Ok(cursor.next().await) }).await {
                Ok(next) => next,
                Err(e) => {
                    error!(error = %e, "cursor step exceeded deadline");
                    return Some((Err(QueryError::StoreIteration(e)), None));
                }
            };

            match next {
                None => return None,
                Some(Err(e)) => {
                    error!(error = %e, "cursor failed mid-stream");
                    return Some((Err(QueryError::StoreIteration(e)), None));
                }
                Some(Ok(raw)) => match ResourceRecord::decode(raw) {
                    Ok(record) => return Some((Ok(record), Some(cursor))),
                    Err(e) => {
                        warn!(id = %e.id, reason = %e.reason, "skipping undecodable record");
                    }
                },
            }
        }
    })
    .boxed()
}

/// Outcome of [`drain_to_list`].
#[derive(Debug, Clone, Default)]
pub struct Drained {
    pub items: Vec<SearchResultItem>,
    /// More matches existed beyond the ceiling and were not read.
    pub truncated: bool,
}

/// Collects a stream into a list of at most `max_results` items.
///
/// Reading stops at the first match past the ceiling, and the cursor is
/// released. Any error before that point is returned as-is. There are no
/// partial lists on failure.
pub async fn drain_to_list(
    mut results: ResultStream,
    max_results: usize,
) -> Result<Drained, QueryError> {
    let mut items = Vec::new();
    while let Some(record) = results.next().await {
        let record = record?;
        if items.len() >= max_results {
            warn!(max_results, "result ceiling reached, truncating list");
            return Ok(Drained {
                items,
                truncated: true,
            });
        }
        items.push(SearchResultItem::from(record));
    }
    Ok(Drained {
        items,
        truncated: false,
    })
}

/// Counts the matches in a stream without keeping them.
pub async fn count(mut results: ResultStream) -> Result<u64, QueryError> {
    let mut total = 0;
    while let Some(record) = results.next().await {
        record?;
        total += 1;
    }
    Ok(total)
}

/// CLI entry point: prints matches as they stream in.
pub async fn run_search(
    engine: &QueryEngine,
    pattern: &str,
    url: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let mut results = engine.search(url, pattern).await?;

    let mut shown = 0usize;
    while let Some(record) = results.next().await {
        let record = record?;
        let title = if record.title.is_empty() {
            "(untitled)"
        } else {
            record.title.as_str()
        };

        println!("{}. {}", shown + 1, title);
        println!("    url: {}", record.url);
        println!("    crawled: {}", record.crawl_date.to_rfc3339());
        println!("    id: {}", record.id);
        println!();

        shown += 1;
        if limit.is_some_and(|l| shown >= l) {
            break;
        }
    }

    if shown == 0 {
        println!("No results.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::NewPage;
    use crate::query;
    use crate::store::memory::InMemoryRepository;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    const DEADLINE: Duration = Duration::from_secs(5);

    fn page(i: usize, url: &str, title: &str, content: &str) -> NewPage {
        NewPage {
            url: url.to_string(),
            title: title.to_string(),
            crawl_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, i as u32).unwrap(),
            content: content.to_string(),
        }
    }

    async fn seeded(n: usize) -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        for i in 0..n {
            repo.insert_page(&page(
                i,
                &format!("http://site{}.onion", i % 3),
                &format!("Page {i}"),
                &format!("body number {i}"),
            ))
            .await
            .unwrap();
        }
        repo
    }

    async fn collect_ok(
        repo: &InMemoryRepository,
        url: Option<&str>,
        pattern: &str,
    ) -> Vec<ResourceRecord> {
        let q = query::build(url, pattern).unwrap();
        search(repo, &q, DEADLINE)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_empty_query_yields_every_record_once() {
        let repo = seeded(25).await;
        let records = collect_ok(&repo, None, "").await;

        assert_eq!(records.len(), 25);
        let titles: Vec<String> = records.iter().map(|r| r.title.clone()).collect();
        let expected: Vec<String> = (0..25).map(|i| format!("Page {i}")).collect();
        assert_eq!(titles, expected);
    }

    #[tokio::test]
    async fn test_any_substring_finds_its_record() {
        let repo = seeded(12).await;
        for record in collect_ok(&repo, None, "").await {
            for needle in [&record.title[1..4], &record.content[2..9]] {
                let upper = needle.to_uppercase();
                let found = collect_ok(&repo, None, &upper).await;
                assert!(
                    found.iter().any(|r| r.id == record.id),
                    "{needle:?} did not find {}",
                    record.id
                );
            }
        }
    }

    #[tokio::test]
    async fn test_url_filter_excludes_other_urls_even_when_text_matches() {
        let repo = seeded(9).await;
        let records = collect_ok(&repo, Some("http://site1.onion"), "page").await;

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.url == "http://site1.onion"));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped_in_order() {
        let repo = InMemoryRepository::new();
        for i in 0..10 {
            if i == 5 {
                let corrupt = json!({
                    "id": "not-a-uuid",
                    "url": "http://broken.onion",
                    "title": 17,
                    "crawlDate": "sometime",
                    "content": "body",
                });
                repo.insert_raw(corrupt.as_object().unwrap().clone());
            } else {
                repo.insert_page(&page(i, "http://a.onion", &format!("t{i}"), "body"))
                    .await
                    .unwrap();
            }
        }

        let results: Vec<_> = search(&repo, &query::build(None, "body").unwrap(), DEADLINE)
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(results.len(), 9);
        let titles: Vec<String> = results.into_iter().map(|r| r.unwrap().title).collect();
        assert_eq!(
            titles,
            vec!["t0", "t1", "t2", "t3", "t4", "t6", "t7", "t8", "t9"]
        );
    }

    #[tokio::test]
    async fn test_cursor_failure_ends_stream_and_keeps_prior_items() {
        let repo = seeded(10).await;
        repo.fail_next_cursor_after(3);

        let results: Vec<_> = search(&repo, &QueryExpression::all(), DEADLINE)
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(results.len(), 4);
        assert!(results[..3].iter().all(|r| r.is_ok()));
        assert!(matches!(
            results[3],
            Err(QueryError::StoreIteration(StoreError::Backend(_)))
        ));
        assert_eq!(repo.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_slow_cursor_step_times_out() {
        let repo = seeded(3).await;
        repo.set_item_delay(Some(Duration::from_millis(300)));

        let mut results = search(&repo, &QueryExpression::all(), Duration::from_millis(50))
            .await
            .unwrap();
        let first = results.next().await.unwrap();
        assert_eq!(first.unwrap_err().code(), "timeout");
        assert!(results.next().await.is_none());
        drop(results);
        assert_eq!(repo.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_early_drop_releases_cursor() {
        let repo = seeded(10).await;
        let mut results = search(&repo, &QueryExpression::all(), DEADLINE)
            .await
            .unwrap();
        results.next().await.unwrap().unwrap();
        assert_eq!(repo.open_cursors(), 1);
        drop(results);
        assert_eq!(repo.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_drain_respects_ceiling() {
        let repo = seeded(10).await;

        let stream = search(&repo, &QueryExpression::all(), DEADLINE).await.unwrap();
        let drained = drain_to_list(stream, 4).await.unwrap();
        assert_eq!(drained.items.len(), 4);
        assert!(drained.truncated);
        assert_eq!(repo.open_cursors(), 0);

        let stream = search(&repo, &QueryExpression::all(), DEADLINE).await.unwrap();
        let drained = drain_to_list(stream, 10).await.unwrap();
        assert_eq!(drained.items.len(), 10);
        assert!(!drained.truncated);
    }

    #[tokio::test]
    async fn test_drain_surfaces_cursor_failure() {
        let repo = seeded(10).await;
        repo.fail_next_cursor_after(2);

        let stream = search(&repo, &QueryExpression::all(), DEADLINE).await.unwrap();
        let err = drain_to_list(stream, 100).await.unwrap_err();
        assert_eq!(err.code(), "store_error");
    }

    #[tokio::test]
    async fn test_count() {
        let repo = seeded(9).await;
        let q = query::build(Some("http://site2.onion"), "").unwrap();
        let stream = search(&repo, &q, DEADLINE).await.unwrap();
        assert_eq!(count(stream).await.unwrap(), 3);
    }
}
