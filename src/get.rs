//! Page retrieval by id.
//!
//! Used by `cq get`, `GET /pages/{id}/content`, and the session's
//! `get-content` command. A single bounded fetch that returns the full
//! record, content included.

use std::time::Duration;

use anyhow::Result;

use crate::engine::QueryEngine;
use crate::error::QueryError;
use crate::models::{RecordId, ResourceRecord};
use crate::store::{with_deadline, Repository};

/// Fetches one record by id.
///
/// Fails with [`QueryError::InvalidId`] before touching the store when `id`
/// is not a valid identifier, and with [`QueryError::NotFound`] when no
/// record has it.
pub async fn get_by_id(
    repo: &dyn Repository,
    id: &str,
    deadline: Duration,
) -> Result<ResourceRecord, QueryError> {
    let id = RecordId::parse(id)?;

    let raw = with_deadline(deadline, repo.find_by_id(&id))
        .await?
        .ok_or_else(|| QueryError::NotFound(id.clone()))?;

    Ok(ResourceRecord::decode(raw)?)
}

/// CLI entry point for `cq get <id>`.
pub async fn run_get(engine: &QueryEngine, id: &str) -> Result<()> {
    let record = engine.get_by_id(id).await?;

    println!("--- Page ---");
    println!("id:         {}", record.id);
    println!(
        "title:      {}",
        if record.title.is_empty() {
            "(untitled)"
        } else {
            &record.title
        }
    );
    println!("url:        {}", record.url);
    println!("crawl_date: {}", record.crawl_date.to_rfc3339());
    println!();

    println!("--- Content ({} bytes) ---", record.content.len());
    println!("{}", record.content);

    Ok(())
}
