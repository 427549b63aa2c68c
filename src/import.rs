//! Bulk import of crawled pages from a JSON Lines file.
//!
//! Each non-blank line is one page:
//!
//! ```json
//! {"url": "http://example.onion", "title": "Example", "crawlDate": "2024-01-01T00:00:00Z", "content": "<html>..</html>"}
//! ```
//!
//! The whole file is validated before anything is written, so a bad line
//! never leaves a partial import behind.

use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::NewPage;
use crate::store::Repository;

/// Parses JSON Lines into pages. Blank lines are skipped.
pub fn parse_pages(reader: impl BufRead) -> Result<Vec<NewPage>> {
    let mut pages = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let page: NewPage = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid page", index + 1))?;
        pages.push(page);
    }
    Ok(pages)
}

/// CLI entry point for `cq import <file>`.
pub async fn run_import(repo: &dyn Repository, path: &Path) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open import file: {}", path.display()))?;
    let pages = parse_pages(std::io::BufReader::new(file))?;

    for page in &pages {
        let id = repo.insert_page(page).await?;
        println!("{}  {}", id, page.url);
    }

    info!(count = pages.len(), file = %path.display(), "import finished");
    println!("Imported {} pages.", pages.len());
    Ok(())
}
