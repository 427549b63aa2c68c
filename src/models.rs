//! Core data models for crawled pages.
//!
//! A [`ResourceRecord`] is the full stored page. Search results are
//! projected to [`SearchResultItem`], which leaves the page body out so list
//! responses stay small.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, RecordDecodeError};
use crate::store::RawRecord;

/// Store-assigned page identifier (a hyphenated lowercase UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Parses a caller-supplied identifier.
    ///
    /// Any UUID form accepted by [`uuid::Uuid::parse_str`] is normalized to
    /// the hyphenated lowercase form the store uses.
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        uuid::Uuid::parse_str(raw)
            .map(|uuid| Self(uuid.hyphenated().to_string()))
            .map_err(|e| QueryError::InvalidId {
                id: raw.to_string(),
                reason: e.to_string(),
            })
    }

    /// Generates a fresh identifier for a new page.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().hyphenated().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RecordId {
    type Error = QueryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// A crawled page as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub id: RecordId,
    /// Not unique: a revisit stores another record for the same URL.
    pub url: String,
    pub title: String,
    pub crawl_date: DateTime<Utc>,
    pub content: String,
}

/// Field layout of a raw stored page.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPage {
    id: RecordId,
    url: String,
    #[serde(default)]
    title: Option<String>,
    crawl_date: DateTime<Utc>,
    content: String,
}

impl ResourceRecord {
    /// Decodes a raw store document.
    ///
    /// A missing or null title decodes as empty; every other field is
    /// required and must have the right type.
    pub fn decode(raw: RawRecord) -> Result<Self, RecordDecodeError> {
        let id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("<missing id>")
            .to_string();

        let page: StoredPage =
            serde_json::from_value(serde_json::Value::Object(raw)).map_err(|e| {
                RecordDecodeError {
                    id,
                    reason: e.to_string(),
                }
            })?;

        Ok(Self {
            id: page.id,
            url: page.url,
            title: page.title.unwrap_or_default(),
            crawl_date: page.crawl_date,
            content: page.content,
        })
    }
}

/// List projection of a [`ResourceRecord`]. This is also the wire shape of a
/// search result on every surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub id: RecordId,
    pub url: String,
    pub title: String,
    pub crawl_date: DateTime<Utc>,
}

impl From<&ResourceRecord> for SearchResultItem {
    fn from(record: &ResourceRecord) -> Self {
        Self {
            id: record.id.clone(),
            url: record.url.clone(),
            title: record.title.clone(),
            crawl_date: record.crawl_date,
        }
    }
}

impl From<ResourceRecord> for SearchResultItem {
    fn from(record: ResourceRecord) -> Self {
        Self {
            id: record.id,
            url: record.url,
            title: record.title,
            crawl_date: record.crawl_date,
        }
    }
}

/// A page to be written by tooling (`cq import`, tests). The store assigns
/// the id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPage {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub crawl_date: DateTime<Utc>,
    pub content: String,
}

/// Lowercase file extensions the crawler must skip.
pub type ForbiddenExtensionSet = BTreeSet<String>;

/// Normalizes an extension to the stored form: trimmed, no leading dot,
/// lowercase. Returns `None` for an empty extension.
pub fn normalize_extension(extension: &str) -> Option<String> {
    let ext = extension.trim().trim_start_matches('.').to_lowercase();
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}
