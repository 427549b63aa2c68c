//! Translates a `(url filter, text pattern)` pair into a [`QueryExpression`].
//!
//! # Matching
//!
//! A record matches when
//!
//! ```text
//! (url filter absent OR record.url == url filter)
//!   AND (pattern empty OR pattern ~ title OR pattern ~ content)
//! ```
//!
//! The URL condition is always a top-level conjunct. It never sits inside the
//! title/content disjunction. The pattern is a case-insensitive regular
//! expression, so a plain word behaves as a substring search.

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::error::QueryError;
use crate::store::RawRecord;

/// Fields the text pattern is tested against.
const TEXT_FIELDS: [&str; 2] = ["title", "content"];

/// A compiled, store-agnostic search condition.
#[derive(Debug, Clone)]
pub struct QueryExpression {
    url: Option<String>,
    text: Option<Regex>,
}

/// Builds a query expression.
///
/// An empty or absent `url_filter` and an empty `text_pattern` each mean "no
/// constraint". A pattern that fails to compile is an
/// [`QueryError::InvalidQuery`]. It is never downgraded to "no filter".
pub fn build(url_filter: Option<&str>, text_pattern: &str) -> Result<QueryExpression, QueryError> {
    let url = url_filter.filter(|u| !u.is_empty()).map(str::to_string);

    let text = if text_pattern.is_empty() {
        None
    } else {
        Some(
            RegexBuilder::new(text_pattern)
                .case_insensitive(true)
                .build()?,
        )
    };

    Ok(QueryExpression { url, text })
}

impl QueryExpression {
    /// Matches every record.
    pub fn all() -> Self {
        Self {
            url: None,
            text: None,
        }
    }

    /// The exact-match URL constraint, for stores that can push it down.
    pub fn url_filter(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn text_pattern(&self) -> Option<&Regex> {
        self.text.as_ref()
    }

    /// Evaluates the full expression against a raw store document.
    ///
    /// Fields that are missing or not strings never match.
    pub fn matches(&self, record: &RawRecord) -> bool {
        self.matches_url(record) && self.matches_text(record)
    }

    fn matches_url(&self, record: &RawRecord) -> bool {
        match &self.url {
            None => true,
            Some(url) => record.get("url").and_then(Value::as_str) == Some(url.as_str()),
        }
    }

    fn matches_text(&self, record: &RawRecord) -> bool {
        match &self.text {
            None => true,
            Some(re) => TEXT_FIELDS.iter().any(|field| {
                record
                    .get(*field)
                    .and_then(Value::as_str)
                    .is_some_and(|text| re.is_match(text))
            }),
        }
    }
}
