//! Typed errors for the query core.
//!
//! Application plumbing (config, CLI, migrations) uses `anyhow`; everything a
//! caller has to branch on goes through these enums instead.

use std::time::Duration;

use thiserror::Error;

use crate::models::RecordId;

/// Failure reported by a [`Repository`](crate::store::Repository).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Backend fault with no underlying driver error.
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// A single stored record that does not decode into a
/// [`ResourceRecord`](crate::models::ResourceRecord).
///
/// Never fatal to a search: the stream logs it and moves on.
#[derive(Debug, Clone, Error)]
#[error("record {id} could not be decoded: {reason}")]
pub struct RecordDecodeError {
    pub id: String,
    pub reason: String,
}

/// Errors surfaced to the caller of a search or content lookup.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query pattern: {0}")]
    InvalidQuery(#[from] regex::Error),

    #[error("invalid id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("page not found: {0}")]
    NotFound(RecordId),

    /// The cursor failed after the stream started. Items already yielded
    /// stay valid.
    #[error("store iteration failed: {0}")]
    StoreIteration(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] RecordDecodeError),
}

impl QueryError {
    /// Machine-readable code shared by the HTTP error body and the session
    /// error frame.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "invalid_query",
            Self::InvalidId { .. } => "invalid_id",
            Self::NotFound(_) => "not_found",
            Self::StoreIteration(StoreError::Timeout(_)) | Self::Store(StoreError::Timeout(_)) => {
                "timeout"
            }
            Self::StoreIteration(_) | Self::Store(_) | Self::Decode(_) => "store_error",
        }
    }
}
