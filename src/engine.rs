//! The query facade shared by the HTTP handlers, the WebSocket sessions,
//! and the CLI.
//!
//! A [`QueryEngine`] owns the one injected repository handle and the
//! per-operation deadline. Cloning it is cheap, and every clone talks to the
//! same repository.

use std::time::Duration;

use crate::config::Config;
use crate::error::QueryError;
use crate::get;
use crate::models::{ForbiddenExtensionSet, ResourceRecord};
use crate::query;
use crate::search::{self, Drained, ResultStream};
use crate::store::{with_deadline, SharedRepository};

#[derive(Clone)]
pub struct QueryEngine {
    repo: SharedRepository,
    deadline: Duration,
}

impl QueryEngine {
    pub fn new(repo: SharedRepository, deadline: Duration) -> Self {
        Self { repo, deadline }
    }

    pub fn from_config(repo: SharedRepository, config: &Config) -> Self {
        Self::new(repo, config.store.deadline())
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.repo
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Builds the query and opens a lazy stream of matches.
    pub async fn search(
        &self,
        url_filter: Option<&str>,
        text_pattern: &str,
    ) -> Result<ResultStream, QueryError> {
        let query = query::build(url_filter, text_pattern)?;
        search::search(self.repo.as_ref(), &query, self.deadline).await
    }

    /// Searches and drains the matches into a list capped at `max_results`.
    pub async fn collect(
        &self,
        url_filter: Option<&str>,
        text_pattern: &str,
        max_results: usize,
    ) -> Result<Drained, QueryError> {
        let results = self.search(url_filter, text_pattern).await?;
        search::drain_to_list(results, max_results).await
    }

    pub async fn count(
        &self,
        url_filter: Option<&str>,
        text_pattern: &str,
    ) -> Result<u64, QueryError> {
        let results = self.search(url_filter, text_pattern).await?;
        search::count(results).await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<ResourceRecord, QueryError> {
        get::get_by_id(self.repo.as_ref(), id, self.deadline).await
    }

    pub async fn list_forbidden_extensions(&self) -> Result<ForbiddenExtensionSet, QueryError> {
        Ok(with_deadline(self.deadline, self.repo.list_forbidden_extensions()).await?)
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

