//! Source adapter seam
//!
//! One adapter per feed. Wire parsing and pagination live behind this trait;
//! the pipeline only sees `SourceResult`s.

use async_trait::async_trait;
use chrono::NaiveDate;
use paperwatch_common::identity::{KeyResolver, SeenKeySet};
use paperwatch_common::models::SourceResult;
use paperwatch_common::retry::RetryPolicy;
use std::sync::Arc;

/// Read-only inputs shared by every adapter in a run
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// Keys delivered by earlier runs, for adapters that self-filter
    pub seen: Arc<SeenKeySet>,
    pub exclusion: Arc<[String]>,
    pub resolver: KeyResolver,
    pub window_days: i64,
    /// Reference date of the run
    pub today: NaiveDate,
    /// Budget each adapter applies through `retry_with_backoff`
    pub retry: RetryPolicy,
}

/// A feed the orchestrator can fan out to
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Label stamped on every item the adapter returns
    fn origin(&self) -> &str;

    /// Fetch one window of items. An `Err` is recorded as the adapter's
    /// failure; partial failures belong in `SourceResult::degraded`.
    async fn fetch(&self, ctx: &FetchContext) -> anyhow::Result<SourceResult>;
}

/// Plays back a result captured from an earlier run
#[derive(Debug, Clone)]
pub struct RecordedSource {
    result: SourceResult,
}

impl RecordedSource {
    pub fn new(result: SourceResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl SourceAdapter for RecordedSource {
    fn origin(&self) -> &str {
        &self.result.origin
    }

    async fn fetch(&self, _ctx: &FetchContext) -> anyhow::Result<SourceResult> {
        Ok(self.result.clone())
    }
}
