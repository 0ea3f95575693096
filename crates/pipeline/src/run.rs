//! One batch run: fetch, filter, rank, persist

use crate::filter::{FilterStats, ItemFilter};
use crate::orchestrator::FetchOrchestrator;
use crate::ranking::{RankStats, Ranker};
use crate::scoring::ScoringEngine;
use crate::sources::{FetchContext, SourceAdapter};
use chrono::NaiveDate;
use paperwatch_common::config::PipelineConfig;
use paperwatch_common::errors::Result;
use paperwatch_common::identity::{KeyResolver, SeenKeySet};
use paperwatch_common::metrics::record_run;
use paperwatch_common::models::{ScoredItem, SourceResult};
use paperwatch_common::retry::RetryPolicy;
use paperwatch_common::store::{RunStore, RunSummary, ScoreRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// How a run ended. An empty selection always says why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Selected,
    /// Nothing fetched, or everything fetched was already seen or duplicated
    NoNewItems,
    /// Items were fetched but none passed filtering
    AllFiltered,
    /// Every adapter errored, or none were registered
    AllSourcesFailed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Selected => "selected",
            RunStatus::NoNewItems => "no_new_items",
            RunStatus::AllFiltered => "all_filtered",
            RunStatus::AllSourcesFailed => "all_sources_failed",
        }
    }

    fn classify(sources: &[SourceReport], filter: &FilterStats, selected: usize) -> Self {
        if sources.iter().all(|s| s.error.is_some()) {
            return RunStatus::AllSourcesFailed;
        }
        if selected > 0 {
            return RunStatus::Selected;
        }
        let fetched: usize = sources.iter().map(|s| s.fetched).sum();
        if fetched > 0 && filter.kept == 0 {
            RunStatus::AllFiltered
        } else {
            RunStatus::NoNewItems
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-adapter outcome, kept for observability even when the adapter failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub origin: String,
    /// Items returned before filtering
    pub fetched: usize,
    pub error: Option<String>,
    pub degraded: bool,
    pub degraded_reason: Option<String>,
    pub latency_ms: Option<u64>,
    pub filter: FilterStats,
}

impl SourceReport {
    fn new(result: &SourceResult, fetched: usize, filter: FilterStats) -> Self {
        Self {
            origin: result.origin.clone(),
            fetched,
            error: result.error.clone(),
            degraded: result.degraded,
            degraded_reason: result.degraded_reason.clone(),
            latency_ms: result.latency.map(|d| d.as_millis() as u64),
            filter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub today: NaiveDate,
    pub selection: Vec<ScoredItem>,
    pub new_keys: Vec<String>,
    pub sources: Vec<SourceReport>,
    pub filter: FilterStats,
    pub rank: RankStats,
    /// Candidates that survived deduplication
    pub candidates: usize,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            status: self.status.as_str().to_string(),
            total_items: self.sources.iter().map(|s| s.fetched).sum(),
            unseen_items: self.candidates,
            selected_items: self.selection.len(),
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    orchestrator: FetchOrchestrator,
    store: Arc<dyn RunStore>,
}

impl Pipeline {
    /// Validates the configuration; an invalid one never reaches a fetch
    pub fn new(config: PipelineConfig, store: Arc<dyn RunStore>) -> Result<Self> {
        config.validate()?;
        let orchestrator = FetchOrchestrator::new(&config.fetch);
        Ok(Self {
            config,
            orchestrator,
            store,
        })
    }

    pub fn register(&mut self, adapter: impl SourceAdapter + 'static) {
        self.orchestrator.register(adapter);
    }

    pub fn with_adapter(mut self, adapter: impl SourceAdapter + 'static) -> Self {
        self.register(adapter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, today: NaiveDate) -> Result<RunReport> {
        self.run_until(today, std::future::pending::<()>()).await
    }

    /// Run once against `today`. If `cancel` resolves mid-fetch, ranking
    /// proceeds over whatever adapters already finished.
    ///
    /// A storage error after the run record is opened closes it as failed
    /// before the error is returned.
    #[instrument(skip(self, cancel), fields(today = %today))]
    pub async fn run_until<C>(&self, today: NaiveDate, cancel: C) -> Result<RunReport>
    where
        C: Future<Output = ()>,
    {
        let filter = ItemFilter::new(&self.config, today)?;
        let scoring = ScoringEngine::new(&self.config.scoring, today);

        let seen = Arc::new(self.store.load_seen_keys().await?);
        let run_id = self.store.create_run(self.config.filter.window_days).await?;
        info!(run_id = %run_id, seen = seen.len(), adapters = self.orchestrator.len(), "Run started");

        match self.execute(run_id, today, seen, filter, scoring, cancel).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Run failed");
                if let Err(close) = self.store.complete_run(run_id, &RunSummary::failed()).await {
                    warn!(run_id = %run_id, error = %close, "Could not mark run as failed");
                }
                record_run(RunSummary::FAILED);
                Err(e)
            }
        }
    }

    async fn execute<C>(
        &self,
        run_id: Uuid,
        today: NaiveDate,
        seen: Arc<SeenKeySet>,
        filter: ItemFilter,
        scoring: ScoringEngine,
        cancel: C,
    ) -> Result<RunReport>
    where
        C: Future<Output = ()>,
    {
        let resolver = KeyResolver::new(&self.config.dedup);
        let ctx = FetchContext {
            seen: seen.clone(),
            exclusion: Arc::from(self.config.vocabulary.exclusion.clone()),
            resolver,
            window_days: self.config.filter.window_days,
            today,
            retry: RetryPolicy::from(&self.config.fetch.retry),
        };

        let results = self.orchestrator.fetch_all_until(&ctx, cancel).await;

        let mut totals = FilterStats::default();
        let mut sources = Vec::with_capacity(results.len());
        let mut filtered = Vec::with_capacity(results.len());
        for result in results {
            let fetched = result.items.len();
            let (result, stats) = filter.apply(result);
            totals.merge(&stats);
            sources.push(SourceReport::new(&result, fetched, stats));
            filtered.push(result);
        }

        let ranker = Ranker::new(resolver, scoring, self.config.selection.clone());
        let selection = ranker.rank_and_select(&filtered, &seen, self.config.selection.target_k);

        let status = RunStatus::classify(&sources, &totals, selection.selected.len());
        if status == RunStatus::AllSourcesFailed {
            warn!(run_id = %run_id, sources = sources.len(), "All sources failed");
        }

        let records: Vec<ScoreRecord> = selection.candidates.iter().map(ScoreRecord::from).collect();
        self.store.save_scores(run_id, &records).await?;
        self.store.append_seen_keys(run_id, &selection.selected).await?;

        let report = RunReport {
            run_id,
            status,
            today,
            candidates: selection.candidates.len(),
            selection: selection.selected,
            new_keys: selection.new_keys,
            sources,
            filter: totals,
            rank: selection.stats,
        };

        self.store.complete_run(run_id, &report.summary()).await?;
        record_run(status.as_str());
        info!(
            run_id = %run_id,
            status = %status,
            selected = report.selection.len(),
            "Run finished"
        );

        Ok(report)
    }
}
