//! Concurrent fan-out over all registered adapters
//!
//! Every adapter runs in its own slot of a bounded pool. A failure, panic or
//! timeout in one adapter becomes that adapter's `SourceResult.error` and
//! never stops the others.

use crate::sources::{FetchContext, SourceAdapter};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use paperwatch_common::config::FetchConfig;
use paperwatch_common::errors::AppError;
use paperwatch_common::metrics::{record_source_fetch, FetchTimer};
use paperwatch_common::models::SourceResult;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub struct FetchOrchestrator {
    adapters: Vec<Box<dyn SourceAdapter>>,
    max_workers: usize,
    adapter_timeout: Duration,
}

impl FetchOrchestrator {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            adapters: Vec::new(),
            max_workers: config.max_workers,
            adapter_timeout: config.adapter_timeout(),
        }
    }

    pub fn register(&mut self, adapter: impl SourceAdapter + 'static) {
        self.adapters.push(Box::new(adapter));
    }

    pub fn with_adapter(mut self, adapter: impl SourceAdapter + 'static) -> Self {
        self.register(adapter);
        self
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Run every adapter to completion
    pub async fn fetch_all(&self, ctx: &FetchContext) -> Vec<SourceResult> {
        self.fetch_all_until(ctx, std::future::pending::<()>()).await
    }

    /// Run every adapter until done or until `cancel` resolves.
    ///
    /// Results come back in registration order. Adapters still in flight at
    /// cancellation are dropped and reported with a `cancelled` error.
    #[instrument(skip_all, fields(adapters = self.adapters.len()))]
    pub async fn fetch_all_until<C>(&self, ctx: &FetchContext, cancel: C) -> Vec<SourceResult>
    where
        C: Future<Output = ()>,
    {
        if self.adapters.is_empty() {
            warn!("No adapters registered");
            return Vec::new();
        }

        let workers = self.max_workers.clamp(1, self.adapters.len());
        let mut slots: Vec<Option<SourceResult>> = vec![None; self.adapters.len()];

        let pending = stream::iter(self.adapters.iter().enumerate())
            .map(|(index, adapter)| async move { (index, self.run_one(adapter.as_ref(), ctx).await) })
            .buffer_unordered(workers);
        tokio::pin!(pending);
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                biased;
                next = pending.next() => match next {
                    Some((index, result)) => slots[index] = Some(result),
                    None => break,
                },
                _ = &mut cancel => {
                    let remaining = slots.iter().filter(|s| s.is_none()).count();
                    warn!(remaining, "Fetch cancelled, abandoning in-flight adapters");
                    break;
                }
            }
        }

        let results: Vec<SourceResult> = slots
            .into_iter()
            .zip(&self.adapters)
            .map(|(slot, adapter)| {
                slot.unwrap_or_else(|| {
                    record_source_fetch(adapter.origin(), Duration::ZERO, 0, false);
                    SourceResult::failed(adapter.origin(), AppError::Cancelled.to_string())
                })
            })
            .collect();

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            total = results.len(),
            failed,
            items = results.iter().map(|r| r.items.len()).sum::<usize>(),
            "Fetch complete"
        );
        results
    }

    async fn run_one(&self, adapter: &dyn SourceAdapter, ctx: &FetchContext) -> SourceResult {
        let origin = adapter.origin().to_string();
        let timer = FetchTimer::start(&origin);

        let guarded = AssertUnwindSafe(adapter.fetch(ctx)).catch_unwind();
        let mut result = match tokio::time::timeout(self.adapter_timeout, guarded).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                let e = AppError::SourceFailed {
                    origin: origin.clone(),
                    message: format!("{:#}", e),
                };
                warn!(origin = %origin, error = %e, "Adapter failed");
                SourceResult::failed(&origin, e.to_string())
            }
            Ok(Err(panic)) => {
                let e = AppError::SourceFailed {
                    origin: origin.clone(),
                    message: format!("adapter panicked: {}", panic_message(panic.as_ref())),
                };
                error!(origin = %origin, error = %e, "Adapter panicked");
                SourceResult::failed(&origin, e.to_string())
            }
            Err(_) => {
                let e = AppError::SourceTimeout {
                    origin: origin.clone(),
                    timeout_ms: self.adapter_timeout.as_millis() as u64,
                };
                warn!(origin = %origin, error = %e, "Adapter timed out");
                SourceResult::failed(&origin, e.to_string())
            }
        };

        if result.origin.is_empty() {
            result.origin = origin;
        }
        if result.degraded {
            warn!(
                origin = %result.origin,
                reason = result.degraded_reason.as_deref().unwrap_or("unspecified"),
                "Adapter returned a degraded result"
            );
        }

        let latency = timer.finish(result.items.len(), result.is_success());
        result.latency.get_or_insert(latency);
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use paperwatch_common::identity::{KeyResolver, SeenKeySet};
    use paperwatch_common::models::Item;
    use paperwatch_common::retry::RetryPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeSource {
        origin: &'static str,
        delay: Duration,
        behavior: Behavior,
    }

    enum Behavior {
        Items(usize),
        Fail,
        Panic,
    }

    impl FakeSource {
        fn new(origin: &'static str, delay_ms: u64, behavior: Behavior) -> Self {
            Self {
                origin,
                delay: Duration::from_millis(delay_ms),
                behavior,
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeSource {
        fn origin(&self) -> &str {
            self.origin
        }

        async fn fetch(&self, _ctx: &FetchContext) -> anyhow::Result<SourceResult> {
            tokio::time::sleep(self.delay).await;
            match self.behavior {
                Behavior::Items(n) => {
                    let items = (0..n)
                        .map(|i| Item::new(format!("{} paper {}", self.origin, i), self.origin))
                        .collect();
                    Ok(SourceResult::ok(self.origin, items))
                }
                Behavior::Fail => anyhow::bail!("connection reset"),
                Behavior::Panic => panic!("parser bug"),
            }
        }
    }

    struct CountingSource {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SourceAdapter for CountingSource {
        fn origin(&self) -> &str {
            "counting"
        }

        async fn fetch(&self, _ctx: &FetchContext) -> anyhow::Result<SourceResult> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(SourceResult::ok("counting", vec![]))
        }
    }

    fn ctx() -> FetchContext {
        FetchContext {
            seen: Arc::new(SeenKeySet::new()),
            exclusion: Arc::from(Vec::<String>::new()),
            resolver: KeyResolver::default(),
            window_days: 1,
            today: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            retry: RetryPolicy::default(),
        }
    }

    fn config(max_workers: usize, timeout_secs: u64) -> FetchConfig {
        FetchConfig {
            max_workers,
            adapter_timeout_secs: timeout_secs,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let orchestrator = FetchOrchestrator::new(&config(4, 5))
            .with_adapter(FakeSource::new("PubMed", 5, Behavior::Items(2)))
            .with_adapter(FakeSource::new("arXiv", 1, Behavior::Fail))
            .with_adapter(FakeSource::new("bioRxiv", 1, Behavior::Panic))
            .with_adapter(FakeSource::new("rss_topjournal", 1, Behavior::Items(1)));

        let results = orchestrator.fetch_all(&ctx()).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].items.len(), 2);
        assert_eq!(results[1].error.as_deref(), Some("Source arXiv failed: connection reset"));
        assert!(results[2].error.as_deref().unwrap().contains("parser bug"));
        assert!(results[3].is_success());
        assert!(results.iter().all(|r| r.latency.is_some()));
    }

    #[tokio::test]
    async fn test_results_keep_registration_order() {
        let orchestrator = FetchOrchestrator::new(&config(3, 5))
            .with_adapter(FakeSource::new("slow", 30, Behavior::Items(1)))
            .with_adapter(FakeSource::new("medium", 15, Behavior::Items(1)))
            .with_adapter(FakeSource::new("fast", 1, Behavior::Items(1)));

        let results = orchestrator.fetch_all(&ctx()).await;
        let origins: Vec<&str> = results.iter().map(|r| r.origin.as_str()).collect();
        assert_eq!(origins, vec!["slow", "medium", "fast"]);
    }

    #[tokio::test]
    async fn test_guard_timeout_records_error() {
        let orchestrator = FetchOrchestrator {
            adapters: Vec::new(),
            max_workers: 2,
            adapter_timeout: Duration::from_millis(20),
        }
        .with_adapter(FakeSource::new("hung", 5_000, Behavior::Items(1)))
        .with_adapter(FakeSource::new("quick", 1, Behavior::Items(1)));

        let results = orchestrator.fetch_all(&ctx()).await;
        assert!(results[0].error.as_deref().unwrap().contains("timed out"));
        assert!(results[1].is_success());
    }

    #[tokio::test]
    async fn test_cancel_keeps_completed_results() {
        let orchestrator = FetchOrchestrator::new(&config(2, 60))
            .with_adapter(FakeSource::new("quick", 1, Behavior::Items(3)))
            .with_adapter(FakeSource::new("stuck", 10_000, Behavior::Items(1)));

        let cancel = tokio::time::sleep(Duration::from_millis(50));
        let results = orchestrator.fetch_all_until(&ctx(), cancel).await;

        assert_eq!(results[0].items.len(), 3);
        assert_eq!(results[1].error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_worker_bound_is_respected() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut orchestrator = FetchOrchestrator::new(&config(2, 5));
        for _ in 0..6 {
            orchestrator.register(CountingSource {
                active: active.clone(),
                peak: peak.clone(),
            });
        }

        let results = orchestrator.fetch_all(&ctx()).await;
        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_no_adapters_yields_no_results() {
        let orchestrator = FetchOrchestrator::new(&FetchConfig::default());
        assert!(orchestrator.is_empty());
        assert!(orchestrator.fetch_all(&ctx()).await.is_empty());
    }
}
