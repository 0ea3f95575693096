//! Run persistence boundary
//!
//! The pipeline reads the seen-key set once at the start of a run and hands
//! back only the keys it delivered. `RunStore` is the seam; `Repository`
//! implements it over PostgreSQL and `MemoryStore` in process.

use crate::errors::Result;
use crate::identity::SeenKeySet;
use crate::models::{ScoreReason, ScoredItem, Tier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Score breakdown of one candidate, kept for audit and replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub key: String,
    pub title: String,
    pub origin: String,
    pub score: f64,
    pub tier: Tier,
    pub reasons: Vec<ScoreReason>,
}

impl From<&ScoredItem> for ScoreRecord {
    fn from(scored: &ScoredItem) -> Self {
        Self {
            key: scored.key.clone(),
            title: scored.item.title.clone(),
            origin: scored.item.origin.clone(),
            score: scored.score.total(),
            tier: scored.tier,
            reasons: scored.score.reasons().to_vec(),
        }
    }
}

/// Final counters of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: String,
    pub total_items: usize,
    pub unseen_items: usize,
    pub selected_items: usize,
}

impl RunSummary {
    /// Status of a run that stopped on a storage error after it was opened
    pub const FAILED: &'static str = "failed";

    pub fn failed() -> Self {
        Self {
            status: Self::FAILED.to_string(),
            total_items: 0,
            unseen_items: 0,
            selected_items: 0,
        }
    }
}

/// Storage operations a run needs
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Keys delivered by all earlier runs
    async fn load_seen_keys(&self) -> Result<SeenKeySet>;

    /// Open a run record and return its id
    async fn create_run(&self, window_days: i64) -> Result<Uuid>;

    /// Persist the score breakdown of every candidate scored in the run
    async fn save_scores(&self, run_id: Uuid, records: &[ScoreRecord]) -> Result<()>;

    /// Mark delivered items as seen
    async fn append_seen_keys(&self, run_id: Uuid, delivered: &[ScoredItem]) -> Result<()>;

    /// Close the run record
    async fn complete_run(&self, run_id: Uuid, summary: &RunSummary) -> Result<()>;
}

/// A run as the in-memory store keeps it
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub id: Uuid,
    pub window_days: i64,
    pub started_at: DateTime<Utc>,
    pub summary: Option<RunSummary>,
}

#[derive(Default)]
struct MemoryState {
    seen: HashSet<String>,
    runs: Vec<RunRow>,
    scores: Vec<(Uuid, ScoreRecord)>,
}

/// In-process store for tests and offline replay
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from keys delivered previously
    pub fn with_seen<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: RwLock::new(MemoryState {
                seen: keys.into_iter().map(Into::into).collect(),
                ..MemoryState::default()
            }),
        }
    }

    pub async fn seen_keys(&self) -> SeenKeySet {
        self.state.read().await.seen.iter().cloned().collect()
    }

    pub async fn runs(&self) -> Vec<RunRow> {
        self.state.read().await.runs.clone()
    }

    pub async fn score_records(&self, run_id: Uuid) -> Vec<ScoreRecord> {
        self.state
            .read()
            .await
            .scores
            .iter()
            .filter(|(id, _)| *id == run_id)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn load_seen_keys(&self) -> Result<SeenKeySet> {
        Ok(self.seen_keys().await)
    }

    async fn create_run(&self, window_days: i64) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.state.write().await.runs.push(RunRow {
            id,
            window_days,
            started_at: Utc::now(),
            summary: None,
        });
        Ok(id)
    }

    async fn save_scores(&self, run_id: Uuid, records: &[ScoreRecord]) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .scores
            .extend(records.iter().cloned().map(|record| (run_id, record)));
        Ok(())
    }

    async fn append_seen_keys(&self, _run_id: Uuid, delivered: &[ScoredItem]) -> Result<()> {
        let mut state = self.state.write().await;
        state.seen.extend(delivered.iter().map(|s| s.key.clone()));
        Ok(())
    }

    async fn complete_run(&self, run_id: Uuid, summary: &RunSummary) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(run) = state.runs.iter_mut().find(|r| r.id == run_id) {
            run.summary = Some(summary.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Item, Score};

    fn scored(key: &str) -> ScoredItem {
        let mut score = Score::new();
        score.add("citation", 4.0, "2 citations");
        ScoredItem {
            item: Item::new("Title", "PubMed"),
            key: key.to_string(),
            score,
            tier: Tier::P2,
        }
    }

    #[test]
    fn test_memory_store_starts_empty() {
        let store = MemoryStore::new();
        let seen = tokio_test::block_on(store.load_seen_keys()).unwrap();
        assert!(seen.is_empty());
        assert!(tokio_test::block_on(store.runs()).is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::with_seen(["DOI:10.1/old"]);
        let run_id = store.create_run(1).await.unwrap();

        let delivered = vec![scored("DOI:10.1/new")];
        let records: Vec<ScoreRecord> = delivered.iter().map(ScoreRecord::from).collect();
        store.save_scores(run_id, &records).await.unwrap();
        store.append_seen_keys(run_id, &delivered).await.unwrap();
        store
            .complete_run(
                run_id,
                &RunSummary {
                    status: "selected".into(),
                    total_items: 1,
                    unseen_items: 1,
                    selected_items: 1,
                },
            )
            .await
            .unwrap();

        let seen = store.load_seen_keys().await.unwrap();
        assert!(seen.contains_str("DOI:10.1/old"));
        assert!(seen.contains_str("DOI:10.1/new"));

        let saved = store.score_records(run_id).await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].score, 4.0);

        let runs = store.runs().await;
        assert_eq!(runs[0].summary.as_ref().unwrap().status, "selected");
    }
}
