//! Repository pattern for database operations
//!
//! PostgreSQL implementation of `RunStore`.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::identity::SeenKeySet;
use crate::models::ScoredItem;
use crate::store::{RunStore, RunSummary, ScoreRecord};
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QuerySelect, Set};
use tracing::{debug, info};
use uuid::Uuid;

/// Repository for data access operations
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

#[async_trait]
impl RunStore for Repository {
    async fn load_seen_keys(&self) -> Result<SeenKeySet> {
        let keys: Vec<String> = SentItemEntity::find()
            .select_only()
            .column(SentItemColumn::Key)
            .into_tuple()
            .all(self.read_conn())
            .await?;

        debug!(count = keys.len(), "Loaded seen keys");
        Ok(keys.into_iter().collect())
    }

    async fn create_run(&self, window_days: i64) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let run = RunActiveModel {
            id: Set(id),
            window_days: Set(window_days),
            status: Set(None),
            total_items: Set(0),
            unseen_items: Set(0),
            selected_items: Set(0),
            started_at: Set(chrono::Utc::now().into()),
            finished_at: Set(None),
        };

        run.insert(self.write_conn()).await?;
        info!(run_id = %id, window_days, "Run created");
        Ok(id)
    }

    async fn save_scores(&self, run_id: Uuid, records: &[ScoreRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now();
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            rows.push(ScoreRecordActiveModel {
                id: Set(Uuid::now_v7()),
                run_id: Set(run_id),
                key: Set(record.key.clone()),
                title: Set(record.title.clone()),
                origin: Set(record.origin.clone()),
                score: Set(record.score),
                tier: Set(record.tier.as_str().to_string()),
                reasons: Set(serde_json::to_value(&record.reasons)?),
                created_at: Set(now.into()),
            });
        }

        ScoreRecordEntity::insert_many(rows)
            .exec_without_returning(self.write_conn())
            .await?;
        Ok(())
    }

    async fn append_seen_keys(&self, run_id: Uuid, delivered: &[ScoredItem]) -> Result<()> {
        if delivered.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now();
        let rows = delivered.iter().map(|scored| SentItemActiveModel {
            key: Set(scored.key.clone()),
            run_id: Set(run_id),
            title: Set(scored.item.title.clone()),
            origin: Set(scored.item.origin.clone()),
            score: Set(scored.score.total()),
            tier: Set(scored.tier.as_str().to_string()),
            sent_at: Set(now.into()),
        });

        // A key delivered by a concurrent run keeps its first row
        let inserted = SentItemEntity::insert_many(rows)
            .on_conflict(OnConflict::column(SentItemColumn::Key).do_nothing().to_owned())
            .exec_without_returning(self.write_conn())
            .await?;

        info!(run_id = %run_id, inserted, "Seen keys appended");
        Ok(())
    }

    async fn complete_run(&self, run_id: Uuid, summary: &RunSummary) -> Result<()> {
        let run = RunEntity::find_by_id(run_id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::Store {
                message: format!("Run {} not found", run_id),
            })?;

        let mut active: RunActiveModel = run.into();
        active.status = Set(Some(summary.status.clone()));
        active.total_items = Set(summary.total_items as i32);
        active.unseen_items = Set(summary.unseen_items as i32);
        active.selected_items = Set(summary.selected_items as i32);
        active.finished_at = Set(Some(chrono::Utc::now().into()));
        active.update(self.write_conn()).await?;

        info!(run_id = %run_id, status = %summary.status, "Run completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Item, Score, Tier};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn repository(db: MockDatabase) -> Repository {
        let pool = DbPool {
            primary: db.into_connection(),
            replica: None,
        };
        Repository::new(pool)
    }

    fn run_row(id: Uuid, status: Option<&str>) -> Run {
        Run {
            id,
            window_days: 1,
            status: status.map(str::to_string),
            total_items: 0,
            unseen_items: 0,
            selected_items: 0,
            started_at: chrono::Utc::now().into(),
            finished_at: None,
        }
    }

    fn delivered(key: &str, points: f64) -> ScoredItem {
        let mut score = Score::new();
        score.add("citation", points, "citations");
        ScoredItem {
            item: Item::new("Nitrogenase cofactor biosynthesis", "PubMed"),
            key: key.to_string(),
            score,
            tier: Tier::P2,
        }
    }

    #[tokio::test]
    async fn test_load_seen_keys_reads_key_column() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![
            BTreeMap::from([("key", Value::from("DOI:10.1/a"))]),
            BTreeMap::from([("key", Value::from("LINK_HASH:0123456789abcdef"))]),
        ]]);
        let repo = repository(db);

        let seen = repo.load_seen_keys().await.unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains_str("DOI:10.1/a"));
        assert!(seen.contains_str("LINK_HASH:0123456789abcdef"));
    }

    #[tokio::test]
    async fn test_run_lifecycle_writes_rows() {
        let id = Uuid::now_v7();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![run_row(id, None)]])
            .append_query_results([vec![run_row(id, None)]])
            .append_query_results([vec![run_row(id, Some("selected"))]])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ]);
        let repo = repository(db);

        let run_id = repo.create_run(1).await.unwrap();
        let items = vec![delivered("DOI:10.1/a", 4.0)];
        let records: Vec<ScoreRecord> = items.iter().map(ScoreRecord::from).collect();
        repo.save_scores(run_id, &records).await.unwrap();
        repo.append_seen_keys(run_id, &items).await.unwrap();
        repo.complete_run(
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

        let log = repo.pool.primary.into_transaction_log();
        assert_eq!(log.len(), 5);
        assert!(format!("{:?}", log[1]).contains("score_records"));
        let seen_insert = format!("{:?}", log[2]);
        assert!(seen_insert.contains("sent_items"));
        assert!(seen_insert.contains("ON CONFLICT"));
        assert!(format!("{:?}", log[4]).contains("UPDATE"));
    }

    #[tokio::test]
    async fn test_empty_batches_skip_the_database() {
        let repo = repository(MockDatabase::new(DatabaseBackend::Postgres));
        let run_id = Uuid::now_v7();

        repo.save_scores(run_id, &[]).await.unwrap();
        repo.append_seen_keys(run_id, &[]).await.unwrap();
        assert!(repo.pool.primary.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_complete_unknown_run_is_store_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([Vec::<Run>::new()]);
        let repo = repository(db);

        let err = repo.complete_run(Uuid::now_v7(), &RunSummary::failed()).await.unwrap_err();
        assert!(matches!(err, AppError::Store { .. }));
        assert!(err.is_fatal());
    }
}
