//! # Sync Run History
//!
//! One row per source per sync, so the presentation layer can show when a
//! source was last synchronized and why a sync failed.

use crate::context::SyncStats;
use crate::{Result, SyncError};
use async_trait::async_trait;
use core_library::models::SourceId;
use core_runtime::events::SourceOutcome;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A finished attempt to sync one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i64,
    pub source_id: SourceId,
    pub outcome: SourceOutcome,
    /// Attempts made, retries included
    pub tries: u32,
    pub stats: SyncStats,
    pub newest_sync_time: i64,
    pub error_message: Option<String>,
    pub started_at: i64,
    pub finished_at: i64,
}

/// Values recorded for a new run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncRun {
    pub source_id: SourceId,
    pub outcome: SourceOutcome,
    pub tries: u32,
    pub stats: SyncStats,
    pub newest_sync_time: i64,
    pub error_message: Option<String>,
    pub started_at: i64,
    pub finished_at: i64,
}

pub fn outcome_as_str(outcome: SourceOutcome) -> &'static str {
    match outcome {
        SourceOutcome::Committed => "committed",
        SourceOutcome::Canceled => "canceled",
        SourceOutcome::NetworkError => "network_error",
        SourceOutcome::Failed => "failed",
    }
}

pub fn parse_outcome(s: &str) -> Result<SourceOutcome> {
    match s {
        "committed" => Ok(SourceOutcome::Committed),
        "canceled" => Ok(SourceOutcome::Canceled),
        "network_error" => Ok(SourceOutcome::NetworkError),
        "failed" => Ok(SourceOutcome::Failed),
        _ => Err(SyncError::InvalidStatus(s.to_string())),
    }
}

#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    /// Persist a finished run and return its id
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not exist or the database
    /// operation fails
    async fn record(&self, run: &NewSyncRun) -> Result<i64>;

    /// Most recent run of a source
    async fn latest_for_source(&self, source_id: SourceId) -> Result<Option<SyncRun>>;

    /// Runs of a source, most recent first
    async fn history(&self, source_id: SourceId, limit: u32) -> Result<Vec<SyncRun>>;
}

pub struct SqliteSyncRunRepository {
    pool: SqlitePool,
}

impl SqliteSyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a sync run
#[derive(Debug, FromRow)]
struct SyncRunRow {
    id: i64,
    source_id: i64,
    status: String,
    tries: i64,
    inserted: i64,
    updated: i64,
    deleted: i64,
    newest_sync_time: i64,
    error_message: Option<String>,
    started_at: i64,
    finished_at: i64,
}

impl TryFrom<SyncRunRow> for SyncRun {
    type Error = SyncError;

    fn try_from(row: SyncRunRow) -> Result<Self> {
        Ok(SyncRun {
            id: row.id,
            source_id: SourceId(row.source_id),
            outcome: parse_outcome(&row.status)?,
            tries: row.tries as u32,
            stats: SyncStats {
                inserted: row.inserted as u64,
                updated: row.updated as u64,
                deleted: row.deleted as u64,
            },
            newest_sync_time: row.newest_sync_time,
            error_message: row.error_message,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

#[async_trait]
impl SyncRunRepository for SqliteSyncRunRepository {
    async fn record(&self, run: &NewSyncRun) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO sync_runs (
                source_id, status, tries, inserted, updated, deleted,
                newest_sync_time, error_message, started_at, finished_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.source_id)
        .bind(outcome_as_str(run.outcome))
        .bind(i64::from(run.tries))
        .bind(run.stats.inserted as i64)
        .bind(run.stats.updated as i64)
        .bind(run.stats.deleted as i64)
        .bind(run.newest_sync_time)
        .bind(&run.error_message)
        .bind(run.started_at)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn latest_for_source(&self, source_id: SourceId) -> Result<Option<SyncRun>> {
        Ok(self.history(source_id, 1).await?.into_iter().next())
    }

    async fn history(&self, source_id: SourceId, limit: u32) -> Result<Vec<SyncRun>> {
        let rows = sqlx::query_as::<_, SyncRunRow>(
            r#"
            SELECT * FROM sync_runs
            WHERE source_id = ?
            ORDER BY finished_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(source_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter().map(SyncRun::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::create_test_pool;

    async fn setup_test_pool() -> SqlitePool {
        let pool = create_test_pool().await.unwrap();
        sqlx::query("INSERT INTO sources (id, host, port) VALUES (1, 'music.local', 5545)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    fn run(outcome: SourceOutcome, finished_at: i64) -> NewSyncRun {
        NewSyncRun {
            source_id: SourceId(1),
            outcome,
            tries: 1,
            stats: SyncStats {
                inserted: 3,
                updated: 0,
                deleted: 1,
            },
            newest_sync_time: 900,
            error_message: None,
            started_at: finished_at - 5,
            finished_at,
        }
    }

    #[test]
    fn test_outcome_strings_round_trip() {
        for outcome in [
            SourceOutcome::Committed,
            SourceOutcome::Canceled,
            SourceOutcome::NetworkError,
            SourceOutcome::Failed,
        ] {
            assert_eq!(parse_outcome(outcome_as_str(outcome)).unwrap(), outcome);
        }
        assert!(parse_outcome("pending").is_err());
    }

    #[core_async::test]
    async fn test_history_most_recent_first() {
        let repo = SqliteSyncRunRepository::new(setup_test_pool().await);

        repo.record(&run(SourceOutcome::Committed, 100)).await.unwrap();
        let mut failed = run(SourceOutcome::NetworkError, 200);
        failed.tries = 4;
        failed.error_message = Some("connection reset".to_string());
        repo.record(&failed).await.unwrap();

        let history = repo.history(SourceId(1), 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].outcome, SourceOutcome::NetworkError);
        assert_eq!(history[0].tries, 4);
        assert_eq!(history[1].stats.inserted, 3);

        let latest = repo.latest_for_source(SourceId(1)).await.unwrap().unwrap();
        assert_eq!(latest.error_message.as_deref(), Some("connection reset"));
        assert!(repo.latest_for_source(SourceId(2)).await.unwrap().is_none());
    }

    #[core_async::test]
    async fn test_record_for_unknown_source_fails() {
        let repo = SqliteSyncRunRepository::new(setup_test_pool().await);
        let mut orphan = run(SourceOutcome::Committed, 1);
        orphan.source_id = SourceId(9);
        assert!(matches!(
            repo.record(&orphan).await,
            Err(SyncError::Database(_))
        ));
    }
}
