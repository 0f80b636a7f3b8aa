//! SQLite-backed reconciliation audit log and TTL lock.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::ports::{ReconcileLock, ReconcileRunRepository};
use courier_domain::{ReconcileRun, ReconcileRunStatus, Result};
use rusqlite::{Row, ToSql};
use tokio::task;
use tracing::warn;

use super::manager::DbManager;
use crate::errors::{map_join_error, map_sql_error};

/// Append-only store for [`ReconcileRun`] records.
pub struct SqliteReconcileRunRepository {
    db: Arc<DbManager>,
}

impl SqliteReconcileRunRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReconcileRunRepository for SqliteReconcileRunRepository {
    async fn record(&self, run: &ReconcileRun) -> Result<()> {
        let db = Arc::clone(&self.db);
        let run = run.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO reconcile_runs (
                     id, destination_id, started_at, finished_at, items_examined,
                     items_requeued, api_calls_made, rate_limited_count, success_count,
                     failure_count, drift_count, status, error
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    run.id,
                    run.destination_id,
                    run.started_at,
                    run.finished_at,
                    run.items_examined,
                    run.items_requeued,
                    run.api_calls_made,
                    run.rate_limited_count,
                    run.success_count,
                    run.failure_count,
                    run.drift_count,
                    run.status.to_string(),
                    run.error,
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn last_run(&self, destination_id: &str) -> Result<Option<ReconcileRun>> {
        let db = Arc::clone(&self.db);
        let destination_id = destination_id.to_string();

        task::spawn_blocking(move || -> Result<Option<ReconcileRun>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, destination_id, started_at, finished_at, items_examined,
                            items_requeued, api_calls_made, rate_limited_count, success_count,
                            failure_count, drift_count, status, error
                     FROM reconcile_runs
                     WHERE destination_id = ?1
                     ORDER BY started_at DESC, id DESC
                     LIMIT 1",
                )
                .map_err(map_sql_error)?;
            let params: [&dyn ToSql; 1] = [&destination_id];
            let mut rows = stmt.query_map(params.as_slice(), map_run_row).map_err(map_sql_error)?;
            rows.next().transpose().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_run_row(row: &Row<'_>) -> rusqlite::Result<ReconcileRun> {
    let id: String = row.get(0)?;
    let status_raw: String = row.get(11)?;
    let status = match status_raw.parse::<ReconcileRunStatus>() {
        Ok(status) => status,
        Err(err) => {
            warn!(run_id = %id, raw_status = %status_raw, error = %err,
                  "invalid reconcile run status in database - defaulting to failed");
            ReconcileRunStatus::Failed
        }
    };

    Ok(ReconcileRun {
        id,
        destination_id: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        items_examined: row.get(4)?,
        items_requeued: row.get(5)?,
        api_calls_made: row.get(6)?,
        rate_limited_count: row.get(7)?,
        success_count: row.get(8)?,
        failure_count: row.get(9)?,
        drift_count: row.get(10)?,
        status,
        error: row.get(12)?,
    })
}

/// SQLite-backed TTL lock serializing reconciliation per destination.
///
/// Acquisition is a single upsert whose conflict clause only fires for
/// expired rows, so contention resolves entirely inside SQLite.
pub struct SqliteReconcileLock {
    db: Arc<DbManager>,
}

impl SqliteReconcileLock {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReconcileLock for SqliteReconcileLock {
    async fn try_acquire(
        &self,
        destination_id: &str,
        holder: &str,
        ttl_secs: i64,
        now: i64,
    ) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let destination_id = destination_id.to_string();
        let holder = holder.to_string();

        task::spawn_blocking(move || -> Result<bool> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "INSERT INTO reconcile_locks (destination_id, holder, acquired_at, expires_at)
                     VALUES (?1, ?2, ?3, ?3 + ?4)
                     ON CONFLICT(destination_id) DO UPDATE SET
                         holder = excluded.holder,
                         acquired_at = excluded.acquired_at,
                         expires_at = excluded.expires_at
                     WHERE reconcile_locks.expires_at <= ?3",
                    rusqlite::params![destination_id, holder, now, ttl_secs],
                )
                .map_err(map_sql_error)?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn release(&self, destination_id: &str, holder: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let destination_id = destination_id.to_string();
        let holder = holder.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let deleted = conn
                .execute(
                    "DELETE FROM reconcile_locks WHERE destination_id = ?1 AND holder = ?2",
                    rusqlite::params![destination_id, holder],
                )
                .map_err(map_sql_error)?;
            if deleted == 0 {
                warn!(
                    destination_id = %destination_id,
                    holder = %holder,
                    "release found no matching lock - likely taken over after expiry"
                );
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}
