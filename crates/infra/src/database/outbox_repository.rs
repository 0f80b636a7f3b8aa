//! SQLite-backed implementation of the outbox store port.
//!
//! All status transitions are single UPDATE statements guarded by the
//! current status (and, for claims, the version column), so concurrent
//! dispatchers coordinate purely through the database.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::ports::{ClaimOutcome, OutboxStore};
use courier_domain::{OutboxItem, OutboxStats, OutboxStatus, Result};
use rusqlite::{Connection, Row, ToSql};
use tokio::task;
use tracing::warn;

use super::manager::DbManager;
use crate::errors::{map_join_error, map_sql_error};

/// SQLite-backed outbox repository.
pub struct SqliteOutboxRepository {
    db: Arc<DbManager>,
}

impl SqliteOutboxRepository {
    /// Construct a repository backed by the shared pool.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn insert_item(conn: &Connection, item: &OutboxItem) -> Result<bool> {
        let params: [&dyn ToSql; 16] = [
            &item.id,
            &item.destination_id,
            &item.operation,
            &item.stable_resource_id,
            &item.idempotency_key,
            &item.payload_json,
            &item.status.to_string(),
            &item.attempt_count,
            &item.max_attempts,
            &item.next_attempt_at,
            &item.version,
            &item.last_error,
            &item.provider_response_json,
            &item.sent_at,
            &item.created_at,
            &item.updated_at,
        ];

        let changed =
            conn.execute(OUTBOX_INSERT_SQL, params.as_slice()).map_err(map_sql_error)?;
        Ok(changed > 0)
    }

    fn fetch_due_items(
        conn: &Connection,
        destination_id: &str,
        now: i64,
        limit: usize,
    ) -> Result<Vec<OutboxItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(OUTBOX_FETCH_DUE_SQL).map_err(map_sql_error)?;
        let params: [&dyn ToSql; 3] = [&destination_id, &now, &usize_to_i64(limit)];
        let rows = stmt
            .query_map(params.as_slice(), map_outbox_row)
            .map_err(map_sql_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_sql_error)?;
        Ok(rows)
    }
}

#[async_trait]
impl OutboxStore for SqliteOutboxRepository {
    async fn insert(&self, item: &OutboxItem) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let to_insert = item.clone();

        task::spawn_blocking(move || -> Result<bool> {
            let conn = db.get_connection()?;
            Self::insert_item(&conn, &to_insert)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<OutboxItem>> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        task::spawn_blocking(move || -> Result<Option<OutboxItem>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(OUTBOX_FIND_BY_KEY_SQL).map_err(map_sql_error)?;
            let params: [&dyn ToSql; 1] = [&key];
            let mut rows =
                stmt.query_map(params.as_slice(), map_outbox_row).map_err(map_sql_error)?;
            rows.next().transpose().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn fetch_due(
        &self,
        destination_id: &str,
        now: i64,
        limit: usize,
    ) -> Result<Vec<OutboxItem>> {
        let db = Arc::clone(&self.db);
        let destination_id = destination_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<OutboxItem>> {
            let conn = db.get_connection()?;
            Self::fetch_due_items(&conn, &destination_id, now, limit)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn claim(&self, id: &str, version: i64, now: i64) -> Result<ClaimOutcome> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> Result<ClaimOutcome> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE outbox_items
                     SET status = 'in_flight', version = version + 1, updated_at = ?1
                     WHERE id = ?2 AND status = 'queued' AND version = ?3",
                    rusqlite::params![now, id, version],
                )
                .map_err(map_sql_error)?;
            if changed > 0 {
                Ok(ClaimOutcome::Claimed)
            } else {
                Ok(ClaimOutcome::Lost)
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn defer(&self, id: &str, next_attempt_at: i64, now: i64) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE outbox_items SET next_attempt_at = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'queued'",
                rusqlite::params![next_attempt_at, now, id],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_sent(
        &self,
        id: &str,
        provider_response_json: Option<&str>,
        now: i64,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        let response = provider_response_json.map(str::to_string);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE outbox_items
                 SET status = 'sent', sent_at = ?1, provider_response_json = ?2,
                     last_error = NULL, updated_at = ?1
                 WHERE id = ?3 AND status = 'in_flight'",
                rusqlite::params![now, response, id],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn schedule_retry(
        &self,
        id: &str,
        attempt_count: i32,
        next_attempt_at: i64,
        error: &str,
        now: i64,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        let error = error.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE outbox_items
                 SET status = 'queued', attempt_count = ?1, next_attempt_at = ?2,
                     last_error = ?3, updated_at = ?4
                 WHERE id = ?5 AND status = 'in_flight'",
                rusqlite::params![attempt_count, next_attempt_at, error, now, id],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_dead_letter(
        &self,
        id: &str,
        attempt_count: i32,
        error: &str,
        now: i64,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        let error = error.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE outbox_items
                 SET status = 'dead_letter', attempt_count = ?1, last_error = ?2, updated_at = ?3
                 WHERE id = ?4 AND status = 'in_flight'",
                rusqlite::params![attempt_count, error, now, id],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn requeue_stuck(
        &self,
        destination_id: &str,
        stuck_before: i64,
        now: i64,
        limit: usize,
    ) -> Result<u32> {
        let db = Arc::clone(&self.db);
        let destination_id = destination_id.to_string();

        task::spawn_blocking(move || -> Result<u32> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE outbox_items
                     SET status = 'queued', next_attempt_at = ?1, version = version + 1,
                         updated_at = ?1
                     WHERE id IN (
                         SELECT id FROM outbox_items
                         WHERE destination_id = ?2
                           AND ((status = 'in_flight' AND updated_at <= ?3)
                                OR (status = 'queued' AND created_at <= ?3))
                         ORDER BY updated_at ASC
                         LIMIT ?4
                     )",
                    rusqlite::params![now, destination_id, stuck_before, usize_to_i64(limit)],
                )
                .map_err(map_sql_error)?;
            Ok(u32::try_from(changed).unwrap_or(u32::MAX))
        })
        .await
        .map_err(map_join_error)?
    }

    async fn recently_sent(
        &self,
        destination_id: &str,
        limit: usize,
    ) -> Result<Vec<OutboxItem>> {
        let db = Arc::clone(&self.db);
        let destination_id = destination_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<OutboxItem>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(OUTBOX_RECENTLY_SENT_SQL).map_err(map_sql_error)?;
            let params: [&dyn ToSql; 2] = [&destination_id, &usize_to_i64(limit)];
            let rows = stmt
                .query_map(params.as_slice(), map_outbox_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn stats(&self, destination_id: Option<&str>, now: i64) -> Result<OutboxStats> {
        let db = Arc::clone(&self.db);
        let destination_id = destination_id.map(str::to_string);

        task::spawn_blocking(move || -> Result<OutboxStats> {
            let conn = db.get_connection()?;
            collect_stats(&conn, destination_id.as_deref(), now)
        })
        .await
        .map_err(map_join_error)?
    }
}

const OUTBOX_COLUMNS: &str = "id, destination_id, operation, stable_resource_id, idempotency_key,
        payload_json, status, attempt_count, max_attempts, next_attempt_at, version,
        last_error, provider_response_json, sent_at, created_at, updated_at";

const OUTBOX_INSERT_SQL: &str = "INSERT OR IGNORE INTO outbox_items (
        id, destination_id, operation, stable_resource_id, idempotency_key, payload_json,
        status, attempt_count, max_attempts, next_attempt_at, version, last_error,
        provider_response_json, sent_at, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)";

const OUTBOX_FIND_BY_KEY_SQL: &str = "SELECT id, destination_id, operation, stable_resource_id, idempotency_key,
        payload_json, status, attempt_count, max_attempts, next_attempt_at, version,
        last_error, provider_response_json, sent_at, created_at, updated_at
    FROM outbox_items
    WHERE idempotency_key = ?1";

const OUTBOX_FETCH_DUE_SQL: &str = "SELECT id, destination_id, operation, stable_resource_id, idempotency_key,
        payload_json, status, attempt_count, max_attempts, next_attempt_at, version,
        last_error, provider_response_json, sent_at, created_at, updated_at
    FROM outbox_items
    WHERE destination_id = ?1 AND status = 'queued' AND next_attempt_at <= ?2
    ORDER BY created_at ASC, id ASC
    LIMIT ?3";

const OUTBOX_RECENTLY_SENT_SQL: &str = "SELECT id, destination_id, operation, stable_resource_id, idempotency_key,
        payload_json, status, attempt_count, max_attempts, next_attempt_at, version,
        last_error, provider_response_json, sent_at, created_at, updated_at
    FROM outbox_items
    WHERE destination_id = ?1 AND status = 'sent'
    ORDER BY updated_at DESC
    LIMIT ?2";

fn map_outbox_row(row: &Row<'_>) -> rusqlite::Result<OutboxItem> {
    let id: String = row.get(0)?;
    let status_raw: String = row.get(6)?;
    let status = parse_status(&id, &status_raw);

    Ok(OutboxItem {
        id,
        destination_id: row.get(1)?,
        operation: row.get(2)?,
        stable_resource_id: row.get(3)?,
        idempotency_key: row.get(4)?,
        payload_json: row.get(5)?,
        status,
        attempt_count: row.get(7)?,
        max_attempts: row.get(8)?,
        next_attempt_at: row.get(9)?,
        version: row.get(10)?,
        last_error: row.get(11)?,
        provider_response_json: row.get(12)?,
        sent_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn parse_status(id: &str, raw: &str) -> OutboxStatus {
    match raw.parse::<OutboxStatus>() {
        Ok(status) => status,
        Err(err) => {
            warn!(
                item_id = %id,
                raw_status = %raw,
                error = %err,
                "invalid outbox status in database - defaulting to queued"
            );
            OutboxStatus::Queued
        }
    }
}

fn collect_stats(conn: &Connection, destination_id: Option<&str>, now: i64) -> Result<OutboxStats> {
    let mut stats = OutboxStats::default();

    let (count_sql, oldest_sql): (String, String) = match destination_id {
        Some(_) => (
            "SELECT status, COUNT(*) FROM outbox_items WHERE destination_id = ?1 GROUP BY status"
                .into(),
            "SELECT MIN(created_at) FROM outbox_items WHERE destination_id = ?1 AND status = 'queued'"
                .into(),
        ),
        None => (
            "SELECT status, COUNT(*) FROM outbox_items GROUP BY status".into(),
            "SELECT MIN(created_at) FROM outbox_items WHERE status = 'queued'".into(),
        ),
    };

    let mut stmt = conn.prepare(&count_sql).map_err(map_sql_error)?;
    let rows: Vec<(String, u64)> = match destination_id {
        Some(dest) => stmt
            .query_map(rusqlite::params![dest], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(map_sql_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_sql_error)?,
        None => stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(map_sql_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_sql_error)?,
    };

    for (status, count) in rows {
        match status.as_str() {
            "queued" => stats.queued = count,
            "in_flight" => stats.in_flight = count,
            "sent" => stats.sent = count,
            "failed" => stats.failed = count,
            "dead_letter" => stats.dead_letter = count,
            other => warn!(status = other, "unknown status in stats query"),
        }
    }

    let oldest: Option<i64> = match destination_id {
        Some(dest) => conn
            .query_row(&oldest_sql, rusqlite::params![dest], |row| row.get(0))
            .map_err(map_sql_error)?,
        None => conn.query_row(&oldest_sql, [], |row| row.get(0)).map_err(map_sql_error)?,
    };
    stats.oldest_queued_age_secs = oldest.map(|created| now.saturating_sub(created));

    Ok(stats)
}

fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
