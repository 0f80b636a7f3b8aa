//! SQLite-backed destination configuration storage.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::ports::DestinationRepository;
use courier_domain::constants::SEED_RATE_LIMITS;
use courier_domain::{DestinationConfig, RateLimit, Result};
use rusqlite::{Row, ToSql};
use tokio::task;
use tracing::info;

use super::manager::DbManager;
use crate::errors::{map_join_error, map_sql_error};

/// SQLite-backed destination repository.
pub struct SqliteDestinationRepository {
    db: Arc<DbManager>,
}

impl SqliteDestinationRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert the seed rate-limit table for any destination not yet present.
    ///
    /// Existing rows are left untouched so operator edits survive restarts.
    pub async fn seed_defaults(&self, now: i64) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let mut seeded = 0usize;
            for (destination_id, rps, max_concurrency) in SEED_RATE_LIMITS {
                let changed = conn
                    .execute(
                        "INSERT OR IGNORE INTO destinations
                             (destination_id, enabled, rps, max_concurrency, settings_json, updated_at)
                         VALUES (?1, 1, ?2, ?3, '{}', ?4)",
                        rusqlite::params![destination_id, rps, max_concurrency, now],
                    )
                    .map_err(map_sql_error)?;
                seeded += changed;
            }
            if seeded > 0 {
                info!(count = seeded, "seeded default destinations");
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl DestinationRepository for SqliteDestinationRepository {
    async fn get(&self, destination_id: &str) -> Result<Option<DestinationConfig>> {
        let db = Arc::clone(&self.db);
        let destination_id = destination_id.to_string();

        task::spawn_blocking(move || -> Result<Option<DestinationConfig>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT destination_id, enabled, rps, max_concurrency, settings_json
                     FROM destinations WHERE destination_id = ?1",
                )
                .map_err(map_sql_error)?;
            let params: [&dyn ToSql; 1] = [&destination_id];
            let mut rows =
                stmt.query_map(params.as_slice(), map_destination_row).map_err(map_sql_error)?;
            rows.next().transpose().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_enabled(&self) -> Result<Vec<DestinationConfig>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<DestinationConfig>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT destination_id, enabled, rps, max_concurrency, settings_json
                     FROM destinations WHERE enabled = 1
                     ORDER BY destination_id ASC",
                )
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], map_destination_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn upsert(&self, config: &DestinationConfig) -> Result<()> {
        let db = Arc::clone(&self.db);
        let config = config.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO destinations
                     (destination_id, enabled, rps, max_concurrency, settings_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, CAST(strftime('%s','now') AS INTEGER))
                 ON CONFLICT(destination_id) DO UPDATE SET
                     enabled = excluded.enabled,
                     rps = excluded.rps,
                     max_concurrency = excluded.max_concurrency,
                     settings_json = excluded.settings_json,
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    config.destination_id,
                    config.enabled,
                    config.rate_limit.rps,
                    config.rate_limit.max_concurrency,
                    config.settings_json,
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_destination_row(row: &Row<'_>) -> rusqlite::Result<DestinationConfig> {
    Ok(DestinationConfig {
        destination_id: row.get(0)?,
        enabled: row.get(1)?,
        rate_limit: RateLimit { rps: row.get(2)?, max_concurrency: row.get(3)? },
        settings_json: row.get(4)?,
    })
}
