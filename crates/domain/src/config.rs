//! Application configuration structures
//!
//! Populated by the infra config loader from environment variables or a TOML
//! file; see `courier-infra::config`.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DISPATCH_BATCH_SIZE, DEFAULT_DISPATCH_INTERVAL_SECS, DEFAULT_RECONCILE_INTERVAL_SECS,
    DEFAULT_RECONCILE_LOCK_TTL_SECS, DEFAULT_RECONCILE_MAX_ITEMS, DEFAULT_RECONCILE_TIMEOUT_SECS,
    DEFAULT_STUCK_THRESHOLD_SECS,
};
use crate::errors::{CourierError, Result};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourierConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// SQLite database settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

/// Dispatch worker settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    pub interval_seconds: u64,
    pub batch_size: usize,
    pub enabled: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_DISPATCH_INTERVAL_SECS,
            batch_size: DEFAULT_DISPATCH_BATCH_SIZE,
            enabled: true,
        }
    }
}

/// Reconciliation scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcileConfig {
    pub interval_seconds: u64,
    pub lock_ttl_seconds: i64,
    pub run_timeout_seconds: u64,
    pub stuck_threshold_seconds: i64,
    pub max_items_per_run: usize,
    pub enabled: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_RECONCILE_INTERVAL_SECS,
            lock_ttl_seconds: DEFAULT_RECONCILE_LOCK_TTL_SECS,
            run_timeout_seconds: DEFAULT_RECONCILE_TIMEOUT_SECS,
            stuck_threshold_seconds: DEFAULT_STUCK_THRESHOLD_SECS,
            max_items_per_run: DEFAULT_RECONCILE_MAX_ITEMS,
            enabled: true,
        }
    }
}

impl CourierConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `CourierError::Config` when a field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.is_empty() {
            return Err(CourierError::Config("database path must not be empty".into()));
        }
        if self.database.pool_size == 0 {
            return Err(CourierError::Config("database pool size must be greater than 0".into()));
        }
        if self.dispatch.batch_size == 0 {
            return Err(CourierError::Config("dispatch batch size must be greater than 0".into()));
        }
        if self.reconcile.lock_ttl_seconds <= 0 {
            return Err(CourierError::Config("reconcile lock TTL must be positive".into()));
        }
        if u64::try_from(self.reconcile.lock_ttl_seconds).unwrap_or(0)
            <= self.reconcile.run_timeout_seconds
        {
            return Err(CourierError::Config(
                "reconcile lock TTL must exceed the run timeout".into(),
            ));
        }
        if self.reconcile.stuck_threshold_seconds <= 0 {
            return Err(CourierError::Config("stuck threshold must be positive".into()));
        }
        Ok(())
    }
}
