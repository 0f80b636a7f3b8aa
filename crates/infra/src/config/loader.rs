//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `COURIER_DB_PATH`: Database file path
//! - `COURIER_DB_POOL_SIZE`: Connection pool size
//! - `COURIER_DISPATCH_INTERVAL`: Dispatch interval in seconds
//! - `COURIER_DISPATCH_BATCH_SIZE`: Items fetched per destination per cycle
//! - `COURIER_DISPATCH_ENABLED`: Whether dispatch is enabled (true/false)
//! - `COURIER_RECONCILE_INTERVAL`: Reconcile interval in seconds
//! - `COURIER_RECONCILE_LOCK_TTL`: Reconcile lock TTL in seconds
//! - `COURIER_RECONCILE_TIMEOUT`: Hard timeout for one sweep in seconds
//! - `COURIER_STUCK_THRESHOLD`: In-flight staleness threshold in seconds
//! - `COURIER_RECONCILE_MAX_ITEMS`: Item cap per reconcile run
//! - `COURIER_RECONCILE_ENABLED`: Whether reconciliation is enabled (true/false)
//!
//! Only the database variables are required; everything else falls back to
//! the defaults in `courier-domain`.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./courier.json` or `./courier.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. Relative to executable location

use std::path::{Path, PathBuf};

use courier_domain::{
    CourierConfig, CourierError, DatabaseConfig, DispatchConfig, ReconcileConfig, Result,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the required
/// variables are missing, falls back to loading from a config file. The
/// loaded configuration is validated before being returned.
///
/// # Errors
/// Returns `CourierError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Validation fails
pub fn load() -> Result<CourierConfig> {
    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)?
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// `COURIER_DB_PATH` and `COURIER_DB_POOL_SIZE` must be present; the
/// dispatch and reconcile settings default when unset.
///
/// # Errors
/// Returns `CourierError::Config` if required variables are missing or any
/// variable has an invalid value.
pub fn load_from_env() -> Result<CourierConfig> {
    let db_path = env_var("COURIER_DB_PATH")?;
    let db_pool_size = env_var("COURIER_DB_POOL_SIZE").and_then(|s| {
        s.parse::<u32>().map_err(|e| CourierError::Config(format!("Invalid pool size: {e}")))
    })?;

    let dispatch_defaults = DispatchConfig::default();
    let dispatch = DispatchConfig {
        interval_seconds: env_parse("COURIER_DISPATCH_INTERVAL", dispatch_defaults.interval_seconds)?,
        batch_size: env_parse("COURIER_DISPATCH_BATCH_SIZE", dispatch_defaults.batch_size)?,
        enabled: env_bool("COURIER_DISPATCH_ENABLED", dispatch_defaults.enabled),
    };

    let reconcile_defaults = ReconcileConfig::default();
    let reconcile = ReconcileConfig {
        interval_seconds: env_parse(
            "COURIER_RECONCILE_INTERVAL",
            reconcile_defaults.interval_seconds,
        )?,
        lock_ttl_seconds: env_parse(
            "COURIER_RECONCILE_LOCK_TTL",
            reconcile_defaults.lock_ttl_seconds,
        )?,
        run_timeout_seconds: env_parse(
            "COURIER_RECONCILE_TIMEOUT",
            reconcile_defaults.run_timeout_seconds,
        )?,
        stuck_threshold_seconds: env_parse(
            "COURIER_STUCK_THRESHOLD",
            reconcile_defaults.stuck_threshold_seconds,
        )?,
        max_items_per_run: env_parse(
            "COURIER_RECONCILE_MAX_ITEMS",
            reconcile_defaults.max_items_per_run,
        )?,
        enabled: env_bool("COURIER_RECONCILE_ENABLED", reconcile_defaults.enabled),
    };

    Ok(CourierConfig {
        database: DatabaseConfig { path: db_path, pool_size: db_pool_size },
        dispatch,
        reconcile,
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `CourierError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<CourierConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CourierError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CourierError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CourierError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, detecting the format by file
/// extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<CourierConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CourierError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CourierError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(CourierError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files, returning the first that
/// exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("courier.json"),
            cwd.join("courier.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("courier.json"),
                exe_dir.join("courier.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| CourierError::Config(format!("Missing required environment variable: {key}")))
}

/// Parse an optional environment variable, falling back to `default` when
/// unset.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| CourierError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
