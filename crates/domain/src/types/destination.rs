//! Destination configuration types

use serde::{Deserialize, Serialize};

use crate::constants::SEED_RATE_LIMITS;

/// Per-destination throughput limits, enforced by the dispatcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests per second; also the token bucket capacity.
    pub rps: u32,
    /// Maximum simultaneous in-flight adapter calls.
    pub max_concurrency: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self { rps: 1, max_concurrency: 1 }
    }
}

/// Operator-owned configuration for one delivery destination.
///
/// Read-only to the dispatcher and reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DestinationConfig {
    pub destination_id: String,
    pub enabled: bool,
    pub rate_limit: RateLimit,
    /// Adapter-specific settings (webhook URL, sender address, ...), stored
    /// as opaque JSON.
    pub settings_json: String,
}

impl DestinationConfig {
    /// Build a config from the seed table, falling back to conservative
    /// defaults for unknown destinations.
    pub fn seeded(destination_id: &str) -> Self {
        let rate_limit = SEED_RATE_LIMITS
            .iter()
            .find(|(id, _, _)| *id == destination_id)
            .map(|(_, rps, max_concurrency)| RateLimit {
                rps: *rps,
                max_concurrency: *max_concurrency,
            })
            .unwrap_or_default();

        Self {
            destination_id: destination_id.to_string(),
            enabled: true,
            rate_limit,
            settings_json: "{}".to_string(),
        }
    }
}
