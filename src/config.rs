//! Minimal runtime configuration helpers.
//! Everything the binary needs besides the operator-managed connection URI.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOMEY_ID: &str = "homey-sim";
pub const DEFAULT_SETTINGS_PATH: &str = "settings.json";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SIM_DEVICES: usize = 4;
pub const DEFAULT_SIM_INTERVAL_SECS: u64 = 15;

/// Installation ids are stored in a VARCHAR(24) column.
const MAX_HOMEY_ID_LEN: usize = 24;

#[derive(Debug, Clone)]
pub struct Config {
    /// Installation identifier stamped on every row (HOMEY_ID).
    pub homey_id: String,
    /// Where the JSON settings store lives (SETTINGS_PATH).
    pub settings_path: PathBuf,
    /// Bound on store connection attempts (CONNECT_TIMEOUT_SECS, 0 disables).
    pub connect_timeout: Duration,
    /// Optional URI applied through the operator surface at startup,
    /// seeding the settings store (TIMESCALEDB_URI).
    pub bootstrap_uri: Option<String>,
    /// Number of simulated devices (SIM_DEVICES).
    pub sim_devices: usize,
    /// Mean pause between simulated capability changes (SIM_INTERVAL_SECS).
    pub sim_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let homey_id = match std::env::var("HOMEY_ID") {
            Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => DEFAULT_HOMEY_ID.to_string(),
        };
        if homey_id.len() > MAX_HOMEY_ID_LEN {
            return Err(format!(
                "HOMEY_ID must be at most {} characters (got {})",
                MAX_HOMEY_ID_LEN,
                homey_id.len()
            ));
        }

        let settings_path = std::env::var("SETTINGS_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));

        let connect_timeout_secs = std::env::var("CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        let bootstrap_uri = std::env::var("TIMESCALEDB_URI")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let sim_devices = std::env::var("SIM_DEVICES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_SIM_DEVICES);

        let sim_interval_secs = std::env::var("SIM_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SIM_INTERVAL_SECS);

        Ok(Config {
            homey_id,
            settings_path,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            bootstrap_uri,
            sim_devices,
            sim_interval: Duration::from_secs(sim_interval_secs.max(1)),
        })
    }
}
