pub mod api;
pub mod config;
pub mod db {
    pub mod models;
}
pub mod normalize;
pub mod registry;
pub mod schema;
pub mod settings;
pub mod services {
    pub mod coordinator;
    pub mod devices;
    pub mod sim;
    pub mod storage;
    pub mod subscription;
}

use crate::config::Config;
use crate::services::coordinator::ConfigCoordinator;
use crate::services::devices::DeviceManager;
use crate::services::sim::SimulatedRegistry;
use crate::services::storage::{self, PgStorageConnect};
use crate::settings::{JsonFileSettings, SettingsStore, keys};
use log::{error, info};
use std::path::{Path, PathBuf};

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (homey_id={}, settings={}, connect_timeout={}s, sim_devices={}, sim_interval={}s)",
        cfg.homey_id,
        cfg.settings_path.display(),
        cfg.connect_timeout.as_secs(),
        cfg.sim_devices,
        cfg.sim_interval.as_secs()
    );

    // 2) Open the settings store; greet the operator on first run
    let mut settings = JsonFileSettings::open(&cfg.settings_path)?;
    if settings.get(keys::WELCOME_CREATED).is_none() {
        info!(
            "Welcome to TimescaleDB! Set your server's URI (TIMESCALEDB_URI or the settings surface) to start ingesting."
        );
        settings.set(keys::WELCOME_CREATED, serde_json::json!(true))?;
    }

    // 3) Shared connection cell + coordinator
    let active = storage::new_active_connection();
    let mut coordinator = ConfigCoordinator::new(
        Box::new(settings),
        Box::new(PgStorageConnect),
        active.clone(),
        cfg.connect_timeout,
    );

    // 4) Device discovery and per-device subscriptions. Started before the
    // store connects: writes issued while unconfigured are dropped, and the
    // event source must never wait on storage.
    let registry = SimulatedRegistry::new(cfg.sim_devices, cfg.sim_interval);
    let manager = DeviceManager::start(Box::new(registry), cfg.homey_id.clone(), active)?;
    info!("Tracking {} device(s)", manager.device_count());

    // 5) Connect: an explicit TIMESCALEDB_URI goes through the operator
    // surface (validated and persisted); otherwise autoconnect with whatever
    // the settings store holds.
    match cfg.bootstrap_uri.as_deref() {
        Some(uri) => {
            api::set_config_uri(&mut coordinator, uri).map_err(|e| format!("TIMESCALEDB_URI rejected: {}", e))?;
        }
        None => coordinator.startup(),
    }
    match api::get_config_uri(&coordinator) {
        Some(_) => info!("Connection state: {:?}", coordinator.state()),
        None => info!("Connection state: {:?} (no URI configured)", coordinator.state()),
    }

    // 6) Block for the life of the device registry
    manager.join();
    Ok(())
}

fn configure_env_from_cli() -> Result<Option<PathBuf>, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => {
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            Some(s) if s.starts_with("--env-file=") => {
                env_file = Some(PathBuf::from(&s["--env-file=".len()..]));
            }
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    let path = match env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            path
        }
        None => {
            let default_path = PathBuf::from(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            default_path
        }
    };
    load_env_file(&path)?;
    Ok(Some(path))
}

fn load_env_file(path: &Path) -> Result<(), String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    for (index, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let assignment = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| format!("{}:{}: missing '=' in assignment", path.display(), index + 1))?;
        let key = key.trim();
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            return Err(format!("{}:{}: invalid variable name", path.display(), index + 1));
        }

        let value = parse_env_value(value);

        // Values already supplied via the process environment win.
        if std::env::var_os(key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

fn parse_env_value(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    // unquoted values stop at an inline comment
    trimmed.split(" #").next().unwrap_or_default().trim_end().to_string()
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(path) = loaded_env.as_ref() {
        info!("Environment loaded from .env file: {}", path.display());
    }

    info!(
        "homey-timescale {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_values_strip_quotes_and_comments() {
        assert_eq!(parse_env_value("plain"), "plain");
        assert_eq!(parse_env_value("\"quoted value\""), "quoted value");
        assert_eq!(parse_env_value("'single # not a comment'"), "single # not a comment");
        assert_eq!(parse_env_value("value # trailing comment"), "value");
        assert_eq!(parse_env_value("  padded  "), "padded");
        assert_eq!(parse_env_value(""), "");
    }
}
