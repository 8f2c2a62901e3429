//! Settings persistence boundary.
//!
//! Durability of the connection URI (and the one-time welcome flag) belongs
//! to an external settings store; the coordinator only sees this trait. The
//! bundled implementation is a flat JSON file next to the binary.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Well-known settings keys.
pub mod keys {
    /// The configured TimescaleDB connection URI (string or null).
    pub const URI: &str = "uri";
    /// Set once the first-run welcome notification has been shown.
    pub const WELCOME_CREATED: &str = "timelineNotificationWelcomeCreated";
}

/// Key/value store for the handful of persisted settings.
pub trait SettingsStore: Send {
    /// Returns the stored value, or `None` when absent or stored as null.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` durably. `Value::Null` clears the key.
    fn set(&mut self, key: &str, value: Value) -> Result<(), String>;
}

/// Flat JSON-file settings store.
///
/// The file holds a single JSON object. A missing file reads as empty; every
/// `set` rewrites the whole file (the store holds five-ish small keys, so
/// this is fine).
pub struct JsonFileSettings {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl JsonFileSettings {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<BTreeMap<String, Value>>(&raw)
                .map_err(|e| format!("settings file {} is not valid JSON: {}", path.display(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };
        Ok(JsonFileSettings { path, values })
    }

    fn persist(&self) -> Result<(), String> {
        let raw = serde_json::to_string_pretty(&self.values)
            .map_err(|e| format!("failed to serialize settings: {}", e))?;
        fs::write(&self.path, raw).map_err(|e| format!("failed to write {}: {}", self.path.display(), e))
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: &str) -> Option<Value> {
        match self.values.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.clone()),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), String> {
        if value.is_null() {
            self.values.remove(key);
        } else {
            self.values.insert(key.to_string(), value);
        }
        self.persist()
    }
}

/// In-memory settings store with no durable backing, for tests.
#[cfg(test)]
pub struct MemorySettings {
    values: BTreeMap<String, Value>,
}

#[cfg(test)]
impl MemorySettings {
    pub fn new() -> Self {
        MemorySettings { values: BTreeMap::new() }
    }
}

#[cfg(test)]
impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        match self.values.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.clone()),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), String> {
        if value.is_null() {
            self.values.remove(key);
        } else {
            self.values.insert(key.to_string(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_settings_path() -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("homey-timescale-settings-{}-{}.json", std::process::id(), n))
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let path = temp_settings_path();
        let store = JsonFileSettings::open(&path).unwrap();
        assert_eq!(store.get(keys::URI), None);
    }

    #[test]
    fn set_then_get_roundtrips_across_reopen() {
        let path = temp_settings_path();
        let mut store = JsonFileSettings::open(&path).unwrap();
        store
            .set(keys::URI, json!("postgres://u:p@h:5432/db"))
            .unwrap();
        store.set(keys::WELCOME_CREATED, json!(true)).unwrap();

        let reopened = JsonFileSettings::open(&path).unwrap();
        assert_eq!(reopened.get(keys::URI), Some(json!("postgres://u:p@h:5432/db")));
        assert_eq!(reopened.get(keys::WELCOME_CREATED), Some(json!(true)));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn null_clears_a_key() {
        let path = temp_settings_path();
        let mut store = JsonFileSettings::open(&path).unwrap();
        store.set(keys::URI, json!("postgres://u:p@h:5432/db")).unwrap();
        store.set(keys::URI, Value::Null).unwrap();
        assert_eq!(store.get(keys::URI), None);

        let reopened = JsonFileSettings::open(&path).unwrap();
        assert_eq!(reopened.get(keys::URI), None);

        let _ = fs::remove_file(&path);
    }
}
