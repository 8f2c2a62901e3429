//! Device discovery and subscription bookkeeping.
//!
//! At startup every known device gets a capability subscription; a watcher
//! thread then consumes the registry's "device created" stream and runs new
//! devices through the same path. Subscriptions are never torn down (device
//! removal is out of scope); if a registry re-announces an id the old
//! subscription is replaced with a warning.

use crate::registry::{Device, DeviceRegistry};
use crate::services::storage::ActiveConnection;
use crate::services::subscription::CapabilitySubscription;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type SubscriptionMap = Arc<Mutex<HashMap<String, CapabilitySubscription>>>;

pub struct DeviceManager {
    subscriptions: SubscriptionMap,
    watcher: Option<JoinHandle<()>>,
}

impl DeviceManager {
    /// Enumerate the current device set, subscribe to each, and start
    /// watching for new devices.
    ///
    /// Only the initial enumeration can fail; individual device
    /// initialization failures are handled inside each subscription worker
    /// and never abort the others.
    pub fn start(
        mut registry: Box<dyn DeviceRegistry>,
        homey_id: String,
        active: ActiveConnection,
    ) -> Result<Self, String> {
        let devices = registry
            .devices()
            .map_err(|e| format!("device enumeration failed: {}", e))?;
        info!("Discovered {} device(s)", devices.len());

        let subscriptions: SubscriptionMap = Arc::new(Mutex::new(HashMap::new()));
        for device in devices {
            track(&subscriptions, device, &homey_id, &active);
        }

        let created = registry.on_device_created();
        let watcher = thread::spawn({
            let subscriptions = subscriptions.clone();
            move || {
                // the registry moves in here so its announcement stream stays open
                let _registry = registry;
                for device in created {
                    info!("[Device:{}] Created", device.id());
                    track(&subscriptions, device, &homey_id, &active);
                }
            }
        });

        Ok(DeviceManager {
            subscriptions,
            watcher: Some(watcher),
        })
    }

    pub fn device_count(&self) -> usize {
        self.subscriptions.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Block until the registry closes its streams and every subscription's
    /// notification channel has drained.
    pub fn join(mut self) {
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
        let drained: Vec<(String, CapabilitySubscription)> = self
            .subscriptions
            .lock()
            .map(|mut m| m.drain().collect())
            .unwrap_or_default();
        for (_, subscription) in drained {
            subscription.join();
        }
    }
}

fn track(subscriptions: &SubscriptionMap, device: Box<dyn Device>, homey_id: &str, active: &ActiveConnection) {
    let id = device.id().to_string();
    let subscription = CapabilitySubscription::spawn(device, homey_id.to_string(), active.clone());
    if let Ok(mut map) = subscriptions.lock() {
        if let Some(previous) = map.insert(id, subscription) {
            warn!("[Device:{}] Re-announced; replacing its subscription", previous.device_id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CapabilityEvent;
    use crate::services::storage::{StorageConnector, WriterCommand, new_active_connection};
    use bigdecimal::BigDecimal;
    use serde_json::json;
    use std::sync::mpsc::{self, Receiver};

    struct ScriptedDevice {
        id: String,
        events: Option<Receiver<CapabilityEvent>>,
    }

    impl Device for ScriptedDevice {
        fn id(&self) -> &str {
            &self.id
        }

        fn connect(&mut self) -> Result<Receiver<CapabilityEvent>, String> {
            self.events.take().ok_or_else(|| "already connected".to_string())
        }
    }

    fn scripted(id: &str, events: Vec<CapabilityEvent>) -> Box<dyn Device> {
        let (tx, rx) = mpsc::channel();
        for event in events {
            tx.send(event).unwrap();
        }
        // sender drops here, so the subscription drains and exits
        Box::new(ScriptedDevice {
            id: id.to_string(),
            events: Some(rx),
        })
    }

    fn onoff(value: bool) -> CapabilityEvent {
        CapabilityEvent {
            capability_id: "onoff".to_string(),
            value: json!(value),
        }
    }

    struct ScriptedRegistry {
        initial: Vec<Box<dyn Device>>,
        late: Vec<Box<dyn Device>>,
    }

    impl DeviceRegistry for ScriptedRegistry {
        fn devices(&mut self) -> Result<Vec<Box<dyn Device>>, String> {
            Ok(std::mem::take(&mut self.initial))
        }

        fn on_device_created(&mut self) -> Receiver<Box<dyn Device>> {
            let (tx, rx) = mpsc::channel();
            for device in self.late.drain(..) {
                tx.send(device).unwrap();
            }
            rx
        }
    }

    #[test]
    fn concurrent_devices_each_write_their_own_rows() {
        let active = new_active_connection();
        let (connector, rows) = StorageConnector::stub();
        *active.write().unwrap() = Some(connector);

        let registry = ScriptedRegistry {
            initial: vec![scripted("dev-1", vec![onoff(true)]), scripted("dev-2", vec![onoff(false)])],
            late: vec![],
        };
        let manager = DeviceManager::start(Box::new(registry), "abc123".to_string(), active.clone()).unwrap();
        assert_eq!(manager.device_count(), 2);
        manager.join();

        let mut seen: Vec<(String, BigDecimal)> = Vec::new();
        while let Ok(WriterCommand::Insert(row)) = rows.try_recv() {
            assert_eq!(row.homey_id, "abc123");
            seen.push((row.device_id, row.value));
        }
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("dev-1".to_string(), BigDecimal::from(1)),
                ("dev-2".to_string(), BigDecimal::from(0)),
            ]
        );
    }

    #[test]
    fn late_devices_go_through_the_same_path() {
        let active = new_active_connection();
        let (connector, rows) = StorageConnector::stub();
        *active.write().unwrap() = Some(connector);

        let registry = ScriptedRegistry {
            initial: vec![],
            late: vec![scripted("dev-late", vec![onoff(true)])],
        };
        let manager = DeviceManager::start(Box::new(registry), "abc123".to_string(), active.clone()).unwrap();
        manager.join();

        let WriterCommand::Insert(row) = rows.recv().unwrap() else {
            panic!("expected insert");
        };
        assert_eq!(row.device_id, "dev-late");
    }

    #[test]
    fn enumeration_failure_is_surfaced() {
        struct BrokenRegistry;
        impl DeviceRegistry for BrokenRegistry {
            fn devices(&mut self) -> Result<Vec<Box<dyn Device>>, String> {
                Err("registry offline".to_string())
            }
            fn on_device_created(&mut self) -> Receiver<Box<dyn Device>> {
                mpsc::channel().1
            }
        }

        let active = new_active_connection();
        let err = match DeviceManager::start(Box::new(BrokenRegistry), "abc123".to_string(), active) {
            Ok(_) => panic!("expected enumeration to fail"),
            Err(e) => e,
        };
        assert!(err.contains("registry offline"));
    }
}
