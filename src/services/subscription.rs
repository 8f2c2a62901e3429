//! Per-device capability subscription.
//!
//! Each discovered device gets one worker thread that connects to the
//! device's live notification channel and turns storable capability changes
//! into time-series rows. Everything on this path is swallowed into the log:
//! a bad device, a bad value, or a missing connection must never stall or
//! crash the event source.

use crate::db::models::NewEntry;
use crate::normalize::normalize;
use crate::registry::{CapabilityEvent, Device};
use crate::services::storage::ActiveConnection;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::thread::{self, JoinHandle};

pub struct CapabilitySubscription {
    device_id: String,
    worker: JoinHandle<()>,
}

impl CapabilitySubscription {
    /// Spawn the subscription worker for one device.
    ///
    /// The worker connects to the device (a failure is logged and isolated to
    /// this device), then forwards events until the device side closes the
    /// channel. Rows are routed through whatever connection is active at the
    /// moment the event arrives; with no active connection the row is
    /// dropped, not queued.
    pub fn spawn(mut device: Box<dyn Device>, homey_id: String, active: ActiveConnection) -> Self {
        let device_id = device.id().to_string();
        let id = device_id.clone();
        let worker = thread::spawn(move || {
            let events = match device.connect() {
                Ok(rx) => rx,
                Err(e) => {
                    error!("[Device:{}] Error Initializing: {}", id, e);
                    return;
                }
            };
            info!("[Device:{}] Initialized", id);

            for event in events {
                handle_event(&homey_id, &id, &event, &active);
            }
            debug!("[Device:{}] Notification channel closed", id);
        });
        CapabilitySubscription { device_id, worker }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Block until the device's notification channel closes.
    pub fn join(self) {
        let _ = self.worker.join();
    }
}

fn handle_event(homey_id: &str, device_id: &str, event: &CapabilityEvent, active: &ActiveConnection) {
    debug!(
        "[Device:{}][Capability:{}] Changed to {}",
        device_id, event.capability_id, event.value
    );

    let Some(value) = normalize(&event.value) else {
        return;
    };

    let row = NewEntry::new(homey_id, device_id, event.capability_id.as_str(), observation_time(), value);

    match active.read() {
        Ok(guard) => {
            if let Some(connector) = guard.as_ref() {
                connector.write(row);
            }
        }
        // A poisoned cell means the writer side panicked mid-swap; drop the
        // row like any other no-connection case.
        Err(_) => {}
    }
}

/// Wall clock truncated to millisecond precision.
///
/// The `time` column is defined at millisecond resolution and the composite
/// primary key allows at most one value per device/capability per
/// millisecond; stamping rows with sub-millisecond nanos would give two
/// events in the same millisecond distinct keys and defeat that bound.
fn observation_time() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
