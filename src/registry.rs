//! Boundary traits for the external device registry.
//!
//! The registry that enumerates devices and streams their capability changes
//! lives outside this crate (on the Homey side it is the devices manager of
//! the system API). The ingestion pipeline only sees these traits, so any
//! source that can list devices and push `{capability_id, value}` events fits.

use std::sync::mpsc::Receiver;

/// A single capability-change notification from one device.
#[derive(Debug, Clone)]
pub struct CapabilityEvent {
    pub capability_id: String,
    /// Raw payload as reported by the device; heterogeneous on purpose.
    pub value: serde_json::Value,
}

/// One discovered device.
pub trait Device: Send {
    /// Stable device identifier (at most 36 characters).
    fn id(&self) -> &str;

    /// Open the live notification channel for this device.
    ///
    /// Blocks until the channel is established. A failure here is isolated to
    /// this device and reported to the caller; other devices are unaffected.
    /// The returned receiver yields events until the device side closes.
    fn connect(&mut self) -> Result<Receiver<CapabilityEvent>, String>;
}

/// The device registry itself.
pub trait DeviceRegistry: Send {
    /// Enumerate the full set of currently known devices.
    fn devices(&mut self) -> Result<Vec<Box<dyn Device>>, String>;

    /// Subscribe to "device created" announcements.
    ///
    /// Called once; the returned receiver yields a handle for every device
    /// that appears after the initial enumeration, until the registry closes.
    fn on_device_created(&mut self) -> Receiver<Box<dyn Device>>;
}
