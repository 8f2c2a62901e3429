//! Simulated device registry.
//!
//! Stands in for a real device source so the pipeline can run end to end
//! against a live TimescaleDB without hardware. Every simulated device emits
//! a plausible mix of capability changes (numeric readings, on/off toggles,
//! and an occasional non-numeric payload that the normalizer must filter
//! out), and one extra device is announced late to exercise the
//! device-created path.

use crate::registry::{CapabilityEvent, Device, DeviceRegistry};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

const DEVICE_NAMES: [&str; 8] = [
    "living-room-thermostat",
    "kitchen-plug",
    "bedroom-sensor",
    "office-dimmer",
    "bathroom-fan",
    "hallway-motion",
    "garage-door",
    "greenhouse-probe",
];

const LATE_DEVICE_NAME: &str = "late-arrival-sensor";
const LATE_DEVICE_DELAY: Duration = Duration::from_secs(30);

pub struct SimulatedRegistry {
    device_count: usize,
    interval: Duration,
}

impl SimulatedRegistry {
    /// `device_count` is capped at the built-in name list; `interval` is the
    /// mean pause between capability changes per device.
    pub fn new(device_count: usize, interval: Duration) -> Self {
        SimulatedRegistry {
            device_count: device_count.min(DEVICE_NAMES.len()),
            interval,
        }
    }
}

impl DeviceRegistry for SimulatedRegistry {
    fn devices(&mut self) -> Result<Vec<Box<dyn Device>>, String> {
        Ok((0..self.device_count)
            .map(|i| {
                Box::new(SimulatedDevice::new(DEVICE_NAMES[i], i as u64, self.interval)) as Box<dyn Device>
            })
            .collect())
    }

    fn on_device_created(&mut self) -> Receiver<Box<dyn Device>> {
        let (tx, rx) = mpsc::channel();
        let interval = self.interval;
        let seed = self.device_count as u64;
        thread::spawn(move || {
            thread::sleep(LATE_DEVICE_DELAY);
            let device = SimulatedDevice::new(LATE_DEVICE_NAME, seed, interval);
            let _ = tx.send(Box::new(device) as Box<dyn Device>);
            // sender drops here; no further announcements
        });
        rx
    }
}

struct SimulatedDevice {
    id: String,
    seed: u64,
    interval: Duration,
}

impl SimulatedDevice {
    fn new(id: &str, seed: u64, interval: Duration) -> Self {
        SimulatedDevice {
            id: id.to_string(),
            seed,
            interval,
        }
    }
}

impl Device for SimulatedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(&mut self) -> Result<Receiver<CapabilityEvent>, String> {
        let (tx, rx) = mpsc::channel();
        let mut rng = SmallRng::seed_from_u64(0x4845_5900 ^ self.seed);
        let interval = self.interval;
        thread::spawn(move || {
            let mut temperature: f64 = rng.random_range(18.0..23.0);
            let mut on = false;
            loop {
                // random walk keeps consecutive readings plausible
                temperature += rng.random_range(-0.4..=0.4);
                temperature = temperature.clamp(12.0, 30.0);

                let event = match rng.random_range(0..10) {
                    0..=3 => CapabilityEvent {
                        capability_id: "measure_temperature".to_string(),
                        value: json!((temperature * 10.0).round() / 10.0),
                    },
                    4..=6 => CapabilityEvent {
                        capability_id: "measure_humidity".to_string(),
                        value: json!(rng.random_range(30..70)),
                    },
                    7..=8 => {
                        on = !on;
                        CapabilityEvent {
                            capability_id: "onoff".to_string(),
                            value: json!(on),
                        }
                    }
                    // non-numeric payload: must be filtered by the normalizer
                    _ => CapabilityEvent {
                        capability_id: "sensor_note".to_string(),
                        value: json!("calibration ok"),
                    },
                };

                if tx.send(event).is_err() {
                    break;
                }
                let jitter = rng.random_range(0.5..1.5);
                thread::sleep(interval.mul_f64(jitter));
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerates_the_requested_number_of_devices() {
        let mut registry = SimulatedRegistry::new(3, Duration::from_secs(1));
        let devices = registry.devices().unwrap();
        assert_eq!(devices.len(), 3);

        let mut ids: Vec<&str> = devices.iter().map(|d| d.id()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn device_count_is_capped_at_the_name_list() {
        let mut registry = SimulatedRegistry::new(100, Duration::from_secs(1));
        assert_eq!(registry.devices().unwrap().len(), DEVICE_NAMES.len());
    }

    #[test]
    fn connected_devices_emit_events() {
        let mut registry = SimulatedRegistry::new(1, Duration::from_millis(1));
        let mut devices = registry.devices().unwrap();
        let events = devices[0].connect().unwrap();

        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!event.capability_id.is_empty());
    }
}
