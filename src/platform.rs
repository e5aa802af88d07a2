//! Platform collaborator: the host OS facilities this core drives.
//!
//! Everything behind [`Platform`] is registration-style and non-blocking;
//! resulting callbacks come back into the core as [`crate::tracker::Event`]s
//! through the mailbox. Hosts implement this against their location and
//! geofencing facilities; tests use a recording fake.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::settings::SensorId;
use crate::types::{
    GeofenceRegion, DEFAULT_LOCATION_FAST_INTERVAL_MS, DEFAULT_LOCATION_INTERVAL_MS,
    DEFAULT_LOCATION_MAX_WAIT_MS, SINGLE_FIX_MAX_ATTEMPTS,
};

/// Parameters for a periodic low-power location request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRequest {
    pub interval_ms: i64,
    pub fastest_interval_ms: i64,
    pub max_wait_ms: i64,
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_LOCATION_INTERVAL_MS,
            fastest_interval_ms: DEFAULT_LOCATION_FAST_INTERVAL_MS,
            max_wait_ms: DEFAULT_LOCATION_MAX_WAIT_MS,
        }
    }
}

/// Parameters for a bounded single accurate fix burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleFixRequest {
    pub interval_ms: i64,
    pub fastest_interval_ms: i64,
    /// The platform self-cancels the burst after this many callbacks.
    pub max_updates: u32,
}

impl Default for SingleFixRequest {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            fastest_interval_ms: 5_000,
            max_updates: SINGLE_FIX_MAX_ATTEMPTS,
        }
    }
}

/// A Bluetooth device visible to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothDevice {
    pub address: String,
    pub name: String,
    pub connected: bool,
}

impl BluetoothDevice {
    pub fn new(address: &str, name: &str, connected: bool) -> Self {
        Self {
            address: address.to_string(),
            name: name.to_string(),
            connected,
        }
    }
}

/// Whether `value` is a well-formed Bluetooth hardware address
/// ("00:11:22:AA:BB:CC", uppercase hex).
pub fn is_bt_address(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 17 {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        if i % 3 == 2 {
            if b != b':' {
                return false;
            }
        } else if !(b.is_ascii_digit() || (b'A'..=b'F').contains(&b)) {
            return false;
        }
    }
    true
}

/// A partial wake lock held while a bounded burst runs.
pub trait WakeLock: Send {
    fn release(&mut self);
    fn is_held(&self) -> bool;
}

/// Host OS bridge. All calls are expected to return quickly; long-running
/// work happens on the platform side and is reported back as events.
pub trait Platform: Send + Sync {
    /// Whether the permissions required by the given sensor are granted.
    fn has_permission(&self, sensor: SensorId) -> bool;

    fn request_location_updates(&self, request: &LocationRequest) -> Result<()>;
    fn remove_location_updates(&self) -> Result<()>;

    /// Start a bounded high-accuracy burst for a single usable fix.
    fn request_single_fix(&self, request: &SingleFixRequest) -> Result<()>;

    /// Register the given circular regions. Registration is atomic: either
    /// all regions become active or none do.
    fn add_geofences(&self, regions: &[GeofenceRegion]) -> Result<()>;
    /// Remove every geofence registration. All-or-nothing, not per-zone.
    fn remove_geofences(&self) -> Result<()>;

    fn start_high_accuracy_service(&self, interval_seconds: i64) -> Result<()>;
    fn restart_high_accuracy_service(&self, interval_seconds: i64) -> Result<()>;
    fn stop_high_accuracy_service(&self);

    /// Snapshot of currently known Bluetooth devices.
    fn bluetooth_devices(&self) -> Vec<BluetoothDevice>;

    /// Acquire a partial wake lock with a hard timeout. `None` when the host
    /// has no power manager.
    fn acquire_wake_lock(&self, tag: &str, timeout_ms: u64) -> Option<Box<dyn WakeLock>>;

    /// Toast-style user notice, the only user-visible failure surface.
    fn notify_user(&self, message: &str);

    /// Ask the host to refresh another sensor out of band.
    fn request_sensor_update(&self, sensor: SensorId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bt_address_validation() {
        assert!(is_bt_address("00:11:22:AA:BB:CC"));
        assert!(is_bt_address("F0:99:B6:12:34:56"));
        assert!(!is_bt_address("00:11:22:aa:bb:cc")); // lowercase
        assert!(!is_bt_address("My Headphones"));
        assert!(!is_bt_address("00:11:22:AA:BB"));
        assert!(!is_bt_address("00-11-22-AA-BB-CC"));
    }

    #[test]
    fn test_default_requests() {
        let request = LocationRequest::default();
        assert_eq!(request.interval_ms, 60_000);
        assert_eq!(request.fastest_interval_ms, 30_000);
        assert_eq!(request.max_wait_ms, 200_000);

        let single = SingleFixRequest::default();
        assert_eq!(single.max_updates, 5);
    }
}
