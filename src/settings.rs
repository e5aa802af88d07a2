//! Settings store collaborator and typed accessors.
//!
//! The store itself is external: per logical sensor it persists enable flags
//! and string key/value settings. [`LocationSettings`] layers the typed
//! getters on top, applying defaults and floors. Out-of-range values are
//! reset persistently so the stored value and the effective value agree.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use log::warn;

use crate::types::{
    ReportMode, DEFAULT_ACCURATE_UPDATE_SPACING_MS, DEFAULT_HIGH_ACCURACY_INTERVAL_SECONDS,
    DEFAULT_MINIMUM_ACCURACY_METERS, DEFAULT_TRIGGER_RANGE_METERS, EXPANDED_ZONE_SUFFIX,
};

// Setting keys, scoped per sensor.
pub const SETTING_SEND_LOCATION_AS: &str = "location_send_as";
pub const SETTING_ACCURACY: &str = "location_minimum_accuracy";
pub const SETTING_ACCURATE_UPDATE_TIME: &str = "location_minimum_time_updates";
pub const SETTING_HIGH_ACCURACY_MODE: &str = "high_accuracy_mode";
pub const SETTING_HIGH_ACCURACY_UPDATE_INTERVAL: &str = "high_accuracy_update_interval";
pub const SETTING_HIGH_ACCURACY_BT_DEVICES: &str = "high_accuracy_bt_devices";
pub const SETTING_HIGH_ACCURACY_ZONES: &str = "high_accuracy_zones";
pub const SETTING_HIGH_ACCURACY_TRIGGER_RANGE: &str = "high_accuracy_trigger_range";
pub const SETTING_HIGH_ACCURACY_BT_ZONE_COMBINED: &str = "high_accuracy_bt_zone_combined";
pub const SETTING_INCLUDE_LOCATION: &str = "include_location";

/// Logical sensors this core reads settings for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorId {
    BackgroundLocation,
    ZoneLocation,
    AccurateLocation,
    GeocodedLocation,
}

impl SensorId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorId::BackgroundLocation => "location_background",
            SensorId::ZoneLocation => "location_zone",
            SensorId::AccurateLocation => "location_accurate",
            SensorId::GeocodedLocation => "geocoded_location",
        }
    }
}

/// Typed key-value persistence scoped per logical sensor.
pub trait SettingsStore: Send + Sync {
    fn is_enabled(&self, sensor: SensorId) -> bool;
    fn set_enabled(&self, sensor: SensorId, enabled: bool);
    fn get(&self, sensor: SensorId, key: &str) -> Option<String>;
    fn set(&self, sensor: SensorId, key: &str, value: &str);
}

/// Mutex-guarded in-memory store. Used in tests and as a default backing
/// store when the host has nothing better to offer.
#[derive(Debug, Default)]
pub struct InMemorySettings {
    values: Mutex<HashMap<(SensorId, String), String>>,
    enabled: Mutex<HashSet<SensorId>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for InMemorySettings {
    fn is_enabled(&self, sensor: SensorId) -> bool {
        self.enabled.lock().expect("settings lock").contains(&sensor)
    }

    fn set_enabled(&self, sensor: SensorId, enabled: bool) {
        let mut set = self.enabled.lock().expect("settings lock");
        if enabled {
            set.insert(sensor);
        } else {
            set.remove(&sensor);
        }
    }

    fn get(&self, sensor: SensorId, key: &str) -> Option<String> {
        self.values
            .lock()
            .expect("settings lock")
            .get(&(sensor, key.to_string()))
            .cloned()
    }

    fn set(&self, sensor: SensorId, key: &str, value: &str) {
        self.values
            .lock()
            .expect("settings lock")
            .insert((sensor, key.to_string()), value.to_string());
    }
}

/// Typed accessors over the settings store for the location sensors.
#[derive(Clone)]
pub struct LocationSettings {
    store: Arc<dyn SettingsStore>,
}

impl LocationSettings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    fn get_i64(&self, sensor: SensorId, key: &str, default: i64) -> i64 {
        match self.store.get(sensor, key) {
            Some(value) => value.trim().parse().unwrap_or(default),
            None => {
                // Seed the default so the setting is visible to the user.
                self.store.set(sensor, key, &default.to_string());
                default
            }
        }
    }

    fn get_bool(&self, sensor: SensorId, key: &str) -> bool {
        self.store
            .get(sensor, key)
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    pub fn background_enabled(&self) -> bool {
        self.store.is_enabled(SensorId::BackgroundLocation)
    }

    pub fn zone_enabled(&self) -> bool {
        self.store.is_enabled(SensorId::ZoneLocation)
    }

    pub fn accurate_enabled(&self) -> bool {
        self.store.is_enabled(SensorId::AccurateLocation)
    }

    /// Minimum horizontal accuracy (meters) for the given sensor.
    pub fn minimum_accuracy(&self, sensor: SensorId) -> f64 {
        self.get_i64(sensor, SETTING_ACCURACY, DEFAULT_MINIMUM_ACCURACY_METERS) as f64
    }

    /// Minimum spacing between single accurate fix requests (ms).
    pub fn accurate_update_spacing_ms(&self) -> i64 {
        self.get_i64(
            SensorId::AccurateLocation,
            SETTING_ACCURATE_UPDATE_TIME,
            DEFAULT_ACCURATE_UPDATE_SPACING_MS,
        )
    }

    pub fn high_accuracy_enabled(&self) -> bool {
        self.get_bool(SensorId::BackgroundLocation, SETTING_HIGH_ACCURACY_MODE)
    }

    pub fn set_high_accuracy_enabled(&self, enabled: bool) {
        self.store.set(
            SensorId::BackgroundLocation,
            SETTING_HIGH_ACCURACY_MODE,
            if enabled { "true" } else { "false" },
        );
    }

    /// High-accuracy polling interval in seconds, floored at 5. Values below
    /// the floor are reset to the default persistently.
    pub fn high_accuracy_interval_seconds(&self) -> i64 {
        let interval = self.get_i64(
            SensorId::BackgroundLocation,
            SETTING_HIGH_ACCURACY_UPDATE_INTERVAL,
            DEFAULT_HIGH_ACCURACY_INTERVAL_SECONDS,
        );
        if interval < DEFAULT_HIGH_ACCURACY_INTERVAL_SECONDS {
            warn!(
                "[Settings] High accuracy interval {}s below floor, resetting to {}s",
                interval, DEFAULT_HIGH_ACCURACY_INTERVAL_SECONDS
            );
            self.set_high_accuracy_interval_seconds(DEFAULT_HIGH_ACCURACY_INTERVAL_SECONDS);
            return DEFAULT_HIGH_ACCURACY_INTERVAL_SECONDS;
        }
        interval
    }

    pub fn set_high_accuracy_interval_seconds(&self, interval: i64) {
        self.store.set(
            SensorId::BackgroundLocation,
            SETTING_HIGH_ACCURACY_UPDATE_INTERVAL,
            &interval.to_string(),
        );
    }

    /// Configured Bluetooth device addresses or names, comma separated.
    pub fn bt_devices(&self) -> Vec<String> {
        split_list(
            &self
                .store
                .get(SensorId::BackgroundLocation, SETTING_HIGH_ACCURACY_BT_DEVICES)
                .unwrap_or_default(),
        )
    }

    pub fn set_bt_devices(&self, devices: &[String]) {
        self.store.set(
            SensorId::BackgroundLocation,
            SETTING_HIGH_ACCURACY_BT_DEVICES,
            &devices.join(", "),
        );
    }

    pub fn bt_zone_combined(&self) -> bool {
        self.get_bool(
            SensorId::BackgroundLocation,
            SETTING_HIGH_ACCURACY_BT_ZONE_COMBINED,
        )
    }

    /// Zone ids configured for high-accuracy triggering. Empty when zone
    /// tracking is disabled. With `expanded` the ids carry the expanded
    /// registration suffix.
    pub fn high_accuracy_zones(&self, expanded: bool) -> Vec<String> {
        if !self.zone_enabled() {
            return Vec::new();
        }
        let zones = split_list(
            &self
                .store
                .get(SensorId::BackgroundLocation, SETTING_HIGH_ACCURACY_ZONES)
                .unwrap_or_default(),
        );
        if expanded {
            zones
                .into_iter()
                .map(|z| format!("{}{}", z, EXPANDED_ZONE_SUFFIX))
                .collect()
        } else {
            zones
        }
    }

    /// Extra radius (meters) for expanded geofences. Zero when zone tracking
    /// is disabled; negative values are reset to the default persistently.
    pub fn trigger_range_meters(&self) -> i64 {
        if !self.zone_enabled() {
            return 0;
        }
        let range = self.get_i64(
            SensorId::BackgroundLocation,
            SETTING_HIGH_ACCURACY_TRIGGER_RANGE,
            DEFAULT_TRIGGER_RANGE_METERS,
        );
        if range < 0 {
            warn!(
                "[Settings] Trigger range {}m is negative, resetting to {}m",
                range, DEFAULT_TRIGGER_RANGE_METERS
            );
            self.store.set(
                SensorId::BackgroundLocation,
                SETTING_HIGH_ACCURACY_TRIGGER_RANGE,
                &DEFAULT_TRIGGER_RANGE_METERS.to_string(),
            );
            return DEFAULT_TRIGGER_RANGE_METERS;
        }
        range
    }

    /// Location report mode. Zone-only reporting requires hub support
    /// (version >= 2022.2.0); older hubs always get exact reports.
    pub fn report_mode(&self, named_locations_supported: bool) -> ReportMode {
        if !named_locations_supported {
            return ReportMode::Exact;
        }
        self.store
            .get(SensorId::BackgroundLocation, SETTING_SEND_LOCATION_AS)
            .and_then(|v| ReportMode::parse(&v))
            .unwrap_or(ReportMode::Exact)
    }

    pub fn set_report_mode(&self, mode: ReportMode) {
        self.store.set(
            SensorId::BackgroundLocation,
            SETTING_SEND_LOCATION_AS,
            mode.as_str(),
        );
    }

    /// Whether the geocoded-location sensor wants a refresh after each send.
    pub fn geocode_includes_location(&self) -> bool {
        self.get_bool(SensorId::GeocodedLocation, SETTING_INCLUDE_LOCATION)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}
