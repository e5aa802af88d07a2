//! Shared test doubles: recording platform, scriptable hub, manual clock.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hearth_location::{
    BluetoothDevice, Clock, GeofenceRegion, HubClient, InMemorySettings, LocationRequest,
    LocationSample, LocationTracker, LocationUpdate, Platform, Result, SensorId, SettingsStore,
    SingleFixRequest, TrackingError, WakeLock, Zone,
};

/// Route log output through the test harness; honors `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Clock
// ============================================================================

pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

pub const START_MS: i64 = 1_700_000_000_000;

// ============================================================================
// Hub
// ============================================================================

pub struct FakeHub {
    pub zones: Mutex<Vec<Zone>>,
    pub updates: Mutex<Vec<LocationUpdate>>,
    pub events: Mutex<Vec<(String, serde_json::Value)>>,
    pub fail_updates: AtomicBool,
    pub fail_events: AtomicBool,
    pub fail_zones: AtomicBool,
    /// Whether the hub supports named-location (zone-only) reporting.
    pub supports_named_locations: AtomicBool,
}

impl FakeHub {
    pub fn new() -> Self {
        Self {
            zones: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            fail_updates: AtomicBool::new(false),
            fail_events: AtomicBool::new(false),
            fail_zones: AtomicBool::new(false),
            supports_named_locations: AtomicBool::new(true),
        }
    }

    pub fn with_zones(zones: Vec<Zone>) -> Self {
        let hub = Self::new();
        *hub.zones.lock().unwrap() = zones;
        hub
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl HubClient for FakeHub {
    async fn update_location(&self, update: &LocationUpdate) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(TrackingError::Network("hub unreachable".to_string()));
        }
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn fire_event(&self, event_type: &str, data: serde_json::Value) -> Result<()> {
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(TrackingError::Network("hub unreachable".to_string()));
        }
        self.events
            .lock()
            .unwrap()
            .push((event_type.to_string(), data));
        Ok(())
    }

    async fn get_zones(&self) -> Result<Vec<Zone>> {
        if self.fail_zones.load(Ordering::SeqCst) {
            return Err(TrackingError::Network("hub unreachable".to_string()));
        }
        Ok(self.zones.lock().unwrap().clone())
    }

    fn version_at_least(&self, major: u32, _minor: u32, _patch: u32) -> bool {
        self.supports_named_locations.load(Ordering::SeqCst) && major <= 2022
    }
}

// ============================================================================
// Platform
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    RequestLocationUpdates,
    RemoveLocationUpdates,
    RequestSingleFix,
    AddGeofences(Vec<String>),
    RemoveGeofences,
    StartHighAccuracy(i64),
    RestartHighAccuracy(i64),
    StopHighAccuracy,
    NotifyUser(String),
    RequestSensorUpdate(SensorId),
}

pub struct FakeWakeLock {
    held: Arc<AtomicBool>,
}

impl WakeLock for FakeWakeLock {
    fn release(&mut self) {
        self.held.store(false, Ordering::SeqCst);
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

pub struct FakePlatform {
    pub calls: Mutex<Vec<Call>>,
    pub denied: Mutex<HashSet<SensorId>>,
    pub bluetooth: Mutex<Vec<BluetoothDevice>>,
    pub fail_geofence_add: AtomicBool,
    /// Held flags of every wake lock handed out, in order.
    pub wake_locks: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            denied: Mutex::new(HashSet::new()),
            bluetooth: Mutex::new(Vec::new()),
            fail_geofence_add: AtomicBool::new(false),
            wake_locks: Mutex::new(Vec::new()),
        }
    }

    pub fn deny(&self, sensor: SensorId) {
        self.denied.lock().unwrap().insert(sensor);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Platform for FakePlatform {
    fn has_permission(&self, sensor: SensorId) -> bool {
        !self.denied.lock().unwrap().contains(&sensor)
    }

    fn request_location_updates(&self, _request: &LocationRequest) -> Result<()> {
        self.record(Call::RequestLocationUpdates);
        Ok(())
    }

    fn remove_location_updates(&self) -> Result<()> {
        self.record(Call::RemoveLocationUpdates);
        Ok(())
    }

    fn request_single_fix(&self, _request: &SingleFixRequest) -> Result<()> {
        self.record(Call::RequestSingleFix);
        Ok(())
    }

    fn add_geofences(&self, regions: &[GeofenceRegion]) -> Result<()> {
        if self.fail_geofence_add.load(Ordering::SeqCst) {
            return Err(TrackingError::PermissionDenied("geofencing unavailable"));
        }
        self.record(Call::AddGeofences(
            regions.iter().map(|r| r.id.clone()).collect(),
        ));
        Ok(())
    }

    fn remove_geofences(&self) -> Result<()> {
        self.record(Call::RemoveGeofences);
        Ok(())
    }

    fn start_high_accuracy_service(&self, interval_seconds: i64) -> Result<()> {
        self.record(Call::StartHighAccuracy(interval_seconds));
        Ok(())
    }

    fn restart_high_accuracy_service(&self, interval_seconds: i64) -> Result<()> {
        self.record(Call::RestartHighAccuracy(interval_seconds));
        Ok(())
    }

    fn stop_high_accuracy_service(&self) {
        self.record(Call::StopHighAccuracy);
    }

    fn bluetooth_devices(&self) -> Vec<BluetoothDevice> {
        self.bluetooth.lock().unwrap().clone()
    }

    fn acquire_wake_lock(&self, _tag: &str, _timeout_ms: u64) -> Option<Box<dyn WakeLock>> {
        let held = Arc::new(AtomicBool::new(true));
        self.wake_locks.lock().unwrap().push(held.clone());
        Some(Box::new(FakeWakeLock { held }))
    }

    fn notify_user(&self, message: &str) {
        self.record(Call::NotifyUser(message.to_string()));
    }

    fn request_sensor_update(&self, sensor: SensorId) {
        self.record(Call::RequestSensorUpdate(sensor));
    }
}

// ============================================================================
// Setup helpers
// ============================================================================

pub struct Harness {
    pub tracker: LocationTracker,
    pub hub: Arc<FakeHub>,
    pub platform: Arc<FakePlatform>,
    pub clock: Arc<ManualClock>,
    pub settings: Arc<InMemorySettings>,
}

/// Tracker wired to fakes, with background and zone tracking enabled and a
/// single "home" zone on the hub.
pub fn harness() -> Harness {
    harness_with_zones(vec![Zone::new("home", 51.5074, -0.1278, 100.0)])
}

pub fn harness_with_zones(zones: Vec<Zone>) -> Harness {
    init_logging();
    let hub = Arc::new(FakeHub::with_zones(zones));
    let platform = Arc::new(FakePlatform::new());
    let clock = Arc::new(ManualClock::new(START_MS));
    let settings = Arc::new(InMemorySettings::new());
    settings.set_enabled(SensorId::BackgroundLocation, true);
    settings.set_enabled(SensorId::ZoneLocation, true);

    let tracker = LocationTracker::new(
        settings.clone(),
        hub.clone(),
        platform.clone(),
        clock.clone(),
    );
    Harness {
        tracker,
        hub,
        platform,
        clock,
        settings,
    }
}

/// An accurate sample stamped at the clock's current time.
pub fn sample_at(clock: &ManualClock, latitude: f64, longitude: f64) -> LocationSample {
    LocationSample::new(latitude, longitude, 15.0, clock.now_ms())
}
