//! # hearth-location
//!
//! Adaptive location tracking and geofencing core for a smart-home hub
//! companion. The crate decides when to track coarsely and when to track
//! intensively, filters the resulting samples and reports them to the hub.
//!
//! ## Architecture
//!
//! - **Collaborators**: the host implements [`Platform`] (location requests,
//!   geofences, Bluetooth, wake locks) and [`SettingsStore`]; the hub side is
//!   [`HubClient`], with [`HttpHubClient`] as the HTTP implementation.
//! - **Orchestrator**: [`LocationTracker`] owns all mutable state and
//!   consumes [`Event`]s from a single mailbox, so every trigger path is
//!   serialized.
//! - **Decision engine**: [`decision`] computes the high-accuracy mode from
//!   Bluetooth connections and geofence working sets, with self-clearing
//!   manual overrides.
//! - **Pipeline**: [`LocationPipeline`] applies the filter ladder (future,
//!   monotonic, age, duplicate, spacing) before anything reaches the hub.
//!
//! ## Example
//!
//! ```
//! use hearth_location::{LocationSample, LocationUpdate, ReportMode, Zone};
//!
//! let zones = vec![Zone::new("home", 51.5074, -0.1278, 100.0)];
//! let sample = LocationSample::new(51.5074, -0.1278, 15.0, 1_700_000_000_000);
//!
//! assert!(zones[0].contains_with_accuracy(sample.latitude, sample.longitude, sample.accuracy));
//! assert_eq!(LocationUpdate::named_zone("home").report_key(), "home");
//! assert_eq!(ReportMode::parse("zone_only"), Some(ReportMode::ZoneOnly));
//! ```

pub mod clock;
pub mod decision;
pub mod error;
pub mod geofence;
pub mod hub;
pub mod pipeline;
pub mod platform;
pub mod settings;
pub mod state;
pub mod tracker;
pub mod types;
pub mod zones;

pub use clock::{Clock, SystemClock};
pub use error::{Result, TrackingError};
pub use geofence::{GeofenceManager, RegistrationState};
pub use hub::{HttpHubClient, HubClient, HubVersion};
pub use pipeline::{LocationPipeline, PipelineOutcome, RejectReason, UpdateSource};
pub use platform::{
    is_bt_address, BluetoothDevice, LocationRequest, Platform, SingleFixRequest, WakeLock,
};
pub use settings::{InMemorySettings, LocationSettings, SensorId, SettingsStore};
pub use state::TrackingState;
pub use tracker::{Event, ForceCommand, LocationTracker, TrackerHandle};
pub use types::{
    GeofenceEvent, GeofenceRegion, LocationSample, LocationUpdate, ReportMode, Zone,
    ZoneTransition,
};
pub use zones::{zone_for_location, ZoneCache};
