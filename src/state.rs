//! Process-wide tracking state.
//!
//! One instance is owned by the tracker task and mutated only from there;
//! the mailbox gives every trigger path sequential access, making the
//! single-consumer invariant explicit.

use std::collections::{BTreeSet, HashSet};

use crate::types::DEFAULT_HIGH_ACCURACY_INTERVAL_SECONDS;

/// Mutable state shared by all trigger paths.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingState {
    /// Whether periodic background location requests are believed active.
    pub background_tracking_active: bool,
    /// Whether geofence registrations are believed active.
    pub zone_tracking_active: bool,

    /// Current effective high-accuracy mode.
    pub high_accuracy_active: bool,
    /// Interval last applied to the high-accuracy service.
    pub high_accuracy_interval_seconds: i64,

    /// Manual overrides; mutually exclusive, self-clearing.
    pub force_on: bool,
    pub force_off: bool,

    /// Receipt time of the last platform location callback.
    pub last_location_received_ms: i64,
    /// Wall-clock time of the last successful dispatch decision.
    pub last_location_sent_at_ms: i64,
    /// Fix timestamp of the last accepted sample (monotonic acceptance).
    pub last_sent_sample_time_ms: i64,
    /// Report key of the last accepted sample.
    pub last_sent_location_key: String,
    /// When the last single accurate fix was requested.
    pub last_accurate_request_ms: i64,

    /// Zones currently considered entered, per geofence transitions.
    pub entered_zones: HashSet<String>,
    /// Zones currently considered exited.
    pub exited_zones: HashSet<String>,

    /// Last-applied geofence configuration, used to detect rebuilds.
    pub last_trigger_range_meters: i64,
    pub last_configured_zone_ids: BTreeSet<String>,
}

impl Default for TrackingState {
    fn default() -> Self {
        Self {
            background_tracking_active: false,
            zone_tracking_active: false,
            high_accuracy_active: false,
            high_accuracy_interval_seconds: DEFAULT_HIGH_ACCURACY_INTERVAL_SECONDS,
            force_on: false,
            force_off: false,
            last_location_received_ms: 0,
            last_location_sent_at_ms: 0,
            last_sent_sample_time_ms: 0,
            last_sent_location_key: String::new(),
            last_accurate_request_ms: 0,
            entered_zones: HashSet::new(),
            exited_zones: HashSet::new(),
            last_trigger_range_meters: 0,
            last_configured_zone_ids: BTreeSet::new(),
        }
    }
}

impl TrackingState {
    pub fn new() -> Self {
        Self::default()
    }
}
