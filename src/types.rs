//! Core data model: zones, location samples, hub payloads and the timing
//! constants shared across the tracking pipeline.

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default minimum horizontal accuracy (meters) for accepting a sample.
pub const DEFAULT_MINIMUM_ACCURACY_METERS: i64 = 200;
/// Default and minimum high-accuracy polling interval (seconds).
pub const DEFAULT_HIGH_ACCURACY_INTERVAL_SECONDS: i64 = 5;
/// Default extra radius (meters) for expanded geofences.
pub const DEFAULT_TRIGGER_RANGE_METERS: i64 = 300;
/// Default spacing (ms) between single accurate fix requests.
pub const DEFAULT_ACCURATE_UPDATE_SPACING_MS: i64 = 60_000;

/// Low-power periodic request interval (ms).
pub const DEFAULT_LOCATION_INTERVAL_MS: i64 = 60_000;
/// Low-power fastest delivery interval (ms).
pub const DEFAULT_LOCATION_FAST_INTERVAL_MS: i64 = 30_000;
/// Low-power max batching wait (ms). Staleness detection uses 2x this.
pub const DEFAULT_LOCATION_MAX_WAIT_MS: i64 = 200_000;

/// Zone cache time-to-live (4 hours).
pub const ZONE_CACHE_TTL_MS: i64 = 4 * 60 * 60 * 1000;

/// Samples older than this are always rejected.
pub const MAX_SAMPLE_AGE_MS: i64 = 300_000;
/// Window during which a repeated report key is suppressed.
pub const DUPLICATE_SUPPRESSION_WINDOW_MS: i64 = 900_000;
/// Minimum spacing between routine low-power sends.
pub const MIN_UPDATE_SPACING_MS: i64 = 5_000;
/// Tolerated clock skew for samples stamped in the future.
pub const FUTURE_TOLERANCE_MS: i64 = 5_000;

/// Retry bound for the single accurate fix flow.
pub const SINGLE_FIX_MAX_ATTEMPTS: u32 = 5;
/// Hard ceiling on the wake lock held during a single accurate fix.
pub const SINGLE_FIX_WAKE_LOCK_MS: u64 = 10 * 60 * 1000;

/// Report key used when no zone contains the sample in zone-only mode.
pub const ZONE_NAME_NOT_HOME: &str = "not_home";
/// Identifier suffix for expanded geofence registrations.
pub const EXPANDED_ZONE_SUFFIX: &str = "_expanded";

// ============================================================================
// Zones
// ============================================================================

/// A named circular geographic region reported by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Radius in meters.
    pub radius: f64,
    /// Passive zones are excluded from zone-only location reporting.
    #[serde(default)]
    pub passive: bool,
}

impl Zone {
    pub fn new(id: &str, latitude: f64, longitude: f64, radius: f64) -> Self {
        Self {
            id: id.to_string(),
            latitude,
            longitude,
            radius,
            passive: false,
        }
    }

    /// Whether the given point falls inside the zone, widened by the sample's
    /// accuracy radius.
    pub fn contains_with_accuracy(&self, latitude: f64, longitude: f64, accuracy: f64) -> bool {
        let center = Point::new(self.longitude, self.latitude);
        let point = Point::new(longitude, latitude);
        Haversine::distance(center, point) <= self.radius + accuracy.max(0.0)
    }

    /// Identifier of the expanded geofence registration for this zone.
    pub fn expanded_id(&self) -> String {
        format!("{}{}", self.id, EXPANDED_ZONE_SUFFIX)
    }
}

/// A platform-level circular trigger region derived from a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceRegion {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
}

/// Direction of a geofence boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneTransition {
    Enter,
    Exit,
}

impl ZoneTransition {
    /// Hub event type fired for this transition.
    pub fn event_type(&self) -> &'static str {
        match self {
            ZoneTransition::Enter => "zone_entered",
            ZoneTransition::Exit => "zone_exited",
        }
    }
}

/// A geofence callback delivered by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceEvent {
    pub transition: ZoneTransition,
    /// Registration identifiers that triggered, base or expanded.
    pub zone_ids: Vec<String>,
    pub location: Option<LocationSample>,
    /// Set when the platform delivered an errored callback.
    pub error_code: Option<i32>,
}

// ============================================================================
// Location samples and hub payloads
// ============================================================================

/// A raw location fix from the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters.
    pub accuracy: f64,
    /// Speed in m/s.
    pub speed: f64,
    /// Bearing in degrees.
    pub bearing: f64,
    /// Altitude in meters.
    pub altitude: f64,
    /// Vertical accuracy in meters.
    pub vertical_accuracy: f64,
    pub provider: String,
    /// Fix timestamp, epoch milliseconds.
    pub time_ms: i64,
}

impl LocationSample {
    /// Minimal sample with the remaining fields zeroed.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, time_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            speed: 0.0,
            bearing: 0.0,
            altitude: 0.0,
            vertical_accuracy: 0.0,
            provider: "fused".to_string(),
            time_ms,
        }
    }
}

/// How accepted samples are reported to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Exact GPS coordinates plus accuracy, speed, bearing and altitude.
    Exact,
    /// Only the name of the containing zone.
    ZoneOnly,
}

impl ReportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportMode::Exact => "exact",
            ReportMode::ZoneOnly => "zone_only",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(ReportMode::Exact),
            "zone_only" => Some(ReportMode::ZoneOnly),
            _ => None,
        }
    }
}

/// `update_location` payload sent to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_accuracy: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_accuracy: Option<i64>,
}

impl LocationUpdate {
    /// Exact GPS payload for a sample.
    pub fn exact(sample: &LocationSample) -> Self {
        Self {
            gps: Some([sample.latitude, sample.longitude]),
            gps_accuracy: Some((sample.accuracy.max(0.0)) as i64),
            location_name: None,
            speed: Some(sample.speed as i64),
            altitude: Some(sample.altitude as i64),
            course: Some(sample.bearing as i64),
            vertical_accuracy: Some(sample.vertical_accuracy as i64),
        }
    }

    /// Zone-only payload carrying just the zone name.
    pub fn named_zone(name: &str) -> Self {
        Self {
            gps: None,
            gps_accuracy: None,
            location_name: Some(name.to_string()),
            speed: None,
            altitude: None,
            course: None,
            vertical_accuracy: None,
        }
    }

    /// The dedup identity of this update: the zone name in zone-only mode,
    /// otherwise the literal coordinate pair.
    pub fn report_key(&self) -> String {
        if let Some(name) = &self.location_name {
            name.clone()
        } else if let Some(gps) = &self.gps {
            format!("[{}, {}]", gps[0], gps[1])
        } else {
            String::new()
        }
    }
}
