//! Geofence manager: platform region registrations and zone transitions.
//!
//! The platform's geofencing facility cannot update registrations in place,
//! so configuration changes always clear-then-rebuild. The registration
//! lifecycle is an explicit state machine:
//!
//! `Unregistered -> Registered -> Unregistered` on teardown, or
//! `Registered -> Stale -> Unregistered -> Registered` when the trigger
//! range or zone list changes.

use std::collections::{BTreeSet, HashSet};

use log::{debug, error, warn};
use serde_json::json;

use crate::error::{Result, TrackingError};
use crate::hub::HubClient;
use crate::platform::Platform;
use crate::settings::{LocationSettings, SensorId};
use crate::types::{GeofenceEvent, GeofenceRegion, Zone, ZoneTransition};
use crate::zones::ZoneCache;

/// Registration lifecycle of the geofence configuration as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered {
        zone_ids: BTreeSet<String>,
        trigger_range: i64,
    },
    /// Configuration changed; registrations still exist but must be
    /// cleared and rebuilt.
    Stale,
}

/// Registers and removes circular regions and applies transition events.
pub struct GeofenceManager {
    state: RegistrationState,
}

impl Default for GeofenceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl GeofenceManager {
    pub fn new() -> Self {
        Self {
            state: RegistrationState::Unregistered,
        }
    }

    pub fn state(&self) -> &RegistrationState {
        &self.state
    }

    pub fn is_registered(&self) -> bool {
        matches!(self.state, RegistrationState::Registered { .. })
    }

    /// Flag the current registration as needing a rebuild.
    pub fn mark_stale(&mut self) {
        if self.is_registered() {
            self.state = RegistrationState::Stale;
        }
    }

    /// Fetch zones (forced refresh) and register one region per zone, plus
    /// an expanded region for high-accuracy zones when a trigger range is
    /// configured. No-op when already registered; registration is atomic.
    pub async fn request_zone_updates(
        &mut self,
        platform: &dyn Platform,
        cache: &mut ZoneCache,
        settings: &LocationSettings,
        now_ms: i64,
    ) {
        if !platform.has_permission(SensorId::ZoneLocation) {
            warn!("[Geofence] Not registering for zone updates because of permissions");
            return;
        }
        if self.is_registered() {
            warn!("[Geofence] Not registering for zones as we already have");
            return;
        }

        debug!("[Geofence] Registering for zone based location updates");

        let zones = cache.get_zones(true, now_ms).await;
        let trigger_range = settings.trigger_range_meters();
        let high_accuracy_zones = settings.high_accuracy_zones(false);
        let regions = build_regions(&zones, trigger_range, &high_accuracy_zones);

        match platform.add_geofences(&regions) {
            Ok(()) => {
                self.state = RegistrationState::Registered {
                    zone_ids: zones.iter().map(|z| z.id.clone()).collect(),
                    trigger_range,
                };
            }
            Err(e) => {
                // Left unregistered; the next reconciliation retries.
                error!("[Geofence] Issue requesting zone updates: {}", e);
            }
        }
    }

    /// Remove every geofence registration and clear the working sets.
    pub fn remove_update_requests(
        &mut self,
        platform: &dyn Platform,
        entered_zones: &mut HashSet<String>,
        exited_zones: &mut HashSet<String>,
    ) {
        debug!("[Geofence] Removing geofence location requests");
        if let Err(e) = platform.remove_geofences() {
            error!("[Geofence] Failed to remove geofences: {}", e);
        }
        self.state = RegistrationState::Unregistered;
        entered_zones.clear();
        exited_zones.clear();
    }

    /// Validate a platform callback, update the working sets and fire one
    /// hub event per triggering zone. Event delivery failures are logged and
    /// surfaced only as a user notice.
    pub async fn handle_transition_event(
        &mut self,
        hub: &dyn HubClient,
        platform: &dyn Platform,
        event: &GeofenceEvent,
        entered_zones: &mut HashSet<String>,
        exited_zones: &mut HashSet<String>,
    ) -> Result<()> {
        if let Some(code) = event.error_code {
            return Err(TrackingError::InvalidPlatformEvent(format!(
                "geofence callback error code {}",
                code
            )));
        }
        let location = event.location.as_ref().ok_or_else(|| {
            TrackingError::InvalidPlatformEvent("geofence event without location".to_string())
        })?;

        for zone_id in &event.zone_ids {
            apply_transition(event.transition, zone_id, entered_zones, exited_zones);

            let attributes = json!({
                "accuracy": location.accuracy,
                "altitude": location.altitude,
                "bearing": location.bearing,
                "latitude": location.latitude,
                "longitude": location.longitude,
                "provider": location.provider,
                "time": location.time_ms,
                "vertical_accuracy": location.vertical_accuracy as i64,
                "zone": zone_id,
            });
            match hub
                .fire_event(event.transition.event_type(), attributes)
                .await
            {
                Ok(()) => debug!("[Geofence] {} event sent to hub", event.transition.event_type()),
                Err(e) => {
                    error!("[Geofence] Unable to send zone event to hub: {}", e);
                    platform.notify_user("Unable to send zone transition to the hub");
                }
            }
        }

        Ok(())
    }
}

/// Derive platform regions from the zone list: one base region per zone and
/// one expanded region per configured high-accuracy zone when the trigger
/// range is positive.
pub fn build_regions(
    zones: &[Zone],
    trigger_range: i64,
    high_accuracy_zone_ids: &[String],
) -> Vec<GeofenceRegion> {
    let mut regions = Vec::with_capacity(zones.len());
    for zone in zones {
        regions.push(GeofenceRegion {
            id: zone.id.clone(),
            latitude: zone.latitude,
            longitude: zone.longitude,
            radius: zone.radius,
        });
        if trigger_range > 0 && high_accuracy_zone_ids.iter().any(|id| id == &zone.id) {
            regions.push(GeofenceRegion {
                id: zone.expanded_id(),
                latitude: zone.latitude,
                longitude: zone.longitude,
                radius: zone.radius + trigger_range as f64,
            });
        }
    }
    regions
}

/// Apply a single transition to the working sets; the last transition per
/// zone wins.
pub fn apply_transition(
    transition: ZoneTransition,
    zone_id: &str,
    entered_zones: &mut HashSet<String>,
    exited_zones: &mut HashSet<String>,
) {
    match transition {
        ZoneTransition::Enter => {
            entered_zones.insert(zone_id.to_string());
            exited_zones.remove(zone_id);
        }
        ZoneTransition::Exit => {
            exited_zones.insert(zone_id.to_string());
            entered_zones.remove(zone_id);
        }
    }
}
