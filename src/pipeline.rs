//! Location update pipeline: filtering, dedup and hub dispatch.
//!
//! Samples that survive the filter ladder update the tracking state and are
//! reported to the hub; report failures are logged and swallowed so the next
//! natural sample can try again.

use std::sync::Arc;

use log::{debug, error, warn};

use crate::clock::Clock;
use crate::hub::HubClient;
use crate::platform::Platform;
use crate::settings::{LocationSettings, SensorId};
use crate::state::TrackingState;
use crate::types::{
    LocationSample, LocationUpdate, ReportMode, Zone, DUPLICATE_SUPPRESSION_WINDOW_MS,
    FUTURE_TOLERANCE_MS, MAX_SAMPLE_AGE_MS, MIN_UPDATE_SPACING_MS, ZONE_NAME_NOT_HOME,
};
use crate::zones::zone_for_location;

/// Where a sample came from; geofence-triggered and high-accuracy samples
/// are exempt from the routine spacing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Background,
    HighAccuracy,
    Geofence,
    SingleFix,
}

impl UpdateSource {
    fn is_geofence(&self) -> bool {
        matches!(self, UpdateSource::Geofence)
    }
}

/// Why a sample was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Timestamp too far in the future outside high-accuracy mode.
    FromFuture,
    /// Older than the last accepted sample's timestamp.
    BeforeLastSent,
    /// Older than the hard age cutoff.
    TooOld,
    /// Same report key inside the suppression window.
    Duplicate,
    /// Routine update inside the minimum spacing window.
    Throttled,
}

/// Result of pushing one sample through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Sent { key: String },
    /// Accepted but the hub report failed; state was still advanced.
    SendFailed { key: String },
    Rejected(RejectReason),
}

/// Builds the hub payload for a sample under the given report mode.
pub(crate) fn build_update(
    zones: &[Zone],
    sample: &LocationSample,
    mode: ReportMode,
) -> LocationUpdate {
    match mode {
        ReportMode::Exact => LocationUpdate::exact(sample),
        ReportMode::ZoneOnly => {
            let name = zone_for_location(zones, sample)
                .map(|zone| zone.id.as_str())
                .unwrap_or(ZONE_NAME_NOT_HOME);
            LocationUpdate::named_zone(name)
        }
    }
}

/// The filtering and dispatch stage shared by every location source.
pub struct LocationPipeline {
    hub: Arc<dyn HubClient>,
    platform: Arc<dyn Platform>,
    settings: LocationSettings,
    clock: Arc<dyn Clock>,
}

impl LocationPipeline {
    pub fn new(
        hub: Arc<dyn HubClient>,
        platform: Arc<dyn Platform>,
        settings: LocationSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            hub,
            platform,
            settings,
            clock,
        }
    }

    /// Apply the filter ladder to one sample and forward it on acceptance.
    ///
    /// `zones` is only consulted in zone-only report mode and may be empty
    /// otherwise.
    pub async fn process(
        &self,
        state: &mut TrackingState,
        zones: &[Zone],
        sample: &LocationSample,
        source: UpdateSource,
    ) -> PipelineOutcome {
        let mode = self
            .settings
            .report_mode(self.hub.version_at_least(2022, 2, 0));
        let update = build_update(zones, sample, mode);
        let key = update.report_key();

        let now = self.clock.now_ms();
        let high_accuracy = state.high_accuracy_active;

        debug!(
            "[Pipeline] Evaluating sample at ({}, {}) key={} source={:?}",
            sample.latitude, sample.longitude, key, source
        );

        // Future timestamps are tolerated during high-accuracy bursts where
        // clock skew and batching are known behavior.
        if now + FUTURE_TOLERANCE_MS < sample.time_ms && !high_accuracy {
            debug!(
                "[Pipeline] Skipping location update that came from the future ({} > {})",
                sample.time_ms,
                now + FUTURE_TOLERANCE_MS
            );
            return PipelineOutcome::Rejected(RejectReason::FromFuture);
        }

        // Strictly monotonic acceptance per stream.
        if sample.time_ms < state.last_sent_sample_time_ms {
            debug!(
                "[Pipeline] Skipping old location update, received {} last accepted {}",
                sample.time_ms, state.last_sent_sample_time_ms
            );
            return PipelineOutcome::Rejected(RejectReason::BeforeLastSent);
        }

        let age = now - sample.time_ms;
        if age >= MAX_SAMPLE_AGE_MS {
            debug!(
                "[Pipeline] Skipping location update due to old timestamp ({}ms old)",
                age
            );
            return PipelineOutcome::Rejected(RejectReason::TooOld);
        }

        if key == state.last_sent_location_key {
            if now < state.last_location_sent_at_ms + DUPLICATE_SUPPRESSION_WINDOW_MS {
                debug!("[Pipeline] Duplicate location received, not forwarding");
                return PipelineOutcome::Rejected(RejectReason::Duplicate);
            }
        } else if now < state.last_location_sent_at_ms + MIN_UPDATE_SPACING_MS
            && !source.is_geofence()
            && !high_accuracy
        {
            debug!("[Pipeline] New location update not possible within spacing window");
            return PipelineOutcome::Rejected(RejectReason::Throttled);
        }

        state.last_location_sent_at_ms = now;
        state.last_sent_sample_time_ms = sample.time_ms;
        state.last_sent_location_key = key.clone();

        match self.hub.update_location(&update).await {
            Ok(()) => {
                debug!("[Pipeline] Location update sent as {}", mode.as_str());
                if self.settings.geocode_includes_location() {
                    self.platform.request_sensor_update(SensorId::GeocodedLocation);
                }
                PipelineOutcome::Sent { key }
            }
            Err(e) => {
                error!("[Pipeline] Could not update location: {}", e);
                PipelineOutcome::SendFailed { key }
            }
        }
    }
}

/// Accuracy gate applied at the event edge, before the pipeline proper.
/// Returns true when the sample meets the configured minimum.
pub(crate) fn meets_minimum_accuracy(
    settings: &LocationSettings,
    sensor: SensorId,
    sample: &LocationSample,
) -> bool {
    let minimum = settings.minimum_accuracy(sensor);
    if sample.accuracy > minimum {
        warn!(
            "[Pipeline] Location accuracy {}m over minimum {}m",
            sample.accuracy, minimum
        );
        false
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Zone;

    #[test]
    fn test_build_update_zone_only() {
        let zones = vec![Zone::new("home", 0.0, 0.0, 100.0)];
        // Scenario A: inside "home".
        let sample = LocationSample::new(0.0, 0.0, 10.0, 0);
        let update = build_update(&zones, &sample, ReportMode::ZoneOnly);
        assert_eq!(update.report_key(), "home");
        assert!(update.gps.is_none());

        // Scenario B: no zone contains the point.
        let sample = LocationSample::new(45.0, 45.0, 10.0, 0);
        let update = build_update(&zones, &sample, ReportMode::ZoneOnly);
        assert_eq!(update.report_key(), ZONE_NAME_NOT_HOME);
    }

    #[test]
    fn test_build_update_exact() {
        let sample = LocationSample::new(1.0, 2.0, 10.0, 0);
        let update = build_update(&[], &sample, ReportMode::Exact);
        assert_eq!(update.gps, Some([1.0, 2.0]));
        assert!(update.location_name.is_none());
    }
}
