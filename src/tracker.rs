//! Tracking orchestrator: the single-consumer event loop that owns all
//! mutable tracking state.
//!
//! Platform callbacks, boot triggers and user commands are funneled into a
//! typed [`Event`] mailbox consumed by one task. [`LocationTracker::reconcile`]
//! diffs current settings and the high-accuracy decision against what the
//! platform is believed to have registered and performs minimal-diff
//! reconfiguration; repeated calls with unchanged inputs issue no redundant
//! platform calls.

use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::decision::{self, DecisionInputs};
use crate::geofence::GeofenceManager;
use crate::hub::HubClient;
use crate::pipeline::{meets_minimum_accuracy, LocationPipeline, PipelineOutcome, UpdateSource};
use crate::platform::{LocationRequest, Platform, SingleFixRequest, WakeLock};
use crate::settings::{LocationSettings, SensorId, SettingsStore};
use crate::state::TrackingState;
use crate::types::{
    GeofenceEvent, LocationSample, ReportMode, DEFAULT_LOCATION_MAX_WAIT_MS,
    SINGLE_FIX_MAX_ATTEMPTS, SINGLE_FIX_WAKE_LOCK_MS,
};
use crate::zones::ZoneCache;

/// Manual high-accuracy commands issued by the user or the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceCommand {
    /// Enable the high-accuracy setting and force the mode on.
    TurnOn,
    /// Disable the high-accuracy setting and clear both force flags.
    TurnOff,
    /// Force the mode off without touching the setting.
    ForceOff,
    /// Re-apply the configured interval to a running service.
    SetUpdateInterval,
}

/// Asynchronous triggers consumed by the tracker task.
#[derive(Debug, Clone)]
pub enum Event {
    /// Device boot; runs a full reconcile.
    Boot,
    /// Explicit request to re-evaluate tracking registrations.
    RequestUpdates,
    /// Sample from the periodic low-power stream.
    BackgroundLocation(LocationSample),
    /// Sample from the high-accuracy foreground service.
    HighAccuracyLocation(LocationSample),
    /// Sample from a bounded single accurate fix burst.
    SingleFixLocation(LocationSample),
    /// Geofence transition callback.
    Geofence(GeofenceEvent),
    /// Explicit request for one accurate fix.
    RequestAccurateLocation,
    ForceHighAccuracy(ForceCommand),
}

struct SingleFix {
    attempts: u32,
    wake_lock: Option<Box<dyn WakeLock>>,
}

/// Cloneable sender half of the tracker mailbox.
#[derive(Clone)]
pub struct TrackerHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl TrackerHandle {
    pub fn send(&self, event: Event) {
        if self.tx.send(event).is_err() {
            warn!("[Tracker] Dropping event, tracker task has stopped");
        }
    }
}

/// Top-level controller owning the tracking state, the zone cache and the
/// geofence manager.
pub struct LocationTracker {
    settings: LocationSettings,
    hub: Arc<dyn HubClient>,
    platform: Arc<dyn Platform>,
    clock: Arc<dyn Clock>,
    zone_cache: ZoneCache,
    geofences: GeofenceManager,
    pipeline: LocationPipeline,
    state: TrackingState,
    single_fix: Option<SingleFix>,
}

impl LocationTracker {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        hub: Arc<dyn HubClient>,
        platform: Arc<dyn Platform>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let settings = LocationSettings::new(store);
        let pipeline = LocationPipeline::new(
            hub.clone(),
            platform.clone(),
            settings.clone(),
            clock.clone(),
        );
        Self {
            settings,
            hub: hub.clone(),
            platform,
            clock,
            zone_cache: ZoneCache::new(hub),
            geofences: GeofenceManager::new(),
            pipeline,
            state: TrackingState::new(),
            single_fix: None,
        }
    }

    /// Spawn the tracker task and return the mailbox handle.
    pub fn spawn(
        store: Arc<dyn SettingsStore>,
        hub: Arc<dyn HubClient>,
        platform: Arc<dyn Platform>,
        clock: Arc<dyn Clock>,
    ) -> TrackerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tracker = Self::new(store, hub, platform, clock);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracker.handle_event(event).await;
            }
            debug!("[Tracker] Mailbox closed, tracker task exiting");
        });
        TrackerHandle { tx }
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    pub fn geofences(&self) -> &GeofenceManager {
        &self.geofences
    }

    /// Dispatch one event. Failures are handled and logged locally; one
    /// failed trigger never prevents future ones.
    pub async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Boot | Event::RequestUpdates => self.reconcile().await,
            Event::BackgroundLocation(sample) => {
                self.handle_location(sample, UpdateSource::Background).await
            }
            Event::HighAccuracyLocation(sample) => {
                self.handle_location(sample, UpdateSource::HighAccuracy).await
            }
            Event::SingleFixLocation(sample) => self.handle_single_fix_sample(sample).await,
            Event::Geofence(geofence_event) => self.handle_geofence(geofence_event).await,
            Event::RequestAccurateLocation => self.request_single_accurate_location().await,
            Event::ForceHighAccuracy(command) => self.handle_force_command(command).await,
        }
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Reconcile settings and the high-accuracy decision against the
    /// platform registrations believed to exist.
    pub async fn reconcile(&mut self) {
        if !self.platform.has_permission(SensorId::BackgroundLocation) {
            warn!("[Tracker] Not starting location reporting because of permissions");
            return;
        }

        let background_enabled = self.settings.background_enabled();
        let zone_enabled = self.settings.zone_enabled();

        if !background_enabled && !zone_enabled {
            debug!("[Tracker] Removing all location requests");
            self.remove_background_updates();
            self.remove_geofence_requests();
            self.platform.stop_high_accuracy_service();
            self.state.background_tracking_active = false;
            self.state.zone_tracking_active = false;
            self.state.high_accuracy_active = false;
        }
        if !zone_enabled && self.state.zone_tracking_active {
            self.remove_geofence_requests();
            self.state.zone_tracking_active = false;
        }
        if !background_enabled && self.state.background_tracking_active {
            self.remove_background_updates();
            self.platform.stop_high_accuracy_service();
            self.state.background_tracking_active = false;
            self.state.high_accuracy_active = false;
        }
        if zone_enabled && !self.state.zone_tracking_active {
            self.state.zone_tracking_active = true;
            self.request_zone_updates().await;
        }

        // Staleness: the platform silently dropped our registration if no
        // sample arrived within twice the expected delivery window.
        let now = self.clock.now_ms();
        if !self.state.high_accuracy_active
            && self.state.background_tracking_active
            && self.state.last_location_received_ms + DEFAULT_LOCATION_MAX_WAIT_MS * 2 < now
        {
            debug!("[Tracker] Background location updates appear to have stopped, restarting");
            self.state.background_tracking_active = false;
            self.remove_background_updates();
        } else if self.state.high_accuracy_active
            && self.state.last_location_received_ms
                + self.settings.high_accuracy_interval_seconds() * 2_000
                < now
        {
            debug!("[Tracker] High accuracy mode appears to have stopped, restarting");
            self.state.background_tracking_active = false;
            self.platform.stop_high_accuracy_service();
        }

        self.setup_background(background_enabled).await;
    }

    /// The narrower pass run after location and geofence events: re-reads
    /// the background enable flag and reconfigures without the staleness
    /// checks.
    async fn reconcile_background(&mut self) {
        let background_enabled = self.settings.background_enabled();
        self.setup_background(background_enabled).await;
    }

    async fn setup_background(&mut self, background_enabled: bool) {
        if !background_enabled {
            return;
        }

        let interval = self.settings.high_accuracy_interval_seconds();
        let high_accuracy = self.compute_high_accuracy();
        let trigger_range = self.settings.trigger_range_meters();
        let configured_zones: std::collections::BTreeSet<String> =
            self.settings.high_accuracy_zones(false).into_iter().collect();

        if !self.state.background_tracking_active {
            self.state.background_tracking_active = true;
            if high_accuracy {
                self.start_high_accuracy_service(interval);
            } else {
                self.request_location_updates();
            }
        } else {
            if high_accuracy != self.state.high_accuracy_active
                || interval != self.state.high_accuracy_interval_seconds
            {
                if high_accuracy {
                    debug!("[Tracker] High accuracy parameters changed, enabling high accuracy");
                    if self.state.high_accuracy_active
                        && interval != self.state.high_accuracy_interval_seconds
                    {
                        self.restart_high_accuracy_service(interval);
                    } else {
                        self.remove_background_updates();
                        self.start_high_accuracy_service(interval);
                    }
                } else {
                    debug!("[Tracker] High accuracy parameters changed, disabling high accuracy");
                    self.platform.stop_high_accuracy_service();
                    self.request_location_updates();
                }
            }

            if trigger_range != self.state.last_trigger_range_meters
                || configured_zones != self.state.last_configured_zone_ids
            {
                debug!("[Tracker] Geofence parameters changed, rebuilding zones");
                self.geofences.mark_stale();
                self.remove_geofence_requests();
                self.request_zone_updates().await;
            }
        }

        self.state.high_accuracy_active = high_accuracy;
        self.state.high_accuracy_interval_seconds = interval;
        self.state.last_trigger_range_meters = trigger_range;
        self.state.last_configured_zone_ids = configured_zones;
    }

    /// The effective high-accuracy decision: settings gate, then the natural
    /// decision, then the self-clearing overrides.
    fn compute_high_accuracy(&mut self) -> bool {
        if !self.settings.high_accuracy_enabled() {
            return false;
        }

        let configured = self.settings.bt_devices();
        let scan = self.platform.bluetooth_devices();
        let (resolved, changed) = decision::resolve_device_addresses(&configured, &scan);
        if changed {
            // Persist resolved addresses so the next scan is cheaper.
            self.settings.set_bt_devices(&resolved);
        }
        let bt_connected = decision::any_connected(&resolved, &scan);

        let use_trigger_range = self.settings.trigger_range_meters() > 0;
        let zones = self.settings.high_accuracy_zones(false);
        let expanded_zones = if use_trigger_range {
            self.settings.high_accuracy_zones(true)
        } else {
            zones.clone()
        };

        let natural = decision::natural_decision(&DecisionInputs {
            bt_addresses: resolved,
            bt_connected,
            combined: self.settings.bt_zone_combined(),
            use_trigger_range,
            zones,
            expanded_zones,
            entered_zones: &self.state.entered_zones,
            exited_zones: &self.state.exited_zones,
        });

        decision::apply_overrides(&mut self.state.force_on, &mut self.state.force_off, natural)
    }

    // ========================================================================
    // Location and geofence events
    // ========================================================================

    async fn handle_location(&mut self, sample: LocationSample, source: UpdateSource) {
        debug!("[Tracker] Received location update");
        self.state.last_location_received_ms = self.clock.now_ms();

        if !meets_minimum_accuracy(&self.settings, SensorId::BackgroundLocation, &sample) {
            return;
        }
        self.forward_to_pipeline(&sample, source).await;
    }

    async fn handle_geofence(&mut self, event: GeofenceEvent) {
        debug!("[Tracker] Received geofence update");

        if !self.settings.zone_enabled() {
            warn!("[Tracker] Unregistering geofences, zone tracking is disabled");
            self.state.zone_tracking_active = false;
            self.remove_geofence_requests();
            return;
        }

        if let Err(e) = self
            .geofences
            .handle_transition_event(
                self.hub.as_ref(),
                self.platform.as_ref(),
                &event,
                &mut self.state.entered_zones,
                &mut self.state.exited_zones,
            )
            .await
        {
            warn!("[Tracker] Dropping geofence event: {}", e);
            return;
        }

        // Validated above: transition events always carry a location.
        if let Some(location) = event.location {
            if meets_minimum_accuracy(&self.settings, SensorId::ZoneLocation, &location) {
                self.forward_to_pipeline(&location, UpdateSource::Geofence).await;
            } else {
                warn!("[Tracker] Geofence location too coarse, requesting a fresh fix");
                self.request_single_accurate_location().await;
            }
        }

        self.reconcile_background().await;
    }

    async fn forward_to_pipeline(
        &mut self,
        sample: &LocationSample,
        source: UpdateSource,
    ) -> PipelineOutcome {
        let mode = self
            .settings
            .report_mode(self.hub.version_at_least(2022, 2, 0));
        let zones = if mode == ReportMode::ZoneOnly {
            let now = self.clock.now_ms();
            self.zone_cache.get_zones(false, now).await
        } else {
            Vec::new()
        };
        self.pipeline
            .process(&mut self.state, &zones, sample, source)
            .await
    }

    // ========================================================================
    // Single accurate fix
    // ========================================================================

    async fn request_single_accurate_location(&mut self) {
        if !self.platform.has_permission(SensorId::AccurateLocation) {
            warn!("[Tracker] Not getting single accurate location because of permissions");
            return;
        }
        if !self.settings.accurate_enabled() {
            warn!("[Tracker] Requested single accurate location but it is not enabled");
            return;
        }
        if self.single_fix.is_some() {
            debug!("[Tracker] Single accurate location request already in flight");
            return;
        }

        let now = self.clock.now_ms();
        let spacing = self.settings.accurate_update_spacing_ms();
        if now < self.state.last_accurate_request_ms + spacing {
            debug!("[Tracker] Not requesting accurate location, last request was too recent");
            return;
        }
        self.state.last_accurate_request_ms = now;

        let wake_lock = self
            .platform
            .acquire_wake_lock("hearth-location:accurate", SINGLE_FIX_WAKE_LOCK_MS);
        match self.platform.request_single_fix(&SingleFixRequest::default()) {
            Ok(()) => {
                self.single_fix = Some(SingleFix {
                    attempts: 0,
                    wake_lock,
                });
            }
            Err(e) => {
                error!("[Tracker] Failed to request single accurate location: {}", e);
                if let Some(mut lock) = wake_lock {
                    if lock.is_held() {
                        lock.release();
                    }
                }
            }
        }
    }

    async fn handle_single_fix_sample(&mut self, sample: LocationSample) {
        let Some(fix) = self.single_fix.as_mut() else {
            debug!("[Tracker] Unsolicited single fix sample, ignoring");
            return;
        };
        fix.attempts += 1;
        let attempts = fix.attempts;
        debug!("[Tracker] Got single accurate location update, attempt {}", attempts);

        let minimum = self.settings.minimum_accuracy(SensorId::AccurateLocation);
        if sample.accuracy <= minimum {
            debug!("[Tracker] Location accurate enough, all done with high accuracy");
            self.finish_single_fix();
            self.forward_to_pipeline(&sample, UpdateSource::SingleFix).await;
        } else if attempts >= SINGLE_FIX_MAX_ATTEMPTS {
            debug!("[Tracker] No location was accurate enough, sending the last one anyway");
            self.finish_single_fix();
            if sample.accuracy <= minimum * 2.0 {
                self.forward_to_pipeline(&sample, UpdateSource::SingleFix).await;
            }
        } else {
            warn!(
                "[Tracker] Location not accurate enough on attempt {} of {}",
                attempts, SINGLE_FIX_MAX_ATTEMPTS
            );
        }
    }

    fn finish_single_fix(&mut self) {
        if let Some(mut fix) = self.single_fix.take() {
            if let Some(lock) = fix.wake_lock.as_mut() {
                if lock.is_held() {
                    lock.release();
                }
            }
        }
    }

    // ========================================================================
    // Force commands
    // ========================================================================

    async fn handle_force_command(&mut self, command: ForceCommand) {
        match command {
            ForceCommand::TurnOn | ForceCommand::TurnOff => {
                let turn_on = command == ForceCommand::TurnOn;
                debug!(
                    "[Tracker] Forcing of high accuracy mode {}",
                    if turn_on { "enabled" } else { "disabled" }
                );
                self.state.force_on = turn_on;
                self.state.force_off = false;
                self.settings.set_high_accuracy_enabled(turn_on);
                self.reconcile_background().await;
            }
            ForceCommand::ForceOff => {
                debug!("[Tracker] High accuracy mode forced off");
                self.state.force_on = false;
                self.state.force_off = true;
                self.reconcile_background().await;
            }
            ForceCommand::SetUpdateInterval => {
                if self.state.high_accuracy_active {
                    let interval = self.settings.high_accuracy_interval_seconds();
                    self.restart_high_accuracy_service(interval);
                    self.state.high_accuracy_interval_seconds = interval;
                }
            }
        }
    }

    // ========================================================================
    // Platform registration helpers
    // ========================================================================

    fn request_location_updates(&mut self) {
        if !self.platform.has_permission(SensorId::BackgroundLocation) {
            warn!("[Tracker] Not registering for location updates because of permissions");
            return;
        }
        debug!("[Tracker] Registering for location updates");
        match self.platform.request_location_updates(&LocationRequest::default()) {
            Ok(()) => {
                // The registration time is the staleness baseline until the
                // first sample arrives.
                self.state.last_location_received_ms = self.clock.now_ms();
            }
            Err(e) => error!("[Tracker] Failed to register for location updates: {}", e),
        }
    }

    fn start_high_accuracy_service(&mut self, interval_seconds: i64) {
        match self.platform.start_high_accuracy_service(interval_seconds) {
            Ok(()) => self.state.last_location_received_ms = self.clock.now_ms(),
            Err(e) => error!("[Tracker] Failed to start high accuracy service: {}", e),
        }
    }

    fn restart_high_accuracy_service(&mut self, interval_seconds: i64) {
        match self.platform.restart_high_accuracy_service(interval_seconds) {
            Ok(()) => self.state.last_location_received_ms = self.clock.now_ms(),
            Err(e) => error!("[Tracker] Failed to restart high accuracy service: {}", e),
        }
    }

    fn remove_background_updates(&self) {
        debug!("[Tracker] Removing background location requests");
        if let Err(e) = self.platform.remove_location_updates() {
            error!("[Tracker] Failed to remove background location requests: {}", e);
        }
    }

    fn remove_geofence_requests(&mut self) {
        self.geofences.remove_update_requests(
            self.platform.as_ref(),
            &mut self.state.entered_zones,
            &mut self.state.exited_zones,
        );
    }

    async fn request_zone_updates(&mut self) {
        let now = self.clock.now_ms();
        self.geofences
            .request_zone_updates(
                self.platform.as_ref(),
                &mut self.zone_cache,
                &self.settings,
                now,
            )
            .await;
    }
}
