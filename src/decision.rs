//! High-accuracy mode decision engine.
//!
//! Pure with respect to its inputs: the tracker gathers settings, the
//! Bluetooth scan and the geofence working sets, and this module decides
//! whether high-frequency tracking should be active. The manual override
//! flags are applied afterwards and clear themselves once the natural
//! decision agrees with the forced value.

use std::collections::HashSet;

use log::debug;

use crate::platform::{is_bt_address, BluetoothDevice};

/// Inputs to the natural high-accuracy decision.
#[derive(Debug, Clone)]
pub struct DecisionInputs<'a> {
    /// Configured Bluetooth device addresses (already name-resolved).
    pub bt_addresses: Vec<String>,
    /// Whether any configured address is currently connected.
    pub bt_connected: bool,
    /// Require both the Bluetooth and zone constraints to be met.
    pub combined: bool,
    /// Whether a positive trigger range is configured.
    pub use_trigger_range: bool,
    /// Configured high-accuracy zone ids (base registrations).
    pub zones: Vec<String>,
    /// Zone ids used for "entered" checks: the expanded set when a trigger
    /// range is configured, otherwise the base set.
    pub expanded_zones: Vec<String>,
    /// Working set of zones currently considered entered.
    pub entered_zones: &'a HashSet<String>,
    /// Working set of zones currently considered exited.
    pub exited_zones: &'a HashSet<String>,
}

/// The natural decision, before manual overrides.
///
/// With no constraints configured high accuracy defaults to on; with
/// constraints configured but unmet it is off. The exit-based branch exists
/// to detect crossing from the expanded boundary back into the base zone.
pub fn natural_decision(inputs: &DecisionInputs<'_>) -> bool {
    let bt_constraint_used = !inputs.bt_addresses.is_empty();
    let bt_connected = bt_constraint_used && inputs.bt_connected;

    let zone_constraint_used = !inputs.zones.is_empty();
    let mut in_zone = false;
    if zone_constraint_used {
        let entered = !inputs.entered_zones.is_empty()
            && inputs
                .entered_zones
                .iter()
                .all(|zone| inputs.expanded_zones.contains(zone));
        let exited = inputs.use_trigger_range
            && !inputs.exited_zones.is_empty()
            && inputs
                .exited_zones
                .iter()
                .all(|zone| inputs.zones.contains(zone));
        in_zone = entered || exited;
        debug!(
            "[Decision] zone constraint: entered={} exited-branch={} -> in_zone={}",
            entered, exited, in_zone
        );
    }

    let any_constraint_used = bt_constraint_used || zone_constraint_used;

    match (inputs.combined, bt_connected, in_zone) {
        (true, true, true) => true,
        (false, connected, zoned) if connected || zoned => true,
        (true, _, _) if !any_constraint_used => false,
        _ => !any_constraint_used,
    }
}

/// Apply the force-on/force-off overrides to the natural decision.
///
/// The flags are mutually exclusive and self-clearing: a force flag is
/// dropped as soon as the natural decision already agrees with it.
pub fn apply_overrides(force_on: &mut bool, force_off: &mut bool, natural: bool) -> bool {
    if natural && *force_on {
        debug!("[Decision] Force-on cleared, high accuracy would be enabled anyway");
        *force_on = false;
    }
    if !natural && *force_off {
        debug!("[Decision] Force-off cleared, high accuracy would be disabled anyway");
        *force_off = false;
    }

    if *force_on {
        true
    } else if *force_off {
        false
    } else {
        natural
    }
}

/// Resolve configured device names to hardware addresses against a live
/// scan. Entries that are already addresses pass through; names matching a
/// scanned device are replaced by that device's address (deduplicated);
/// unmatched names are kept for a later scan. Returns the resolved list and
/// whether it differs from the input (and so should be persisted).
pub fn resolve_device_addresses(
    configured: &[String],
    scan: &[BluetoothDevice],
) -> (Vec<String>, bool) {
    let mut resolved: Vec<String> = Vec::with_capacity(configured.len());
    let mut changed = false;

    for entry in configured {
        if is_bt_address(entry) {
            if !resolved.contains(entry) {
                resolved.push(entry.clone());
            }
            continue;
        }
        let matches: Vec<&BluetoothDevice> =
            scan.iter().filter(|device| &device.name == entry).collect();
        if matches.is_empty() {
            resolved.push(entry.clone());
        } else {
            changed = true;
            for device in matches {
                if !resolved.contains(&device.address) {
                    resolved.push(device.address.clone());
                }
            }
        }
    }

    (resolved, changed)
}

/// Whether any configured address is currently connected.
pub fn any_connected(addresses: &[String], scan: &[BluetoothDevice]) -> bool {
    scan.iter()
        .any(|device| device.connected && addresses.contains(&device.address))
}
