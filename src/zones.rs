//! Zone cache: named regions fetched from the hub with a time-to-live.
//!
//! The cache is replaced wholesale on each successful fetch; there are no
//! partial merges. When a forced refresh fails the cache is cleared rather
//! than serving stale data that freshness was explicitly required for.

use std::cmp::Ordering;
use std::sync::Arc;

use log::{debug, error};

use crate::hub::HubClient;
use crate::types::{LocationSample, Zone, ZONE_CACHE_TTL_MS};

/// In-memory cache of the hub's zone list.
pub struct ZoneCache {
    hub: Arc<dyn HubClient>,
    zones: Vec<Zone>,
    last_received_ms: i64,
}

impl ZoneCache {
    pub fn new(hub: Arc<dyn HubClient>) -> Self {
        Self {
            hub,
            zones: Vec::new(),
            last_received_ms: 0,
        }
    }

    /// Whether the cached list has outlived its TTL.
    pub fn is_stale(&self, now_ms: i64) -> bool {
        self.last_received_ms < now_ms - ZONE_CACHE_TTL_MS
    }

    pub fn clear(&mut self) {
        self.zones.clear();
        self.last_received_ms = 0;
    }

    /// Current zones, refreshing from the hub when empty, stale or forced.
    /// Fetches are all-or-nothing; on failure the previous cache is retained
    /// unless the refresh was forced, in which case it is cleared.
    pub async fn get_zones(&mut self, force_refresh: bool, now_ms: i64) -> Vec<Zone> {
        if force_refresh || self.zones.is_empty() || self.is_stale(now_ms) {
            match self.hub.get_zones().await {
                Ok(zones) => {
                    debug!("[ZoneCache] Received {} zones from hub", zones.len());
                    self.zones = zones;
                    self.last_received_ms = now_ms;
                }
                Err(e) => {
                    error!("[ZoneCache] Error receiving zones from hub: {}", e);
                    if force_refresh {
                        self.clear();
                    }
                }
            }
        }
        self.zones.clone()
    }
}

/// The non-passive zone with the smallest radius containing the sample,
/// widened by the sample's accuracy.
pub fn zone_for_location<'a>(zones: &'a [Zone], sample: &LocationSample) -> Option<&'a Zone> {
    zones
        .iter()
        .filter(|zone| {
            !zone.passive
                && zone.contains_with_accuracy(sample.latitude, sample.longitude, sample.accuracy)
        })
        .min_by(|a, b| a.radius.partial_cmp(&b.radius).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TrackingError};
    use crate::types::LocationUpdate;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    struct MockHub {
        zones: Mutex<Vec<Zone>>,
        fail: AtomicBool,
        fetches: AtomicU32,
    }

    impl MockHub {
        fn with_zones(zones: Vec<Zone>) -> Self {
            Self {
                zones: Mutex::new(zones),
                fail: AtomicBool::new(false),
                fetches: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl HubClient for MockHub {
        async fn update_location(&self, _update: &LocationUpdate) -> Result<()> {
            Ok(())
        }

        async fn fire_event(&self, _event_type: &str, _data: serde_json::Value) -> Result<()> {
            Ok(())
        }

        async fn get_zones(&self) -> Result<Vec<Zone>> {
            self.fetches.fetch_add(1, AtomicOrdering::Relaxed);
            if self.fail.load(AtomicOrdering::Relaxed) {
                Err(TrackingError::Network("hub down".to_string()))
            } else {
                Ok(self.zones.lock().unwrap().clone())
            }
        }

        fn version_at_least(&self, _major: u32, _minor: u32, _patch: u32) -> bool {
            true
        }
    }

    fn home() -> Zone {
        Zone::new("home", 51.5, -0.12, 100.0)
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let hub = Arc::new(MockHub::with_zones(vec![home()]));
        let mut cache = ZoneCache::new(hub.clone());

        let zones = cache.get_zones(false, 1_000).await;
        assert_eq!(zones.len(), 1);
        assert_eq!(hub.fetches.load(AtomicOrdering::Relaxed), 1);

        // Second call inside the TTL does not reach the hub.
        cache.get_zones(false, 2_000).await;
        assert_eq!(hub.fetches.load(AtomicOrdering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_refetches() {
        let hub = Arc::new(MockHub::with_zones(vec![home()]));
        let mut cache = ZoneCache::new(hub.clone());

        cache.get_zones(false, 1_000).await;
        cache.get_zones(false, 1_000 + ZONE_CACHE_TTL_MS + 1).await;
        assert_eq!(hub.fetches.load(AtomicOrdering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_cache() {
        let hub = Arc::new(MockHub::with_zones(vec![home()]));
        let mut cache = ZoneCache::new(hub.clone());

        cache.get_zones(false, 1_000).await;
        hub.fail.store(true, AtomicOrdering::Relaxed);

        let zones = cache.get_zones(false, 1_000 + ZONE_CACHE_TTL_MS + 1).await;
        assert_eq!(zones.len(), 1, "unforced failure retains previous cache");
    }

    #[tokio::test]
    async fn test_failed_forced_refresh_clears_cache() {
        let hub = Arc::new(MockHub::with_zones(vec![home()]));
        let mut cache = ZoneCache::new(hub.clone());

        cache.get_zones(false, 1_000).await;
        hub.fail.store(true, AtomicOrdering::Relaxed);

        let zones = cache.get_zones(true, 2_000).await;
        assert!(zones.is_empty(), "forced failure must not serve stale data");
    }

    #[test]
    fn test_zone_for_location_prefers_smallest_radius() {
        let mut outer = Zone::new("city", 51.5, -0.12, 5_000.0);
        let inner = Zone::new("home", 51.5, -0.12, 100.0);
        let sample = LocationSample::new(51.5, -0.12, 10.0, 0);

        let zones = vec![outer.clone(), inner.clone()];
        assert_eq!(zone_for_location(&zones, &sample).unwrap().id, "home");

        // Passive zones are never reported.
        outer.passive = true;
        let zones = vec![outer, Zone::new("far", 10.0, 10.0, 50.0)];
        assert!(zone_for_location(&zones, &sample).is_none());
    }
}
