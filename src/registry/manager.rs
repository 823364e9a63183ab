//! # In-Memory Registry
//!
//! Reference implementation of the server registry: region-scoped host
//! lists, heartbeat-reset liveness countdowns, and random best-host
//! selection.
//!
//! ## Invariant: liveness
//! A host stays registered exactly as long as its countdown keeps being
//! reset; a missed heartbeat window removes it from every map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::errors::{RegistryError, RegistryResult};
use super::host::{HostAddr, HostInfo, HostRecord, NodeSelector, Region};
use super::ServerRegistry;
use crate::timer::Countdown;

/// Configuration for the in-memory registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// How long a host may go silent before it is dropped from the fleet.
    pub heartbeat_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: 6_000,
        }
    }
}

impl RegistryConfig {
    /// Heartbeat timeout as a duration.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

/// In-memory server registry with per-host liveness countdowns.
///
/// Countdown tasks are spawned on the ambient Tokio runtime, so hosts must
/// be registered from within one.
pub struct InMemoryRegistry {
    config: RegistryConfig,

    /// Back-reference handed to countdown tasks.
    weak_self: Weak<InMemoryRegistry>,

    /// Registered hosts by address.
    hosts: RwLock<HashMap<HostAddr, HostRecord>>,

    /// Insertion-ordered host lists per region. List order defines
    /// "first eligible host" tie-breaks during placement.
    regions: RwLock<HashMap<Region, Vec<HostAddr>>>,

    /// Liveness countdown per host.
    timers: Mutex<HashMap<HostAddr, Countdown>>,

    /// Injected randomness for best-host selection.
    rng: Mutex<StdRng>,
}

impl InMemoryRegistry {
    /// Create a registry with entropy-seeded host selection.
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a registry with a caller-supplied RNG (fixed seeds for tests).
    pub fn with_rng(config: RegistryConfig, rng: StdRng) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            config,
            weak_self: weak_self.clone(),
            hosts: RwLock::new(HashMap::new()),
            regions: RwLock::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        })
    }

    /// Number of registered hosts across all regions.
    pub fn host_count(&self) -> usize {
        match self.hosts.read() {
            Ok(hosts) => hosts.len(),
            Err(_) => 0,
        }
    }

    /// Snapshot of one host's record, if registered.
    pub fn record(&self, addr: HostAddr) -> Option<HostRecord> {
        match self.hosts.read() {
            Ok(hosts) => hosts.get(&addr).cloned(),
            Err(_) => None,
        }
    }

    /// Start (or restart) the liveness countdown for a host.
    fn arm_countdown(&self, addr: HostAddr, region: Region) {
        let weak = self.weak_self.clone();
        let countdown = Countdown::once(self.config.heartbeat_timeout(), move || {
            let weak = weak.clone();
            let region = region.clone();
            Box::pin(async move {
                if let Some(registry) = weak.upgrade() {
                    registry.expire(addr, &region);
                }
            })
        });

        if let Ok(mut timers) = self.timers.lock() {
            // Replaces (and thereby aborts) any previous countdown.
            timers.insert(addr, countdown);
        }
    }

    /// Drop a host that missed its heartbeat window.
    fn expire(&self, addr: HostAddr, region: &Region) {
        warn!("host {} in region '{}' missed its heartbeat window, removing", addr, region);
        self.remove(addr, region);
    }

    /// Remove a host from every map.
    fn remove(&self, addr: HostAddr, region: &Region) {
        if let Ok(mut hosts) = self.hosts.write() {
            hosts.remove(&addr);
        }
        if let Ok(mut regions) = self.regions.write() {
            if let Some(list) = regions.get_mut(region) {
                list.retain(|entry| *entry != addr);
                if list.is_empty() {
                    regions.remove(region);
                }
            }
        }
        if let Ok(mut timers) = self.timers.lock() {
            timers.remove(&addr);
        }
    }

    /// Candidate hosts matching a selector, in region-list order by sorted
    /// region name. The ordering keeps seeded selection reproducible.
    fn candidates(&self, selector: &NodeSelector) -> RegistryResult<Vec<HostAddr>> {
        let hosts = self
            .hosts
            .read()
            .map_err(|_| RegistryError::Unavailable("registry state poisoned".to_string()))?;
        let regions = self
            .regions
            .read()
            .map_err(|_| RegistryError::Unavailable("registry state poisoned".to_string()))?;

        let mut region_names: Vec<&Region> = regions.keys().collect();
        region_names.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        let mut matches = Vec::new();
        for region in region_names {
            if let Some(wanted) = &selector.region {
                if wanted != region {
                    continue;
                }
            }
            if let Some(list) = regions.get(region) {
                for addr in list {
                    if let Some(record) = hosts.get(addr) {
                        if selector.matches(&record.info) {
                            matches.push(*addr);
                        }
                    }
                }
            }
        }
        Ok(matches)
    }
}

impl ServerRegistry for InMemoryRegistry {
    fn register(&self, host: HostInfo) -> RegistryResult<()> {
        let addr = host.addr;
        let region = host.region.clone();

        if let Ok(mut hosts) = self.hosts.write() {
            if let Some(previous) = hosts.insert(addr, HostRecord::new(host)) {
                // Re-registration after a region move: drop the stale entry.
                if previous.info.region != region {
                    if let Ok(mut regions) = self.regions.write() {
                        if let Some(list) = regions.get_mut(&previous.info.region) {
                            list.retain(|entry| *entry != addr);
                            if list.is_empty() {
                                regions.remove(&previous.info.region);
                            }
                        }
                    }
                }
            }
        }

        if let Ok(mut regions) = self.regions.write() {
            let list = regions.entry(region.clone()).or_default();
            if !list.contains(&addr) {
                list.push(addr);
            }
        }

        self.arm_countdown(addr, region.clone());
        info!("host {} registered in region '{}'", addr, region);
        Ok(())
    }

    fn heartbeat(&self, addr: HostAddr, region: &Region) -> RegistryResult<()> {
        let known = {
            let mut hosts = self
                .hosts
                .write()
                .map_err(|_| RegistryError::Unavailable("registry state poisoned".to_string()))?;
            match hosts.get_mut(&addr) {
                Some(record) if record.info.region == *region => {
                    record.touch();
                    true
                }
                _ => false,
            }
        };

        if !known {
            error!("heartbeat from unknown host {} in region '{}'", addr, region);
            return Err(RegistryError::UnknownHost {
                addr,
                region: region.clone(),
            });
        }

        if let Ok(timers) = self.timers.lock() {
            if let Some(countdown) = timers.get(&addr) {
                countdown.reset();
            }
        }
        Ok(())
    }

    fn deregister(&self, addr: HostAddr, region: &Region) -> RegistryResult<()> {
        // Idempotent: expiry may race an explicit leave.
        self.remove(addr, region);
        info!("host {} deregistered from region '{}'", addr, region);
        Ok(())
    }

    fn best_host(&self, selector: &NodeSelector) -> RegistryResult<Option<HostAddr>> {
        let matches = self.candidates(selector)?;
        if matches.is_empty() {
            return Ok(None);
        }
        let index = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0..matches.len()),
            Err(_) => 0,
        };
        Ok(Some(matches[index]))
    }

    fn hosts_in_region(&self, region: &Region) -> RegistryResult<Vec<HostAddr>> {
        let regions = self
            .regions
            .read()
            .map_err(|_| RegistryError::Unavailable("registry state poisoned".to_string()))?;
        Ok(regions.get(region).cloned().unwrap_or_default())
    }

    fn regions(&self) -> RegistryResult<Vec<Region>> {
        let regions = self
            .regions
            .read()
            .map_err(|_| RegistryError::Unavailable("registry state poisoned".to_string()))?;
        let mut names: Vec<Region> = regions.keys().cloned().collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(names)
    }
}
