//! # Admission Control
//!
//! Bounded-concurrency load-balanced frontend. Every replica caps in-flight
//! calls with a permit pool and rejects the excess immediately; clients
//! rotate round-robin across the replica set from a random starting offset;
//! group creation statically provisions a fixed replica count across
//! distinct hosts.
//!
//! ## Invariant: never queue
//! A call that finds no free permit fails with `Overload` at once. Backpressure
//! belongs to the caller, not to a queue in front of a saturated replica.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::object::Call;
use crate::policy::chain::{BoxFuture, CallLink, Next};
use crate::policy::config::AdmissionConfig;
use crate::policy::errors::{CallError, CallResult, PlacementError};
use crate::policy::stack::{LinkContext, Policy};
use crate::registry::HostAddr;
use crate::runtime::group::GroupCoordinator;
use crate::runtime::replica::ServerReplica;
use crate::runtime::selector::{ReplicaSelector, RoundRobinSelector};

/// Per-replica concurrency gate. Admits up to `limit` in-flight calls and
/// rejects the rest without queueing.
pub(crate) struct AdmissionGate {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl AdmissionGate {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// The shared permit pool, for links that read load off the same gate.
    pub(crate) fn shared_permits(&self) -> Arc<Semaphore> {
        Arc::clone(&self.permits)
    }
}

impl CallLink for AdmissionGate {
    fn on_call<'a>(&'a self, call: &'a Call, next: Next<'a>) -> BoxFuture<'a, CallResult> {
        Box::pin(async move {
            match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(_permit) => {
                    // Permit released on every exit path when the guard
                    // drops.
                    next.run(call).await
                }
                Err(_) => {
                    warn!(
                        "rejecting '{}': replica at its limit of {} concurrent requests",
                        call.method, self.limit
                    );
                    Err(CallError::Overload { limit: self.limit })
                }
            }
        })
    }
}

/// Statically provision replicas across distinct hosts of the group's
/// region, skipping the origin host. Fails before creating anything when the
/// region cannot satisfy the count.
pub(crate) async fn provision_static_replicas(
    group: &Arc<GroupCoordinator>,
    origin: &Arc<ServerReplica>,
    replica_count: usize,
) -> Result<(), CallError> {
    let region = group.region().clone();
    let origin_host = origin.host();

    let hosts: Vec<HostAddr> = group
        .registry()
        .hosts_in_region(&region)
        .map_err(|err| PlacementError::RegistryUnavailable(err.to_string()))?
        .into_iter()
        .filter(|host| *host != origin_host)
        .collect();

    let required = replica_count.saturating_sub(1);
    if hosts.len() < required {
        error!(
            "cannot provision {} replicas in region '{}': only {} eligible hosts beyond the origin",
            replica_count,
            region,
            hosts.len()
        );
        return Err(PlacementError::InsufficientHosts {
            region,
            required,
            available: hosts.len(),
        }
        .into());
    }

    for host in hosts.into_iter().take(required) {
        group.replicate(origin, host).await?;
    }
    Ok(())
}

/// The admission-control policy (load-balanced frontend).
pub struct AdmissionControl {
    config: AdmissionConfig,
}

impl AdmissionControl {
    /// Admission control with default limits.
    pub fn new() -> Self {
        Self::with_config(AdmissionConfig::default())
    }

    /// Admission control with explicit limits.
    pub fn with_config(config: AdmissionConfig) -> Self {
        Self { config }
    }

    /// The configured limits.
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }
}

impl Default for AdmissionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for AdmissionControl {
    fn name(&self) -> &'static str {
        "admission-control"
    }

    fn skips_initial_pin(&self) -> bool {
        // Placement is decided by the provisioning loop, not the default pin.
        true
    }

    fn server_links(&self, _ctx: &LinkContext) -> Vec<Arc<dyn CallLink>> {
        vec![Arc::new(AdmissionGate::new(
            self.config.max_concurrent_requests,
        ))]
    }

    fn selector(
        &self,
        group: &Arc<GroupCoordinator>,
        rng: &mut StdRng,
    ) -> Option<Box<dyn ReplicaSelector>> {
        Some(Box::new(RoundRobinSelector::new(
            group.object_id(),
            Arc::downgrade(group),
            StdRng::seed_from_u64(rng.gen()),
            None,
        )))
    }

    fn on_group_create<'a>(
        &'a self,
        group: &'a Arc<GroupCoordinator>,
        origin: &'a Arc<ServerReplica>,
    ) -> BoxFuture<'a, Result<(), CallError>> {
        Box::pin(async move {
            provision_static_replicas(group, origin, self.config.replica_count).await
        })
    }
}
