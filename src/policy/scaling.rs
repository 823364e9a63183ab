//! # Elastic Scaling
//!
//! Scale-up frontend composing admission control: overloads trigger
//! rate-limited replica creation, and a per-replica window tick sheds
//! provably redundant replicas.
//!
//! ## Invariant: floor of two
//! Scale-down never drops a group below two replicas, whatever the load.

use std::sync::{Arc, Weak};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::object::{Call, ReplicaId};
use crate::policy::admission::{provision_static_replicas, AdmissionGate};
use crate::policy::chain::{BoxFuture, CallLink, Next};
use crate::policy::config::{AdmissionConfig, ScalingConfig};
use crate::policy::errors::{CallError, CallResult};
use crate::policy::stack::{LinkContext, Policy};
use crate::runtime::group::GroupCoordinator;
use crate::runtime::replica::ServerReplica;
use crate::runtime::selector::{ReplicaSelector, RoundRobinSelector};
use crate::timer::Countdown;

/// Groups never scale below this many replicas.
pub(crate) const MIN_REPLICAS: usize = 2;

/// A load-balanced client discards its replica snapshot every this many
/// calls, so scaled replicas are eventually discovered.
pub(crate) const CACHE_REFRESH_CALLS: usize = 100;

/// Replenishing permit pool governing replica creation per window.
pub(crate) struct ScalingWindow {
    permits: Semaphore,
    size: usize,
}

impl ScalingWindow {
    /// A window starting full.
    pub(crate) fn new(size: usize) -> Self {
        Self {
            permits: Semaphore::new(size),
            size,
        }
    }

    /// Take one permit without blocking. `false` means the window is spent.
    pub(crate) fn try_take(&self) -> bool {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Refill the pool to its configured size.
    pub(crate) fn replenish(&self) {
        let missing = self.size.saturating_sub(self.permits.available_permits());
        if missing > 0 {
            self.permits.add_permits(missing);
        }
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// The group-side creation window plus its replenishing tick, installed on
/// the coordinator by the scaling policy and dropped with the group.
pub(crate) struct GroupScaleWindow {
    window: Arc<ScalingWindow>,
    _ticker: Countdown,
}

impl GroupScaleWindow {
    pub(crate) fn new(config: &ScalingConfig) -> Self {
        let window = Arc::new(ScalingWindow::new(config.replicas_per_window));
        let for_tick = Arc::clone(&window);
        let ticker = Countdown::every(config.replication_window(), move || {
            let window = Arc::clone(&for_tick);
            Box::pin(async move {
                window.replenish();
            })
        });
        Self {
            window,
            _ticker: ticker,
        }
    }

    /// Take one creation permit without blocking.
    pub(crate) fn try_take(&self) -> bool {
        self.window.try_take()
    }
}

/// Whether a replica's load is low enough that the group provably carries at
/// least two redundant replicas.
///
/// `load` is the replica's in-flight call count, `limit` its admission
/// ceiling, `replicas` the group size. The threshold `limit * (replicas - 2)
/// / replicas` is the load at which removing one replica still leaves one
/// spare beyond what current load needs.
pub(crate) fn underloaded(load: usize, limit: usize, replicas: usize) -> bool {
    if replicas <= MIN_REPLICAS {
        return false;
    }
    (load as f64) < (limit as f64) * ((replicas as f64 - 2.0) / replicas as f64)
}

/// Reacts to overloads by requesting a rate-limited scale-up, and to window
/// ticks by replenishing its window and evaluating scale-down.
pub(crate) struct ScaleReactor {
    window: Arc<ScalingWindow>,
    group: Weak<GroupCoordinator>,
    replica_id: ReplicaId,
    ticker: Countdown,
}

impl ScaleReactor {
    /// Build the reactor for one replica, sharing the admission gate's
    /// permit pool for load measurement.
    pub(crate) fn new(
        replica_id: ReplicaId,
        group: Weak<GroupCoordinator>,
        admission: Arc<Semaphore>,
        limit: usize,
        config: &ScalingConfig,
    ) -> Self {
        let window = Arc::new(ScalingWindow::new(config.replicas_per_window));

        let tick_window = Arc::clone(&window);
        let tick_group = group.clone();
        let ticker = Countdown::every(config.replication_window(), move || {
            let window = Arc::clone(&tick_window);
            let group = tick_group.clone();
            let admission = Arc::clone(&admission);
            Box::pin(async move {
                window.replenish();

                let Some(group) = group.upgrade() else {
                    return;
                };
                let replicas = group.replica_count();
                let load = limit.saturating_sub(admission.available_permits());
                if underloaded(load, limit, replicas) {
                    debug!(
                        "replica {} underloaded ({} in-flight of {}, {} replicas), requesting removal",
                        replica_id, load, limit, replicas
                    );
                    if let Err(err) = group.scale_down(replica_id).await {
                        warn!("replica {} scale-down deferred: {}", replica_id, err);
                    }
                }
            })
        });

        Self {
            window,
            group,
            replica_id,
            ticker,
        }
    }
}

impl CallLink for ScaleReactor {
    fn on_call<'a>(&'a self, call: &'a Call, next: Next<'a>) -> BoxFuture<'a, CallResult> {
        Box::pin(async move {
            match next.run(call).await {
                Err(CallError::Overload { limit }) => {
                    if !self.window.try_take() {
                        warn!(
                            "replica {} overloaded and its creation window is spent",
                            self.replica_id
                        );
                        return Err(CallError::ScaleUpRateExceeded);
                    }
                    if let Some(group) = self.group.upgrade() {
                        // Scale-up failures replace the overload; a successful
                        // scale-up re-surfaces it. The triggering call is
                        // never retried here.
                        group.scale_up().await?;
                    }
                    Err(CallError::Overload { limit })
                }
                other => other,
            }
        })
    }

    fn on_destroy(&self) {
        self.ticker.stop();
    }
}

/// The elastic-scaling policy (scale-up frontend).
///
/// Composes the admission gate with a scale reactor per replica; the two
/// share one permit pool so the reactor reads load straight off the gate.
pub struct ElasticScaling {
    admission: AdmissionConfig,
    scaling: ScalingConfig,
}

impl ElasticScaling {
    /// Elastic scaling with default limits.
    pub fn new() -> Self {
        Self::with_config(AdmissionConfig::default(), ScalingConfig::default())
    }

    /// Elastic scaling with explicit limits.
    pub fn with_config(admission: AdmissionConfig, scaling: ScalingConfig) -> Self {
        Self { admission, scaling }
    }
}

impl Default for ElasticScaling {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for ElasticScaling {
    fn name(&self) -> &'static str {
        "elastic-scaling"
    }

    fn skips_initial_pin(&self) -> bool {
        true
    }

    fn server_links(&self, ctx: &LinkContext) -> Vec<Arc<dyn CallLink>> {
        let gate = AdmissionGate::new(self.admission.max_concurrent_requests);
        let reactor = ScaleReactor::new(
            ctx.replica_id,
            ctx.group.clone(),
            gate.shared_permits(),
            self.admission.max_concurrent_requests,
            &self.scaling,
        );
        vec![Arc::new(reactor), Arc::new(gate)]
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
            Some(CACHE_REFRESH_CALLS),
        )))
    }

    fn on_group_create<'a>(
        &'a self,
        group: &'a Arc<GroupCoordinator>,
        origin: &'a Arc<ServerReplica>,
    ) -> BoxFuture<'a, Result<(), CallError>> {
        Box::pin(async move {
            provision_static_replicas(group, origin, self.admission.replica_count).await?;
            group.install_scale_window(GroupScaleWindow::new(&self.scaling));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_never_sheds() {
        for load in 0..=50 {
            assert!(!underloaded(load, 10, 2));
            assert!(!underloaded(load, 10, 1));
        }
    }

    #[test]
    fn test_shed_threshold_at_three_replicas() {
        // limit 10, 3 replicas: threshold is 10 * 1/3 = 3.33.
        assert!(underloaded(2, 10, 3));
        assert!(underloaded(3, 10, 3));
        assert!(!underloaded(4, 10, 3));
        assert!(!underloaded(5, 10, 3));
    }

    #[test]
    fn test_shed_threshold_grows_with_group() {
        // limit 10, 5 replicas: threshold is 10 * 3/5 = 6.
        assert!(underloaded(5, 10, 5));
        assert!(!underloaded(6, 10, 5));
    }

    #[tokio::test]
    async fn test_window_take_and_replenish() {
        let window = ScalingWindow::new(2);
        assert!(window.try_take());
        assert!(window.try_take());
        assert!(!window.try_take());
        assert_eq!(window.available(), 0);

        window.replenish();
        assert_eq!(window.available(), 2);
        assert!(window.try_take());
    }

    #[tokio::test]
    async fn test_replenish_never_overfills() {
        let window = ScalingWindow::new(1);
        window.replenish();
        window.replenish();
        assert_eq!(window.available(), 1);
    }
}
