//! # Group Coordinator
//!
//! Authoritative membership and placement for one distributed object. The
//! coordinator owns the replica set, performs liveness-checked pinning,
//! and serves scale requests from the policies attached to the object.
//!
//! ## Invariant: single writer
//! All membership mutation runs under one async writer lock. Reads take a
//! cheap snapshot and never block writers for long.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::object::{ObjectId, ReplicaId};
use crate::policy::errors::{CallError, PlacementError};
use crate::policy::scaling::{GroupScaleWindow, MIN_REPLICAS};
use crate::policy::stack::PolicyStack;
use crate::registry::{HostAddr, Region, ServerRegistry};
use crate::runtime::replica::ServerReplica;

/// Replica membership with stable insertion order.
#[derive(Default)]
struct Members {
    by_id: HashMap<ReplicaId, Arc<ServerReplica>>,
    order: Vec<ReplicaId>,
}

impl Members {
    fn insert(&mut self, replica: Arc<ServerReplica>) {
        let id = replica.id();
        if self.by_id.insert(id, replica).is_none() {
            self.order.push(id);
        }
    }

    fn remove(&mut self, id: ReplicaId) -> Option<Arc<ServerReplica>> {
        let removed = self.by_id.remove(&id);
        if removed.is_some() {
            self.order.retain(|member| *member != id);
        }
        removed
    }

    fn in_order(&self) -> Vec<Arc<ServerReplica>> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    fn first(&self) -> Option<Arc<ServerReplica>> {
        self.order
            .first()
            .and_then(|id| self.by_id.get(id))
            .cloned()
    }
}

/// Group-side authority for one distributed object.
pub struct GroupCoordinator {
    object_id: ObjectId,
    region: Region,
    stack: Arc<PolicyStack>,
    registry: Arc<dyn ServerRegistry>,
    members: RwLock<Members>,
    writer: Mutex<()>,
    scale_window: std::sync::Mutex<Option<GroupScaleWindow>>,
    destroyed: AtomicBool,
}

impl GroupCoordinator {
    pub(crate) fn new(
        object_id: ObjectId,
        region: Region,
        stack: Arc<PolicyStack>,
        registry: Arc<dyn ServerRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            object_id,
            region,
            stack,
            registry,
            members: RwLock::new(Members::default()),
            writer: Mutex::new(()),
            scale_window: std::sync::Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// The region every replica of this object is placed in.
    pub fn region(&self) -> &Region {
        &self.region
    }

    pub(crate) fn registry(&self) -> &Arc<dyn ServerRegistry> {
        &self.registry
    }

    pub(crate) fn stack(&self) -> &Arc<PolicyStack> {
        &self.stack
    }

    /// Current replica count.
    pub fn replica_count(&self) -> usize {
        self.members_read().by_id.len()
    }

    /// The replica set in insertion order.
    pub fn servers(&self) -> Vec<Arc<ServerReplica>> {
        self.members_read().in_order()
    }

    /// Resolve a replica for a fresh client reference.
    pub fn on_ref_request(&self) -> Result<Arc<ServerReplica>, CallError> {
        self.ensure_alive()?;
        self.members_read()
            .first()
            .ok_or(CallError::ObjectNotFound(self.object_id))
    }

    /// Install the origin replica and run every policy's creation hook.
    /// An error from any hook leaves the group unusable; the caller is
    /// expected to destroy it.
    pub(crate) async fn on_create(
        self: &Arc<Self>,
        origin: Arc<ServerReplica>,
    ) -> Result<(), CallError> {
        {
            let _writer = self.writer.lock().await;
            if !self.stack.skips_initial_pin() {
                self.pin_checked(&origin)?;
            }
            self.members_write().insert(Arc::clone(&origin));
            info!(
                "object {} group created in region '{}', origin replica {} on {}",
                self.object_id,
                self.region,
                origin.id(),
                origin.host()
            );
        }
        // Hooks replicate and therefore take the writer lock themselves.
        for policy in self.stack.policies() {
            policy.on_group_create(self, &origin).await?;
        }
        Ok(())
    }

    /// Fork `source` onto `dest`, liveness-check and pin the new replica,
    /// and admit it to the group.
    pub(crate) async fn replicate(
        self: &Arc<Self>,
        source: &Arc<ServerReplica>,
        dest: HostAddr,
    ) -> Result<Arc<ServerReplica>, CallError> {
        let _writer = self.writer.lock().await;
        self.replicate_locked(source, dest).await
    }

    async fn replicate_locked(
        self: &Arc<Self>,
        source: &Arc<ServerReplica>,
        dest: HostAddr,
    ) -> Result<Arc<ServerReplica>, CallError> {
        self.ensure_alive()?;
        let replica = source
            .replicate_onto(dest, &self.stack, Arc::downgrade(self))
            .await;
        if let Err(err) = self.pin_checked(&replica) {
            replica.terminate();
            return Err(err);
        }
        self.members_write().insert(Arc::clone(&replica));
        info!(
            "object {} replicated onto {} as replica {}",
            self.object_id,
            dest,
            replica.id()
        );
        Ok(replica)
    }

    /// Add one replica on the first region host not already serving this
    /// object. Subject to the group's creation window when one is
    /// installed.
    pub(crate) async fn scale_up(self: &Arc<Self>) -> Result<Arc<ServerReplica>, CallError> {
        // The window is charged before anything else; a spent window
        // rejects the request without touching membership.
        {
            let window = self.scale_window_guard();
            if let Some(window) = window.as_ref() {
                if !window.try_take() {
                    warn!(
                        "object {} scale-up rejected: creation window spent",
                        self.object_id
                    );
                    return Err(CallError::ScaleUpRateExceeded);
                }
            }
        }

        let _writer = self.writer.lock().await;
        self.ensure_alive()?;
        let source = self
            .members_read()
            .first()
            .ok_or(CallError::ObjectNotFound(self.object_id))?;

        let occupied: HashSet<HostAddr> =
            self.servers().iter().map(|replica| replica.host()).collect();
        let dest = self
            .registry
            .hosts_in_region(&self.region)?
            .into_iter()
            .find(|host| !occupied.contains(host));
        let Some(dest) = dest else {
            warn!(
                "object {} cannot scale up: every host in region '{}' already serves a replica",
                self.object_id, self.region
            );
            return Err(PlacementError::NoEligibleHost {
                region: self.region.clone(),
            }
            .into());
        };

        let replica = self.replicate_locked(&source, dest).await?;
        info!(
            "object {} scaled up to {} replicas",
            self.object_id,
            self.replica_count()
        );
        Ok(replica)
    }

    /// Remove one replica, refusing to go below the group floor.
    pub(crate) async fn scale_down(&self, replica_id: ReplicaId) -> Result<(), CallError> {
        let _writer = self.writer.lock().await;
        self.ensure_alive()?;

        if self.replica_count() <= MIN_REPLICAS {
            return Err(CallError::ScaleDownFailed(format!(
                "group already at its floor of {} replicas",
                MIN_REPLICAS
            )));
        }
        let Some(replica) = self.members_read().by_id.get(&replica_id).cloned() else {
            return Err(CallError::ScaleDownFailed(format!(
                "replica {} is no longer a member",
                replica_id
            )));
        };

        // terminate() may abort the calling task's own window timer. The
        // code from here to the return runs before that task next yields,
        // so removal and the writer unlock still complete.
        replica.terminate();
        self.members_write().remove(replica_id);
        info!(
            "object {} scaled down to {} replicas",
            self.object_id,
            self.replica_count()
        );
        Ok(())
    }

    /// Tear the group down: stop the creation window, terminate every
    /// replica, drop membership. Idempotent.
    pub(crate) async fn on_destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _writer = self.writer.lock().await;
        self.scale_window_guard().take();
        let drained: Vec<Arc<ServerReplica>> = {
            let mut members = self.members_write();
            members.order.clear();
            members.by_id.drain().map(|(_, replica)| replica).collect()
        };
        for replica in &drained {
            replica.terminate();
        }
        info!(
            "object {} destroyed, {} replicas terminated",
            self.object_id,
            drained.len()
        );
    }

    pub(crate) fn install_scale_window(&self, window: GroupScaleWindow) {
        *self.scale_window_guard() = Some(window);
    }

    fn ensure_alive(&self) -> Result<(), CallError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(CallError::ObjectNotFound(self.object_id));
        }
        Ok(())
    }

    /// Confirm the replica's host is live in the registry, then record the
    /// placement.
    fn pin_checked(&self, replica: &Arc<ServerReplica>) -> Result<(), CallError> {
        let host = replica.host();
        if !self.registry.is_live(host, &self.region)? {
            error!(
                "host {} is not live in region '{}', refusing to pin replica {}",
                host,
                self.region,
                replica.id()
            );
            return Err(PlacementError::HostNotLive {
                host,
                region: self.region.clone(),
            }
            .into());
        }
        replica.pin(host);
        Ok(())
    }

    fn members_read(&self) -> RwLockReadGuard<'_, Members> {
        match self.members.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn members_write(&self) -> RwLockWriteGuard<'_, Members> {
        match self.members.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn scale_window_guard(&self) -> std::sync::MutexGuard<'_, Option<GroupScaleWindow>> {
        match self.scale_window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for GroupCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupCoordinator")
            .field("object_id", &self.object_id)
            .field("region", &self.region)
            .field("replicas", &self.replica_count())
            .finish_non_exhaustive()
    }
}
