//! # Object Manager
//!
//! Front door of the runtime: deploys application objects onto registered
//! hosts, hands out client handles, and tears deployments down. One manager
//! instance owns every group it created.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info};

use crate::object::{AppObject, ObjectCell, ObjectId};
use crate::policy::errors::{CallError, PlacementError};
use crate::policy::stack::PolicyStack;
use crate::registry::{NodeSelector, Region, ServerRegistry};
use crate::runtime::client::ClientHandle;
use crate::runtime::group::GroupCoordinator;
use crate::runtime::replica::ServerReplica;
use crate::runtime::transport::{CallTransport, LocalTransport};

/// Where and how to deploy one object.
pub struct DeploySpec {
    region: Region,
    stack: PolicyStack,
    labels: BTreeMap<String, String>,
}

impl DeploySpec {
    /// Deploy into `region` with the given policy stack.
    pub fn new(region: impl Into<Region>, stack: PolicyStack) -> Self {
        Self {
            region: region.into(),
            stack,
            labels: BTreeMap::new(),
        }
    }

    /// Restrict origin placement to hosts carrying this label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Deploys objects and manages their lifetime.
pub struct ObjectManager {
    registry: Arc<dyn ServerRegistry>,
    transport: Arc<dyn CallTransport>,
    groups: RwLock<HashMap<ObjectId, Arc<GroupCoordinator>>>,
    rng: Mutex<StdRng>,
}

impl ObjectManager {
    /// A manager over the given registry, randomly seeded.
    pub fn new(registry: Arc<dyn ServerRegistry>) -> Self {
        Self::with_rng(registry, StdRng::from_entropy())
    }

    /// A manager with an explicit source of randomness. Every handle's
    /// routing seed derives from it, so a fixed seed makes client behavior
    /// reproducible.
    pub fn with_rng(registry: Arc<dyn ServerRegistry>, rng: StdRng) -> Self {
        Self {
            registry,
            transport: Arc::new(LocalTransport::new()),
            groups: RwLock::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Replace the in-process transport, builder style.
    pub fn with_transport(mut self, transport: Arc<dyn CallTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Deploy `object` per `spec` and return the first client handle.
    ///
    /// Placement, replication, and every policy creation hook must succeed;
    /// otherwise the deployment is rolled back and nothing is retained.
    pub async fn deploy(
        &self,
        spec: DeploySpec,
        object: Box<dyn AppObject>,
    ) -> Result<ClientHandle, CallError> {
        let object_id = ObjectId::generate();

        let constraints = NodeSelector {
            region: Some(spec.region.clone()),
            labels: spec.labels.clone(),
        };
        let origin_host = self
            .registry
            .best_host(&constraints)
            .map_err(|err| PlacementError::RegistryUnavailable(err.to_string()))?
            .ok_or_else(|| {
                error!(
                    "no host in region '{}' matches the deployment constraints",
                    spec.region
                );
                PlacementError::NoEligibleHost {
                    region: spec.region.clone(),
                }
            })?;

        let stack = Arc::new(spec.stack);
        let group = GroupCoordinator::new(
            object_id,
            spec.region,
            Arc::clone(&stack),
            Arc::clone(&self.registry),
        );
        let cell = Arc::new(ObjectCell::new(object));
        let origin = ServerReplica::create(
            object_id,
            origin_host,
            cell,
            &stack,
            Arc::downgrade(&group),
        );

        if let Err(err) = group.on_create(origin).await {
            // Stop anything provisioning already started.
            group.on_destroy().await;
            return Err(err);
        }

        self.groups_write().insert(object_id, Arc::clone(&group));
        info!(
            "object {} deployed to region '{}' with policies [{}]",
            object_id,
            group.region(),
            stack.names().join(", ")
        );
        Ok(self.session(&group))
    }

    /// A fresh handle to an already-deployed object.
    pub fn open(&self, object_id: ObjectId) -> Result<ClientHandle, CallError> {
        let group = self
            .groups_read()
            .get(&object_id)
            .cloned()
            .ok_or(CallError::ObjectNotFound(object_id))?;
        Ok(self.session(&group))
    }

    /// Destroy a deployment: every replica terminates and later opens fail.
    pub async fn delete(&self, object_id: ObjectId) -> Result<(), CallError> {
        let group = self
            .groups_write()
            .remove(&object_id)
            .ok_or(CallError::ObjectNotFound(object_id))?;
        group.on_destroy().await;
        info!("object {} deleted", object_id);
        Ok(())
    }

    /// Current replica count of a deployed object.
    pub fn replica_count(&self, object_id: ObjectId) -> Result<usize, CallError> {
        let group = self
            .groups_read()
            .get(&object_id)
            .cloned()
            .ok_or(CallError::ObjectNotFound(object_id))?;
        Ok(group.replica_count())
    }

    /// Number of live deployments.
    pub fn object_count(&self) -> usize {
        self.groups_read().len()
    }

    /// Build a handle whose selector draws from a child of the manager's
    /// randomness, so handles never share routing state.
    fn session(&self, group: &Arc<GroupCoordinator>) -> ClientHandle {
        let seed = self.rng_guard().gen();
        let selector = group.stack().selector(group, StdRng::seed_from_u64(seed));
        ClientHandle::new(group.object_id(), selector, Arc::clone(&self.transport))
    }

    fn rng_guard(&self) -> std::sync::MutexGuard<'_, StdRng> {
        match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn groups_read(&self) -> RwLockReadGuard<'_, HashMap<ObjectId, Arc<GroupCoordinator>>> {
        match self.groups.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn groups_write(&self) -> RwLockWriteGuard<'_, HashMap<ObjectId, Arc<GroupCoordinator>>> {
        match self.groups.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ObjectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectManager")
            .field("objects", &self.object_count())
            .finish_non_exhaustive()
    }
}
