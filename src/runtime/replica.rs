//! # Server Replica
//!
//! One placed copy of a distributed object: the object state plus the
//! policy links every incoming call runs through. Replicas are created by
//! their group, pinned to a host, and terminated exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, info};

use crate::object::{Call, ObjectCell, ObjectId, ReplicaId};
use crate::policy::chain::{CallLink, CallTerminal, Next};
use crate::policy::errors::{CallError, CallResult};
use crate::policy::stack::{LinkContext, PolicyStack};
use crate::registry::HostAddr;
use crate::runtime::group::GroupCoordinator;

/// A server-side replica of one distributed object.
pub struct ServerReplica {
    id: ReplicaId,
    object_id: ObjectId,
    host: RwLock<HostAddr>,
    cell: Arc<ObjectCell>,
    links: Vec<Arc<dyn CallLink>>,
    terminated: AtomicBool,
}

impl ServerReplica {
    /// Create a replica around existing state, building a fresh link chain
    /// from the policy stack.
    pub(crate) fn create(
        object_id: ObjectId,
        host: HostAddr,
        cell: Arc<ObjectCell>,
        stack: &PolicyStack,
        group: Weak<GroupCoordinator>,
    ) -> Arc<Self> {
        let id = ReplicaId::generate();
        let ctx = LinkContext {
            replica_id: id,
            object_id,
            group,
            cell: Arc::clone(&cell),
        };
        let links = stack.server_links(&ctx);
        Arc::new(Self {
            id,
            object_id,
            host: RwLock::new(host),
            cell,
            links,
            terminated: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// The host this replica is pinned to.
    pub fn host(&self) -> HostAddr {
        match self.host.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Record the replica's placement.
    pub(crate) fn pin(&self, host: HostAddr) {
        let mut guard = match self.host.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = host;
        drop(guard);
        info!("replica {} pinned to {}", self.id, host);
    }

    /// Run one call through the replica's policy chain into the object.
    pub async fn handle_call(&self, call: &Call) -> CallResult {
        if self.terminated.load(Ordering::Acquire) {
            return Err(CallError::ReplicaNotFound(self.id));
        }
        let terminal: &dyn CallTerminal = self.cell.as_ref();
        Next::new(&self.links, terminal).run(call).await
    }

    /// Fork this replica's state into a new replica for `host`, with its
    /// own fresh link chain.
    pub(crate) async fn replicate_onto(
        &self,
        host: HostAddr,
        stack: &PolicyStack,
        group: Weak<GroupCoordinator>,
    ) -> Arc<ServerReplica> {
        let cell = Arc::new(self.cell.fork().await);
        Self::create(self.object_id, host, cell, stack, group)
    }

    /// Stop serving and release every link's background resources. Safe to
    /// call more than once; only the first call runs the link teardown.
    pub(crate) fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        for link in &self.links {
            link.on_destroy();
        }
        debug!("replica {} terminated", self.id);
    }
}

impl std::fmt::Debug for ServerReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerReplica")
            .field("id", &self.id)
            .field("object_id", &self.object_id)
            .field("host", &self.host())
            .field("links", &self.links.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::KeyValueObject;
    use serde_json::json;

    fn replica_on(host: &str) -> Arc<ServerReplica> {
        let cell = Arc::new(ObjectCell::new(Box::new(KeyValueObject::new())));
        ServerReplica::create(
            ObjectId::generate(),
            host.parse().unwrap(),
            cell,
            &PolicyStack::new(),
            Weak::new(),
        )
    }

    /// Calls on a bare replica reach the object.
    #[tokio::test]
    async fn test_handle_call_reaches_object() {
        let replica = replica_on("10.2.0.1:7400");
        replica
            .handle_call(&Call::new("set", vec![json!("k"), json!(7)]))
            .await
            .unwrap();
        let got = replica
            .handle_call(&Call::new("get", vec![json!("k")]))
            .await
            .unwrap();
        assert_eq!(got, json!(7));
    }

    /// A terminated replica rejects every call.
    #[tokio::test]
    async fn test_terminated_replica_rejects_calls() {
        let replica = replica_on("10.2.0.1:7400");
        replica.terminate();
        replica.terminate();

        let result = replica.handle_call(&Call::nullary("len")).await;
        assert!(matches!(result, Err(CallError::ReplicaNotFound(id)) if id == replica.id()));
    }

    /// Replication forks state; the copies then diverge independently.
    #[tokio::test]
    async fn test_replicate_onto_forks_state() {
        let replica = replica_on("10.2.0.1:7400");
        replica
            .handle_call(&Call::new("set", vec![json!("k"), json!(1)]))
            .await
            .unwrap();

        let copy = replica
            .replicate_onto("10.2.0.2:7400".parse().unwrap(), &PolicyStack::new(), Weak::new())
            .await;
        assert_ne!(copy.id(), replica.id());
        assert_eq!(copy.host().to_string(), "10.2.0.2:7400");

        replica
            .handle_call(&Call::new("set", vec![json!("k"), json!(2)]))
            .await
            .unwrap();
        let got = copy
            .handle_call(&Call::new("get", vec![json!("k")]))
            .await
            .unwrap();
        assert_eq!(got, json!(1));
    }
}
