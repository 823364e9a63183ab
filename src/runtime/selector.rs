//! # Replica Selection
//!
//! Client-side choice of which replica serves each call. Selectors resolve
//! lazily through a weak group reference, so a handle never keeps a
//! destroyed object alive and always notices destruction on the next
//! resolution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use rand::rngs::StdRng;
use rand::Rng;

use crate::object::ObjectId;
use crate::policy::errors::CallError;
use crate::runtime::group::GroupCoordinator;
use crate::runtime::replica::ServerReplica;

/// Picks the replica that serves one client call.
pub trait ReplicaSelector: Send + Sync {
    /// Resolve a replica for the next call.
    fn select(&self) -> Result<Arc<ServerReplica>, CallError>;

    /// Discard any cached routing state; the next call re-resolves.
    fn invalidate(&self) {}
}

/// Sticks to the group's first replica, resolving it once and caching the
/// reference until invalidated.
pub struct CachedSelector {
    object_id: ObjectId,
    group: Weak<GroupCoordinator>,
    cached: Mutex<Option<Arc<ServerReplica>>>,
}

impl CachedSelector {
    pub fn new(object_id: ObjectId, group: Weak<GroupCoordinator>) -> Self {
        Self {
            object_id,
            group,
            cached: Mutex::new(None),
        }
    }

    fn cached(&self) -> std::sync::MutexGuard<'_, Option<Arc<ServerReplica>>> {
        match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ReplicaSelector for CachedSelector {
    fn select(&self) -> Result<Arc<ServerReplica>, CallError> {
        let mut cached = self.cached();
        if let Some(replica) = cached.as_ref() {
            return Ok(Arc::clone(replica));
        }
        let group = self
            .group
            .upgrade()
            .ok_or(CallError::ObjectNotFound(self.object_id))?;
        let replica = group.on_ref_request()?;
        *cached = Some(Arc::clone(&replica));
        Ok(replica)
    }

    fn invalidate(&self) {
        self.cached().take();
    }
}

/// Rotates calls across a snapshot of the replica set.
///
/// The snapshot loads lazily and restarts from a random offset on every
/// load, so independent handles spread their first calls instead of piling
/// onto one replica. The cursor never skips or repeats a position within one
/// snapshot.
pub struct RoundRobinSelector {
    object_id: ObjectId,
    group: Weak<GroupCoordinator>,
    snapshot: Mutex<Vec<Arc<ServerReplica>>>,
    cursor: AtomicUsize,
    calls: AtomicUsize,
    refresh_every: Option<usize>,
    rng: Mutex<StdRng>,
}

impl RoundRobinSelector {
    /// Build a rotating selector. With `refresh_every = Some(n)` the
    /// snapshot is discarded every `n` calls so membership changes are
    /// eventually observed.
    pub fn new(
        object_id: ObjectId,
        group: Weak<GroupCoordinator>,
        rng: StdRng,
        refresh_every: Option<usize>,
    ) -> Self {
        Self {
            object_id,
            group,
            snapshot: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            refresh_every,
            rng: Mutex::new(rng),
        }
    }

    fn snapshot(&self) -> std::sync::MutexGuard<'_, Vec<Arc<ServerReplica>>> {
        match self.snapshot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ReplicaSelector for RoundRobinSelector {
    fn select(&self) -> Result<Arc<ServerReplica>, CallError> {
        if let Some(every) = self.refresh_every {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            if n % every == 0 {
                self.invalidate();
            }
        }

        let mut snapshot = self.snapshot();
        if snapshot.is_empty() {
            let group = self
                .group
                .upgrade()
                .ok_or(CallError::ObjectNotFound(self.object_id))?;
            *snapshot = group.servers();
            if snapshot.is_empty() {
                return Err(CallError::ObjectNotFound(self.object_id));
            }
            let start = {
                let mut rng = match self.rng.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                rng.gen_range(0..snapshot.len())
            };
            self.cursor.store(start, Ordering::Relaxed);
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % snapshot.len();
        Ok(Arc::clone(&snapshot[index]))
    }

    fn invalidate(&self) {
        self.snapshot().clear();
    }
}
