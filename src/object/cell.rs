//! # Object Cell
//!
//! Owner of one replica's durable application state.

use tokio::sync::RwLock;

use serde_json::Value;

use super::app::{AppFault, AppObject};
use super::call::Call;

/// Holds a replica's application object behind an async lock.
///
/// Invocations take the write half for the duration of one method; forks and
/// snapshots take the read half, so a fork always observes a state with no
/// method mid-flight.
pub struct ObjectCell {
    state: RwLock<Box<dyn AppObject>>,
}

impl ObjectCell {
    /// Wrap an application object.
    pub fn new(object: Box<dyn AppObject>) -> Self {
        Self {
            state: RwLock::new(object),
        }
    }

    /// Run one call against the live state.
    pub async fn invoke(&self, call: &Call) -> Result<Value, AppFault> {
        let mut state = self.state.write().await;
        state.invoke(&call.method, &call.args)
    }

    /// Deep, self-consistent copy of the current state in a fresh cell
    /// (replication, transaction sandboxes).
    pub async fn fork(&self) -> ObjectCell {
        let state = self.state.read().await;
        ObjectCell::new(state.clone_box())
    }

    /// Replace the state wholesale (transaction merge).
    pub async fn replace(&self, object: Box<dyn AppObject>) {
        *self.state.write().await = object;
    }

    /// Consume the cell, yielding its state.
    pub fn into_object(self) -> Box<dyn AppObject> {
        self.state.into_inner()
    }
}

impl std::fmt::Debug for ObjectCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCell").finish_non_exhaustive()
    }
}
