//! # Application Boundary
//!
//! The trait application objects implement to be hosted by the runtime.

use serde_json::Value;
use thiserror::Error;

/// Fault raised by application code during a method invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppFault {
    /// The object has no such method.
    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    /// The arguments did not match what the method expects.
    #[error("bad arguments for '{method}': {reason}")]
    BadArguments { method: String, reason: String },

    /// The method itself failed.
    #[error("{0}")]
    Failed(String),
}

/// A stateful application object hosted by the runtime.
///
/// Implementations stay oblivious to replication: the runtime calls
/// [`invoke`](AppObject::invoke) for every inbound method and
/// [`clone_box`](AppObject::clone_box) whenever it needs a deep,
/// self-consistent snapshot (replication, transaction sandboxes).
pub trait AppObject: Send + Sync {
    /// Run one method against the object's state.
    fn invoke(&mut self, method: &str, args: &[Value]) -> Result<Value, AppFault>;

    /// Produce a deep copy of the current state.
    fn clone_box(&self) -> Box<dyn AppObject>;
}
