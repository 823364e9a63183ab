//! # Call Transport
//!
//! Delivery of a selected call to its replica. The trait is the seam a
//! networked deployment replaces; [`Call`] is serde-serializable so a remote
//! transport only has to move JSON and route by host.

use std::sync::Arc;

use crate::object::Call;
use crate::policy::chain::BoxFuture;
use crate::policy::errors::CallResult;
use crate::runtime::replica::ServerReplica;

/// Moves one call from a client handle to a server replica.
pub trait CallTransport: Send + Sync {
    /// Deliver the call and return the replica's answer.
    fn deliver<'a>(&'a self, replica: &'a Arc<ServerReplica>, call: &'a Call)
        -> BoxFuture<'a, CallResult>;
}

/// In-process delivery: the call runs on the replica directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }
}

impl CallTransport for LocalTransport {
    fn deliver<'a>(
        &'a self,
        replica: &'a Arc<ServerReplica>,
        call: &'a Call,
    ) -> BoxFuture<'a, CallResult> {
        Box::pin(async move { replica.handle_call(call).await })
    }
}
