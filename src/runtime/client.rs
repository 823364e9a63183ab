//! # Client Handle
//!
//! Location-transparent reference to one deployed object. A handle owns a
//! replica selector from the object's policy stack and a transport; it
//! never talks to group internals directly.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::object::{Call, ObjectId};
use crate::policy::errors::CallResult;
use crate::runtime::selector::ReplicaSelector;
use crate::runtime::transport::CallTransport;

/// Caller-side reference to a deployed object.
pub struct ClientHandle {
    object_id: ObjectId,
    selector: Box<dyn ReplicaSelector>,
    transport: Arc<dyn CallTransport>,
}

impl ClientHandle {
    pub(crate) fn new(
        object_id: ObjectId,
        selector: Box<dyn ReplicaSelector>,
        transport: Arc<dyn CallTransport>,
    ) -> Self {
        Self {
            object_id,
            selector,
            transport,
        }
    }

    /// The object this handle refers to.
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Invoke one method on the object through the policy-chosen replica.
    pub async fn invoke(&self, method: impl Into<String>, args: Vec<Value>) -> CallResult {
        let call = Call::new(method, args);
        let replica = self.selector.select()?;
        debug!(
            "object {} routing '{}' to replica {}",
            self.object_id,
            call.method,
            replica.id()
        );
        self.transport.deliver(&replica, &call).await
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("object_id", &self.object_id)
            .finish_non_exhaustive()
    }
}
