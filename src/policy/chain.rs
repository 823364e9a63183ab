//! # Call Chain
//!
//! Policy interception as an ordered middleware chain: each link receives
//! the call and a continuation and decides whether to delegate further. The
//! chain terminates at the replica's object cell.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::object::{Call, ObjectCell};
use crate::policy::errors::{CallError, CallResult};

/// Boxed future as produced by chain links.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Final destination of a fully-traversed chain.
pub trait CallTerminal: Send + Sync {
    /// Execute the call against application state.
    fn execute<'a>(&'a self, call: &'a Call) -> BoxFuture<'a, CallResult>;
}

/// One policy-contributed interception layer.
pub trait CallLink: Send + Sync {
    /// Handle one call. Implementations either resolve it themselves or
    /// delegate via `next.run(call)`.
    fn on_call<'a>(&'a self, call: &'a Call, next: Next<'a>) -> BoxFuture<'a, CallResult>;

    /// Release background resources. Called exactly once at replica
    /// termination.
    fn on_destroy(&self) {}
}

/// Continuation over the remaining links and the terminal.
pub struct Next<'a> {
    links: &'a [Arc<dyn CallLink>],
    terminal: &'a dyn CallTerminal,
}

impl<'a> Next<'a> {
    /// Build a continuation covering a whole chain.
    pub fn new(links: &'a [Arc<dyn CallLink>], terminal: &'a dyn CallTerminal) -> Self {
        Self { links, terminal }
    }

    /// Run the rest of the chain.
    pub fn run(self, call: &'a Call) -> BoxFuture<'a, CallResult> {
        Box::pin(async move {
            if let Some((first, rest)) = self.links.split_first() {
                let next = Next {
                    links: rest,
                    terminal: self.terminal,
                };
                first.on_call(call, next).await
            } else {
                // End of the chain, execute against the object.
                self.terminal.execute(call).await
            }
        })
    }
}

impl CallTerminal for ObjectCell {
    fn execute<'a>(&'a self, call: &'a Call) -> BoxFuture<'a, CallResult> {
        Box::pin(async move { self.invoke(call).await.map_err(CallError::from) })
    }
}
