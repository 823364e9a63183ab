//! # Policy Stack
//!
//! Behaviors attach to an object as an ordered stack of policies. Each
//! policy contributes call-chain links, lifecycle hooks, and optionally a
//! client-side replica selector; the stack concatenates them so policies
//! compose instead of wrapping one another.

use std::sync::{Arc, Weak};

use rand::rngs::StdRng;

use crate::object::{ObjectCell, ObjectId, ReplicaId};
use crate::policy::chain::{BoxFuture, CallLink};
use crate::policy::errors::CallError;
use crate::runtime::group::GroupCoordinator;
use crate::runtime::replica::ServerReplica;
use crate::runtime::selector::{CachedSelector, ReplicaSelector};

/// Everything a policy may bind its per-replica links to.
pub struct LinkContext {
    /// The replica the links are being built for.
    pub replica_id: ReplicaId,
    /// The object the replica serves.
    pub object_id: ObjectId,
    /// The replica's group, weakly held so links never keep it alive.
    pub group: Weak<GroupCoordinator>,
    /// The replica's local object state.
    pub cell: Arc<ObjectCell>,
}

/// One composable behavior in an object's policy stack.
///
/// Policies contribute per-replica call links (built fresh for every
/// replica), may claim the client-side selector, and may hook group
/// creation to provision replicas or install group state.
pub trait Policy: Send + Sync {
    /// Stable name, used in logs.
    fn name(&self) -> &'static str;

    /// When `true`, the group skips the default pin of the origin replica
    /// and leaves placement to this policy's creation hook.
    fn skips_initial_pin(&self) -> bool {
        false
    }

    /// Build this policy's server-side links for one replica, outermost
    /// first.
    fn server_links(&self, ctx: &LinkContext) -> Vec<Arc<dyn CallLink>>;

    /// Client-side replica selector, if this policy provides one. `rng`
    /// seeds any randomized selection so sessions stay reproducible.
    fn selector(
        &self,
        group: &Arc<GroupCoordinator>,
        rng: &mut StdRng,
    ) -> Option<Box<dyn ReplicaSelector>> {
        let _ = (group, rng);
        None
    }

    /// Hook run once after the origin replica joins its group.
    fn on_group_create<'a>(
        &'a self,
        group: &'a Arc<GroupCoordinator>,
        origin: &'a Arc<ServerReplica>,
    ) -> BoxFuture<'a, Result<(), CallError>> {
        let _ = (group, origin);
        Box::pin(async { Ok(()) })
    }
}

/// An ordered stack of policies attached to one object.
///
/// Link order follows stack order: the first policy's links sit outermost
/// on every replica's call chain.
pub struct PolicyStack {
    policies: Vec<Arc<dyn Policy>>,
}

impl PolicyStack {
    /// An empty stack. Calls go straight to the object.
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// Append a policy, builder style.
    pub fn with(mut self, policy: impl Policy + 'static) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    /// The stacked policies, outermost first.
    pub fn policies(&self) -> &[Arc<dyn Policy>] {
        &self.policies
    }

    /// Policy names, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    /// Whether any stacked policy takes over initial placement.
    pub(crate) fn skips_initial_pin(&self) -> bool {
        self.policies.iter().any(|p| p.skips_initial_pin())
    }

    /// Concatenate every policy's links for one replica, in stack order.
    pub(crate) fn server_links(&self, ctx: &LinkContext) -> Vec<Arc<dyn CallLink>> {
        let mut links = Vec::new();
        for policy in &self.policies {
            links.extend(policy.server_links(ctx));
        }
        links
    }

    /// Build the client-side selector for a new session. The first policy
    /// offering one wins; otherwise calls stick to the group's first
    /// replica.
    pub(crate) fn selector(
        &self,
        group: &Arc<GroupCoordinator>,
        mut rng: StdRng,
    ) -> Box<dyn ReplicaSelector> {
        for policy in &self.policies {
            if let Some(selector) = policy.selector(group, &mut rng) {
                return selector;
            }
        }
        Box::new(CachedSelector::new(
            group.object_id(),
            Arc::downgrade(group),
        ))
    }
}

impl Default for PolicyStack {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PolicyStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStack")
            .field("policies", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Call, KeyValueObject};
    use crate::policy::chain::Next;
    use crate::policy::errors::CallResult;

    struct Tagged {
        name: &'static str,
        skip_pin: bool,
    }

    struct TagLink;

    impl CallLink for TagLink {
        fn on_call<'a>(&'a self, call: &'a Call, next: Next<'a>) -> BoxFuture<'a, CallResult> {
            next.run(call)
        }
    }

    impl Policy for Tagged {
        fn name(&self) -> &'static str {
            self.name
        }

        fn skips_initial_pin(&self) -> bool {
            self.skip_pin
        }

        fn server_links(&self, _ctx: &LinkContext) -> Vec<Arc<dyn CallLink>> {
            vec![Arc::new(TagLink)]
        }
    }

    fn context() -> LinkContext {
        LinkContext {
            replica_id: ReplicaId::generate(),
            object_id: ObjectId::generate(),
            group: Weak::new(),
            cell: Arc::new(ObjectCell::new(Box::new(KeyValueObject::new()))),
        }
    }

    /// Link order follows stack order.
    #[test]
    fn test_links_concatenate_in_stack_order() {
        let stack = PolicyStack::new()
            .with(Tagged {
                name: "outer",
                skip_pin: false,
            })
            .with(Tagged {
                name: "inner",
                skip_pin: false,
            });
        assert_eq!(stack.names(), vec!["outer", "inner"]);
        assert_eq!(stack.server_links(&context()).len(), 2);
    }

    /// One placement-taking policy flips the whole stack.
    #[test]
    fn test_any_policy_may_take_over_placement() {
        let plain = PolicyStack::new().with(Tagged {
            name: "plain",
            skip_pin: false,
        });
        assert!(!plain.skips_initial_pin());

        let placing = plain.with(Tagged {
            name: "placing",
            skip_pin: true,
        });
        assert!(placing.skips_initial_pin());
    }

    /// An empty stack contributes no links.
    #[test]
    fn test_empty_stack_has_no_links() {
        let stack = PolicyStack::new();
        assert!(stack.server_links(&context()).is_empty());
        assert!(!stack.skips_initial_pin());
    }
}
