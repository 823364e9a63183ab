//! # Two-Phase Commit Policy
//!
//! Per-call transactions: begin, execute in an isolated sandbox, vote,
//! commit or abort. No partial state ever reaches the durable object.
//!
//! ## Architecture
//!
//! - **State**: transaction ids, votes, guarded state machine
//! - **Validator**: pluggable conflict detection (serializing default)
//! - **Coordinator**: the chain link driving the cycle

pub mod coordinator;
pub mod state;
pub mod validator;

pub use coordinator::TxnCoordinator;
pub use state::{Transaction, TransactionState, TxnId, Vote};
pub use validator::{NonconcurrentValidator, TransactionValidator};

use std::sync::Arc;

use crate::policy::chain::CallLink;
use crate::policy::stack::{LinkContext, Policy};

/// Factory producing one validator per replica.
type ValidatorFactory = Box<dyn Fn() -> Arc<dyn TransactionValidator> + Send + Sync>;

/// The two-phase-commit policy.
///
/// Installs a [`TxnCoordinator`] as the innermost link of every replica,
/// with a fresh validator per replica. Conflict detection is scoped to one
/// replica's state; cross-replica coordination is the concern of whatever
/// topology policy sits above.
pub struct TwoPhaseCommit {
    validator_factory: ValidatorFactory,
}

impl TwoPhaseCommit {
    /// Two-phase commit with the serializing default validator.
    pub fn new() -> Self {
        Self::with_validator(|| Arc::new(NonconcurrentValidator::new()))
    }

    /// Two-phase commit with a custom validator factory.
    pub fn with_validator<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn TransactionValidator> + Send + Sync + 'static,
    {
        Self {
            validator_factory: Box::new(factory),
        }
    }
}

impl Default for TwoPhaseCommit {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for TwoPhaseCommit {
    fn name(&self) -> &'static str {
        "two-phase-commit"
    }

    fn server_links(&self, ctx: &LinkContext) -> Vec<Arc<dyn CallLink>> {
        vec![Arc::new(TxnCoordinator::new(
            Arc::clone(&ctx.cell),
            (self.validator_factory)(),
        ))]
    }
}
