//! # Policy Errors
//!
//! Error types surfaced by the policy runtime.

use thiserror::Error;

use serde_json::Value;

use crate::object::{AppFault, ObjectId, ReplicaId};
use crate::policy::transaction::TxnId;
use crate::registry::{HostAddr, Region, RegistryError};

/// Outcome of one client invocation.
pub type CallResult = Result<Value, CallError>;

/// Errors surfaced to a caller of `ClientHandle::invoke`.
#[derive(Debug, Error)]
pub enum CallError {
    // ==================
    // Load & Scaling
    // ==================
    /// The chosen replica is at its concurrent-request limit. Retryable;
    /// never retried internally.
    #[error("replica at capacity ({limit} concurrent requests)")]
    Overload { limit: usize },

    /// Replica creation is rate-limited and the current window is exhausted.
    /// Retryable; scaling proceeds on its own clock.
    #[error("replica creation rate exceeded")]
    ScaleUpRateExceeded,

    /// A replica asked to be removed and the group refused or failed. Never
    /// surfaced to invoke callers; consumed and logged by the window tick.
    #[error("scale-down failed: {0}")]
    ScaleDownFailed(String),

    // ==================
    // Transactions
    // ==================
    /// The per-call transaction aborted; nothing was committed.
    #[error("transaction aborted: {cause}")]
    TransactionAborted { cause: AbortCause },

    /// The transaction state machine was driven illegally (runtime bug).
    #[error("transaction state violation: {0}")]
    TransactionState(#[from] TransactionError),

    // ==================
    // Lookup
    // ==================
    /// The logical object is gone (destroyed or never deployed).
    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),

    /// The addressed replica is gone (terminated or never created).
    #[error("replica {0} not found")]
    ReplicaNotFound(ReplicaId),

    // ==================
    // Infrastructure
    // ==================
    /// Placement could not satisfy the request.
    #[error(transparent)]
    Placement(#[from] PlacementError),

    /// The registry failed while serving this call.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Application code raised a fault.
    #[error("application fault: {0}")]
    Application(#[from] AppFault),

    /// The transport could not deliver the call.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl CallError {
    /// Whether retrying the same call later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CallError::Overload { .. } | CallError::ScaleUpRateExceeded
        )
    }
}

/// Fatal errors raised while placing replicas on hosts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// No host in the region can take another replica.
    #[error("no eligible host left in region '{region}'")]
    NoEligibleHost { region: Region },

    /// The region has fewer distinct hosts than the policy requires.
    #[error("region '{region}' has {available} eligible hosts, {required} required")]
    InsufficientHosts {
        region: Region,
        required: usize,
        available: usize,
    },

    /// A pin target was not live in the registry.
    #[error("host {host} is not live in region '{region}'")]
    HostNotLive { host: HostAddr, region: Region },

    /// The registry could not be consulted.
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),
}

/// Why a per-call transaction aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortCause {
    /// The sandboxed execution raised a fault.
    #[error("execution fault: {0}")]
    ExecutionFault(String),

    /// The validator voted against committing.
    #[error("validator voted no")]
    NegativeVote,
}

/// Violations of the transaction state machine.
///
/// These indicate runtime bugs, not application failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// A transition the state machine does not allow.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },

    /// A vote was requested for a transaction the validator never saw.
    #[error("transaction {0} is not registered with the validator")]
    Unregistered(TxnId),
}
