//! # Transaction State
//!
//! Identity, votes, and the guarded per-call state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::errors::TransactionError;

/// Identity of one transaction attempt. Never reused across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId(Uuid);

impl TxnId {
    /// Mint a fresh transaction id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validator verdict for a transaction that finished executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Yes,
    No,
}

/// Lifecycle of one transaction attempt.
///
/// `Active` may move to `VotedYes`, `VotedNo` or straight to `Aborted` (on an
/// execution fault). `VotedYes` commits; `VotedNo` aborts. `Committed` and
/// `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    VotedYes,
    VotedNo,
    Committed,
    Aborted,
}

impl TransactionState {
    /// Whether the state machine allows moving to `next`.
    pub fn can_transition_to(self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Active, VotedYes)
                | (Active, VotedNo)
                | (Active, Aborted)
                | (VotedYes, Committed)
                | (VotedNo, Aborted)
        )
    }

    /// Whether no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }

    /// State name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            TransactionState::Active => "active",
            TransactionState::VotedYes => "voted-yes",
            TransactionState::VotedNo => "voted-no",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        }
    }
}

/// One transaction attempt and its current state.
#[derive(Debug)]
pub struct Transaction {
    id: TxnId,
    state: TransactionState,
}

impl Transaction {
    /// Open a transaction in the `Active` state.
    pub fn begin() -> Self {
        Self {
            id: TxnId::generate(),
            state: TransactionState::Active,
        }
    }

    /// The transaction's id.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// The current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, next: TransactionState) -> Result<(), TransactionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransactionError::IllegalTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }
        self.state = next;
        Ok(())
    }
}
