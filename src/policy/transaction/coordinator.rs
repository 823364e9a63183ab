//! # Two-Phase Commit Coordinator
//!
//! Per-call transactional execution against a sandboxed copy of the object.

use std::sync::Arc;

use tracing::debug;

use crate::object::{Call, ObjectCell};
use crate::policy::chain::{BoxFuture, CallLink, Next};
use crate::policy::errors::{AbortCause, CallError, CallResult};

use super::state::{Transaction, TransactionState, Vote};
use super::validator::TransactionValidator;

/// Wraps every call in a begin / sandboxed-execute / vote / commit-or-abort
/// cycle.
///
/// Terminal link: execution happens against the transaction's own sandbox,
/// so the coordinator never delegates down the chain. Composing admission
/// control or scaling outside it still works; nothing may sit between the
/// coordinator and the object.
pub struct TxnCoordinator {
    cell: Arc<ObjectCell>,
    validator: Arc<dyn TransactionValidator>,
}

impl TxnCoordinator {
    /// Create a coordinator over a replica's durable cell.
    pub(crate) fn new(cell: Arc<ObjectCell>, validator: Arc<dyn TransactionValidator>) -> Self {
        Self { cell, validator }
    }

    /// Drive one transaction to a terminal state.
    async fn run(&self, txn: &mut Transaction, call: &Call) -> CallResult {
        let sandbox = self.cell.fork().await;

        match sandbox.invoke(call).await {
            Err(fault) => {
                txn.transition(TransactionState::Aborted)?;
                debug!(
                    "transaction {} aborted on execution fault: {}",
                    txn.id(),
                    fault
                );
                Err(CallError::TransactionAborted {
                    cause: AbortCause::ExecutionFault(fault.to_string()),
                })
            }
            Ok(value) => match self.validator.vote(txn.id())? {
                Vote::Yes => {
                    txn.transition(TransactionState::VotedYes)?;
                    self.cell.replace(sandbox.into_object()).await;
                    txn.transition(TransactionState::Committed)?;
                    debug!("transaction {} committed", txn.id());
                    Ok(value)
                }
                Vote::No => {
                    txn.transition(TransactionState::VotedNo)?;
                    txn.transition(TransactionState::Aborted)?;
                    debug!("transaction {} aborted on negative vote", txn.id());
                    Err(CallError::TransactionAborted {
                        cause: AbortCause::NegativeVote,
                    })
                }
            },
        }
    }
}

impl CallLink for TxnCoordinator {
    fn on_call<'a>(&'a self, call: &'a Call, _next: Next<'a>) -> BoxFuture<'a, CallResult> {
        Box::pin(async move {
            let mut txn = Transaction::begin();
            self.validator.begin(txn.id());
            debug!("transaction {} opened for '{}'", txn.id(), call.method);

            let result = self.run(&mut txn, call).await;

            // Deregistration happens on every exit path; the sandbox is gone
            // by here (merged on commit, dropped otherwise).
            self.validator.finish(txn.id());
            result
        })
    }
}
