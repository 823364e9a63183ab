//! # Transaction Validation
//!
//! Conflict detection deciding whether a finished transaction may commit.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::policy::errors::TransactionError;

use super::state::{TxnId, Vote};

/// Decides whether a finished transaction may commit.
///
/// `begin` runs when a transaction opens, `vote` at most once after its
/// sandboxed execution succeeds, and `finish` exactly once when the
/// transaction reaches a terminal state.
pub trait TransactionValidator: Send + Sync {
    /// Note that a transaction opened.
    fn begin(&self, txn: TxnId);

    /// Verdict for a transaction that executed successfully.
    fn vote(&self, txn: TxnId) -> Result<Vote, TransactionError>;

    /// Note that a transaction reached a terminal state.
    fn finish(&self, txn: TxnId);
}

/// Serializing validator: any temporal overlap between two transactions on
/// the same replica is a conflict, and every overlapped transaction votes no.
///
/// This is the strictest correct default. Looser validators (read/write-set
/// comparison) can be swapped in through the two-phase-commit policy.
#[derive(Debug, Default)]
pub struct NonconcurrentValidator {
    /// In-flight transactions, flagged true once they overlapped another.
    in_flight: Mutex<HashMap<TxnId, bool>>,
}

impl NonconcurrentValidator {
    /// Create a validator with no in-flight transactions.
    pub fn new() -> Self {
        Self::default()
    }

    fn in_flight_guard(&self) -> MutexGuard<'_, HashMap<TxnId, bool>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TransactionValidator for NonconcurrentValidator {
    fn begin(&self, txn: TxnId) {
        let mut in_flight = self.in_flight_guard();
        let overlapped = !in_flight.is_empty();
        if overlapped {
            // The newcomer taints every running transaction, itself
            // included.
            for flag in in_flight.values_mut() {
                *flag = true;
            }
        }
        in_flight.insert(txn, overlapped);
    }

    fn vote(&self, txn: TxnId) -> Result<Vote, TransactionError> {
        match self.in_flight_guard().get(&txn) {
            Some(true) => Ok(Vote::No),
            Some(false) => Ok(Vote::Yes),
            None => Err(TransactionError::Unregistered(txn)),
        }
    }

    fn finish(&self, txn: TxnId) {
        self.in_flight_guard().remove(&txn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solitary_transaction_votes_yes() {
        let validator = NonconcurrentValidator::new();
        let txn = TxnId::generate();

        validator.begin(txn);
        assert_eq!(validator.vote(txn).unwrap(), Vote::Yes);
        validator.finish(txn);
    }

    #[test]
    fn test_overlapping_transactions_both_vote_no() {
        let validator = NonconcurrentValidator::new();
        let first = TxnId::generate();
        let second = TxnId::generate();

        validator.begin(first);
        validator.begin(second);

        assert_eq!(validator.vote(first).unwrap(), Vote::No);
        assert_eq!(validator.vote(second).unwrap(), Vote::No);

        validator.finish(first);
        validator.finish(second);
    }

    #[test]
    fn test_sequential_transactions_unaffected() {
        let validator = NonconcurrentValidator::new();

        let first = TxnId::generate();
        validator.begin(first);
        assert_eq!(validator.vote(first).unwrap(), Vote::Yes);
        validator.finish(first);

        let second = TxnId::generate();
        validator.begin(second);
        assert_eq!(validator.vote(second).unwrap(), Vote::Yes);
        validator.finish(second);
    }

    #[test]
    fn test_overlap_taint_survives_finish() {
        let validator = NonconcurrentValidator::new();
        let first = TxnId::generate();
        let second = TxnId::generate();

        validator.begin(first);
        validator.begin(second);
        validator.finish(first);

        // The overlap already happened; finishing the other side does not
        // clean the survivor.
        assert_eq!(validator.vote(second).unwrap(), Vote::No);
        validator.finish(second);
    }

    #[test]
    fn test_unregistered_vote_errors() {
        let validator = NonconcurrentValidator::new();
        let ghost = TxnId::generate();
        assert!(matches!(
            validator.vote(ghost),
            Err(TransactionError::Unregistered(_))
        ));
    }
}
