//! # Policy Module
//!
//! Composable behaviors that attach to distributed objects: admission
//! control, elastic scaling, and two-phase-commit transactions, all
//! expressed as links on a per-replica call chain plus group-level hooks.
//!
//! ## Architecture
//!
//! - `chain`: the call chain every server replica runs requests through
//! - `stack`: the `Policy` trait and ordered `PolicyStack` composition
//! - `admission`: semaphore-gated admission with static replica provisioning
//! - `scaling`: elastic scale-up on overload, windowed scale-down on idle
//! - `transaction`: two-phase-commit call wrapping with pluggable validators
//! - `config`: serde-friendly tuning knobs with defaults
//! - `errors`: call-path error types

pub mod admission;
pub mod chain;
pub mod config;
pub mod errors;
pub mod scaling;
pub mod stack;
pub mod transaction;

pub use admission::AdmissionControl;
pub use chain::{BoxFuture, CallLink, CallTerminal, Next};
pub use config::{AdmissionConfig, ScalingConfig};
pub use errors::{AbortCause, CallError, CallResult, PlacementError, TransactionError};
pub use scaling::ElasticScaling;
pub use stack::{LinkContext, Policy, PolicyStack};
pub use transaction::{NonconcurrentValidator, TransactionValidator, TwoPhaseCommit};
