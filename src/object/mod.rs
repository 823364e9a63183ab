//! # Application Objects
//!
//! The boundary between the policy runtime and application code.
//!
//! ## Architecture
//!
//! - **Identity**: object and replica ids
//! - **Call**: method name plus JSON arguments
//! - **AppObject**: the trait application state implements
//! - **ObjectCell**: lock-guarded owner of one replica's state
//! - **KeyValueObject**: sample object used by demos and tests

pub mod app;
pub mod call;
pub mod cell;
pub mod id;
pub mod kv;

pub use app::{AppFault, AppObject};
pub use call::Call;
pub use cell::ObjectCell;
pub use id::{ObjectId, ReplicaId};
pub use kv::KeyValueObject;
