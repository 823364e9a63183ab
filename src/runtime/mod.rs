//! # Runtime Module
//!
//! The deployment machinery around policy-managed objects: groups owning
//! replica membership, replicas serving calls through their policy chains,
//! and the manager/client surface applications actually touch.
//!
//! ## Architecture
//!
//! - `manager`: deploy, open, delete; owns every group
//! - `group`: per-object membership, placement, scale actions
//! - `replica`: one placed copy of the object plus its call chain
//! - `selector`: client-side replica choice (sticky or rotating)
//! - `transport`: in-process call delivery behind a replaceable seam
//! - `client`: the handle applications invoke through

pub mod client;
pub mod group;
pub mod manager;
pub mod replica;
pub mod selector;
pub mod transport;

pub use client::ClientHandle;
pub use group::GroupCoordinator;
pub use manager::{DeploySpec, ObjectManager};
pub use replica::ServerReplica;
pub use selector::{CachedSelector, ReplicaSelector, RoundRobinSelector};
pub use transport::{CallTransport, LocalTransport};
