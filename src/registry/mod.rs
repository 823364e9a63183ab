//! # Server Registry
//!
//! Liveness-tracked fleet membership, grouped by region.
//!
//! ## Architecture
//!
//! - **Host metadata**: addresses, regions, labels, selectors
//! - **InMemoryRegistry**: reference implementation with heartbeat countdowns
//! - **HeartbeatAgent**: keep-alive loop run by fleet hosts
//!
//! The policy runtime consumes the [`ServerRegistry`] trait only; networked
//! deployments can substitute their own implementation.

pub mod agent;
pub mod errors;
pub mod host;
pub mod manager;

pub use agent::HeartbeatAgent;
pub use errors::{RegistryError, RegistryResult};
pub use host::{HostAddr, HostInfo, HostRecord, NodeSelector, Region};
pub use manager::{InMemoryRegistry, RegistryConfig};

/// Fleet membership as the policy runtime sees it.
///
/// Implementations are expected to answer quickly; a network-backed registry
/// should serve these from a local cache.
pub trait ServerRegistry: Send + Sync {
    /// Add a host to the fleet and start its liveness countdown.
    fn register(&self, host: HostInfo) -> RegistryResult<()>;

    /// Reset a host's liveness countdown. Fails with
    /// [`RegistryError::UnknownHost`] when the host is not registered in the
    /// region.
    fn heartbeat(&self, addr: HostAddr, region: &Region) -> RegistryResult<()>;

    /// Remove a host. Removing an already-gone host is a no-op.
    fn deregister(&self, addr: HostAddr, region: &Region) -> RegistryResult<()>;

    /// One eligible host matching the selector, or `None`. Selection among
    /// several matches may be random; callers must not depend on which host
    /// comes back.
    fn best_host(&self, selector: &NodeSelector) -> RegistryResult<Option<HostAddr>>;

    /// Live hosts of a region in registration order. The order defines
    /// "first eligible host" tie-breaks during placement.
    fn hosts_in_region(&self, region: &Region) -> RegistryResult<Vec<HostAddr>>;

    /// Known regions, sorted by name.
    fn regions(&self) -> RegistryResult<Vec<Region>>;

    /// Whether a host is currently live in a region.
    fn is_live(&self, addr: HostAddr, region: &Region) -> RegistryResult<bool> {
        Ok(self.hosts_in_region(region)?.contains(&addr))
    }
}
