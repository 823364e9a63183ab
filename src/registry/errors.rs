//! # Registry Errors
//!
//! Error types for the server registry.

use thiserror::Error;

use super::host::{HostAddr, Region};

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A heartbeat or removal referenced a host the registry does not track.
    #[error("unknown host {addr} in region '{region}'")]
    UnknownHost { addr: HostAddr, region: Region },

    /// The registry backend could not be reached.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    /// Whether this error flags a registry inconsistency rather than an
    /// infrastructure failure.
    pub fn is_inconsistency(&self) -> bool {
        matches!(self, RegistryError::UnknownHost { .. })
    }
}
