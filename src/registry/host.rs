//! # Host Metadata
//!
//! Addresses, regions, labels, and the selectors that narrow host choice.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Network address of a fleet host.
pub type HostAddr = SocketAddr;

/// Logical placement region (datacenter, zone, rack; deployment-defined).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region(String);

impl Region {
    /// Create a region from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The region name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Region {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Region {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Descriptor a host presents when joining the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    /// Address the host serves on.
    pub addr: HostAddr,

    /// Region the host belongs to.
    pub region: Region,

    /// Free-form scheduling labels (e.g. `tier=frontend`).
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl HostInfo {
    /// Create a host descriptor with no labels.
    pub fn new(addr: HostAddr, region: impl Into<Region>) -> Self {
        Self {
            addr,
            region: region.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Attach a scheduling label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A registered host plus its liveness bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    /// The descriptor the host registered with.
    pub info: HostInfo,

    /// When the host joined.
    pub registered_at: DateTime<Utc>,

    /// Last heartbeat received.
    pub last_heartbeat: DateTime<Utc>,
}

impl HostRecord {
    /// Record a freshly registered host.
    pub fn new(info: HostInfo) -> Self {
        let now = Utc::now();
        Self {
            info,
            registered_at: now,
            last_heartbeat: now,
        }
    }

    /// Note a heartbeat.
    pub fn touch(&mut self) {
        self.last_heartbeat = Utc::now();
    }
}

/// Constraints narrowing host selection.
///
/// An empty selector matches every host; a region constraint and each label
/// constraint must all hold for a host to qualify.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSelector {
    /// Required region, if any.
    pub region: Option<Region>,

    /// Labels the host must carry with exactly these values.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl NodeSelector {
    /// Selector matching any host.
    pub fn any() -> Self {
        Self::default()
    }

    /// Selector constrained to one region.
    pub fn in_region(region: impl Into<Region>) -> Self {
        Self {
            region: Some(region.into()),
            labels: BTreeMap::new(),
        }
    }

    /// Add a required label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Whether a host satisfies every constraint.
    pub fn matches(&self, host: &HostInfo) -> bool {
        if let Some(region) = &self.region {
            if *region != host.region {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(key, value)| host.labels.get(key) == Some(value))
    }
}
