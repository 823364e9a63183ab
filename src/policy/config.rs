//! # Policy Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_max_concurrent_requests() -> usize {
    20
}

fn default_replica_count() -> usize {
    2
}

fn default_replication_window_ms() -> u64 {
    100
}

fn default_replicas_per_window() -> usize {
    1
}

/// Tunables for bounded-concurrency admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// In-flight request ceiling per replica.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Replica count statically provisioned at group creation.
    #[serde(default = "default_replica_count")]
    pub replica_count: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            replica_count: default_replica_count(),
        }
    }
}

/// Tunables for elastic scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingConfig {
    /// Scaling window period in milliseconds.
    #[serde(default = "default_replication_window_ms")]
    pub replication_window_ms: u64,

    /// Replica creations allowed per window.
    #[serde(default = "default_replicas_per_window")]
    pub replicas_per_window: usize,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            replication_window_ms: default_replication_window_ms(),
            replicas_per_window: default_replicas_per_window(),
        }
    }
}

impl ScalingConfig {
    /// Window period as a duration.
    pub fn replication_window(&self) -> Duration {
        Duration::from_millis(self.replication_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_defaults() {
        let config = AdmissionConfig::default();
        assert_eq!(config.max_concurrent_requests, 20);
        assert_eq!(config.replica_count, 2);
    }

    #[test]
    fn test_scaling_defaults() {
        let config = ScalingConfig::default();
        assert_eq!(config.replication_window_ms, 100);
        assert_eq!(config.replicas_per_window, 1);
        assert_eq!(config.replication_window(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: AdmissionConfig = serde_json::from_str(r#"{"replica_count": 5}"#).unwrap();
        assert_eq!(config.replica_count, 5);
        assert_eq!(config.max_concurrent_requests, 20);
    }
}
