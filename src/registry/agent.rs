//! # Heartbeat Agent
//!
//! Keeps a registered host alive by heartbeating on a fixed period.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::host::{HostAddr, Region};
use super::ServerRegistry;
use crate::timer::Countdown;

/// Background heartbeat loop for one host.
///
/// The loop runs until [`stop`](HeartbeatAgent::stop) is called or the agent
/// is dropped. A rejected heartbeat (the registry already expired the host)
/// is logged and the loop keeps going, so a re-registered host resumes being
/// kept alive without a new agent.
pub struct HeartbeatAgent {
    ticker: Countdown,
}

impl HeartbeatAgent {
    /// Start heartbeating `addr` against `registry` every `period`.
    pub fn start(
        registry: Arc<dyn ServerRegistry>,
        addr: HostAddr,
        region: Region,
        period: Duration,
    ) -> Self {
        let ticker = Countdown::every(period, move || {
            let registry = Arc::clone(&registry);
            let region = region.clone();
            Box::pin(async move {
                if let Err(err) = registry.heartbeat(addr, &region) {
                    warn!("heartbeat for host {} rejected: {}", addr, err);
                }
            })
        });
        Self { ticker }
    }

    /// Stop heartbeating. The host will expire unless something else keeps
    /// it alive.
    pub fn stop(&self) {
        self.ticker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{HostInfo, InMemoryRegistry, RegistryConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[tokio::test]
    async fn test_agent_keeps_host_alive() {
        let registry = InMemoryRegistry::with_rng(
            RegistryConfig {
                heartbeat_timeout_ms: 80,
            },
            StdRng::seed_from_u64(3),
        );
        let addr: HostAddr = "10.0.0.1:7000".parse().unwrap();
        let region = Region::new("us-east");
        registry.register(HostInfo::new(addr, "us-east")).unwrap();

        let agent = HeartbeatAgent::start(
            registry.clone(),
            addr,
            region.clone(),
            Duration::from_millis(20),
        );

        // Several timeout windows pass; the agent keeps resetting the
        // countdown.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(registry.hosts_in_region(&region).unwrap(), vec![addr]);

        agent.stop();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.hosts_in_region(&region).unwrap().is_empty());
    }
}
