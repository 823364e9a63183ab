//! Shared fixtures for the integration suites: a registry pre-seeded with
//! hosts, test policies that park or record calls, and polling helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Notify;
use tokio::time::sleep;

use aerofleet::object::{Call, ReplicaId};
use aerofleet::policy::{BoxFuture, CallLink, CallResult, LinkContext, Next, Policy};
use aerofleet::registry::{HostAddr, HostInfo, InMemoryRegistry, RegistryConfig, ServerRegistry};
use aerofleet::runtime::ObjectManager;

/// A registry with `hosts` addresses registered in `region`.
pub fn registry_with(hosts: &[&str], region: &str) -> Arc<dyn ServerRegistry> {
    let registry: Arc<dyn ServerRegistry> = InMemoryRegistry::new(RegistryConfig::default());
    for host in hosts {
        let addr: HostAddr = host.parse().unwrap();
        registry.register(HostInfo::new(addr, region)).unwrap();
    }
    registry
}

/// A deterministic manager over the registry.
pub fn seeded_manager(registry: Arc<dyn ServerRegistry>) -> ObjectManager {
    ObjectManager::with_rng(registry, StdRng::seed_from_u64(42))
}

/// Poll `cond` every 10ms until it holds or `deadline_ms` elapses.
pub async fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Holds calls open on the server side so tests can occupy admission
/// permits deterministically. Starts engaged; `open_gate` lets new calls
/// pass, `release_parked` additionally wakes everything already waiting.
#[derive(Clone)]
pub struct ParkPolicy {
    parked: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
    gate: Arc<Notify>,
}

impl ParkPolicy {
    pub fn new() -> Self {
        Self {
            parked: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(Notify::new()),
        }
    }

    /// Calls parked right now (each one holds its admission permit).
    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    /// Let new calls pass without waiting. Already-parked calls stay put.
    pub fn open_gate(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    /// Open the gate and wake every parked call.
    pub fn release_parked(&self) {
        self.open_gate();
        self.gate.notify_waiters();
    }
}

struct ParkLink(ParkPolicy);

impl CallLink for ParkLink {
    fn on_call<'a>(&'a self, call: &'a Call, next: Next<'a>) -> BoxFuture<'a, CallResult> {
        Box::pin(async move {
            if !self.0.released.load(Ordering::SeqCst) {
                self.0.parked.fetch_add(1, Ordering::SeqCst);
                let woken = self.0.gate.notified();
                // Re-check after registering, so a release between the two
                // loads cannot strand this call.
                if !self.0.released.load(Ordering::SeqCst) {
                    woken.await;
                }
                self.0.parked.fetch_sub(1, Ordering::SeqCst);
            }
            next.run(call).await
        })
    }
}

impl Policy for ParkPolicy {
    fn name(&self) -> &'static str {
        "test-park"
    }

    fn server_links(&self, _ctx: &LinkContext) -> Vec<Arc<dyn CallLink>> {
        vec![Arc::new(ParkLink(self.clone()))]
    }
}

/// Records which replica served each call, in arrival order.
#[derive(Clone)]
pub struct RecorderPolicy {
    seen: Arc<Mutex<Vec<ReplicaId>>>,
}

impl RecorderPolicy {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn seen(&self) -> Vec<ReplicaId> {
        self.seen.lock().unwrap().clone()
    }
}

struct RecorderLink {
    id: ReplicaId,
    seen: Arc<Mutex<Vec<ReplicaId>>>,
}

impl CallLink for RecorderLink {
    fn on_call<'a>(&'a self, call: &'a Call, next: Next<'a>) -> BoxFuture<'a, CallResult> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(self.id);
            next.run(call).await
        })
    }
}

impl Policy for RecorderPolicy {
    fn name(&self) -> &'static str {
        "test-recorder"
    }

    fn server_links(&self, ctx: &LinkContext) -> Vec<Arc<dyn CallLink>> {
        vec![Arc::new(RecorderLink {
            id: ctx.replica_id,
            seen: Arc::clone(&self.seen),
        })]
    }
}
