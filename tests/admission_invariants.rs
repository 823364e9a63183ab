//! Admission Control Tests
//!
//! A replica admits a bounded number of in-flight calls and rejects the
//! rest immediately; it never queues. Clients rotate across a statically
//! provisioned replica set, so capacity elsewhere does not rescue a call
//! that landed on a saturated replica.

mod support;

use std::collections::HashSet;
use std::sync::Arc;

use aerofleet::object::KeyValueObject;
use aerofleet::policy::{AdmissionConfig, AdmissionControl, CallError, PolicyStack};
use aerofleet::runtime::DeploySpec;
use futures_util::future::join_all;

use support::{registry_with, seeded_manager, wait_until, ParkPolicy, RecorderPolicy};

fn admission(limit: usize, replicas: usize) -> AdmissionControl {
    AdmissionControl::with_config(AdmissionConfig {
        max_concurrent_requests: limit,
        replica_count: replicas,
    })
}

// =============================================================================
// Bounded Concurrency
// =============================================================================

/// Permits bound in-flight calls; the excess is rejected at once and the
/// pool recovers when calls finish.
#[tokio::test]
async fn test_saturated_replicas_reject_immediately() {
    let manager = seeded_manager(registry_with(&["10.9.0.1:7400", "10.9.0.2:7400"], "us"));
    let park = ParkPolicy::new();
    let stack = PolicyStack::new().with(admission(2, 2)).with(park.clone());

    let handle = Arc::new(
        manager
            .deploy(DeploySpec::new("us", stack), Box::new(KeyValueObject::new()))
            .await
            .unwrap(),
    );

    // Fill both replicas to their limit of 2.
    let mut in_flight = Vec::new();
    for _ in 0..4 {
        let handle = Arc::clone(&handle);
        in_flight.push(tokio::spawn(
            async move { handle.invoke("len", vec![]).await },
        ));
    }
    assert!(wait_until(2_000, || park.parked() == 4).await);

    let rejected = handle.invoke("len", vec![]).await;
    assert!(matches!(rejected, Err(CallError::Overload { limit: 2 })));
    assert!(rejected.unwrap_err().is_retryable());

    park.release_parked();
    for joined in join_all(in_flight).await {
        assert!(joined.unwrap().is_ok());
    }

    // Permits are back.
    assert!(handle.invoke("len", vec![]).await.is_ok());
}

/// One saturated replica rejects its share of the rotation even while the
/// other replica has capacity to spare.
#[tokio::test]
async fn test_rejection_is_per_replica_not_global() {
    let manager = seeded_manager(registry_with(&["10.9.1.1:7400", "10.9.1.2:7400"], "us"));
    let park = ParkPolicy::new();
    let stack = PolicyStack::new().with(admission(1, 2)).with(park.clone());

    let handle = Arc::new(
        manager
            .deploy(DeploySpec::new("us", stack), Box::new(KeyValueObject::new()))
            .await
            .unwrap(),
    );

    // Saturate exactly one replica.
    let parked_call = {
        let handle = Arc::clone(&handle);
        tokio::spawn(async move { handle.invoke("len", vec![]).await })
    };
    assert!(wait_until(2_000, || park.parked() == 1).await);
    park.open_gate();

    // One rotation: one call hits the full replica, the other the idle one.
    let first = handle.invoke("len", vec![]).await;
    let second = handle.invoke("len", vec![]).await;
    let overloads = [&first, &second]
        .iter()
        .filter(|r| matches!(r, Err(CallError::Overload { .. })))
        .count();
    assert_eq!(overloads, 1);
    assert_eq!(
        [&first, &second].iter().filter(|r| r.is_ok()).count(),
        1
    );

    park.release_parked();
    assert!(parked_call.await.unwrap().is_ok());
}

// =============================================================================
// Load Balancing
// =============================================================================

/// Deployment provisions the configured replica count and sequential calls
/// rotate across all of them without skipping or doubling.
#[tokio::test]
async fn test_calls_rotate_across_provisioned_replicas() {
    let manager = seeded_manager(registry_with(
        &["10.9.2.1:7400", "10.9.2.2:7400", "10.9.2.3:7400"],
        "us",
    ));
    let recorder = RecorderPolicy::new();
    let stack = PolicyStack::new().with(admission(20, 3)).with(recorder.clone());

    let handle = manager
        .deploy(DeploySpec::new("us", stack), Box::new(KeyValueObject::new()))
        .await
        .unwrap();
    assert_eq!(manager.replica_count(handle.object_id()).unwrap(), 3);

    for _ in 0..6 {
        handle.invoke("len", vec![]).await.unwrap();
    }

    let seen = recorder.seen();
    assert_eq!(seen.len(), 6);
    let first_cycle: HashSet<_> = seen[..3].iter().collect();
    assert_eq!(first_cycle.len(), 3);
    assert_eq!(seen[..3], seen[3..]);
}
