//! Elastic Scaling Tests
//!
//! Overloaded replicas trigger rate-limited scale-up; the overload still
//! reaches the caller, who retries on their own schedule. Idle replicas
//! shed themselves one window at a time, never below two.

mod support;

use std::sync::Arc;

use aerofleet::object::KeyValueObject;
use aerofleet::policy::{
    AdmissionConfig, CallError, ElasticScaling, PlacementError, PolicyStack, ScalingConfig,
};
use aerofleet::runtime::DeploySpec;
use futures_util::future::join_all;

use support::{registry_with, seeded_manager, wait_until, ParkPolicy};

fn elastic(limit: usize, replicas: usize, window_ms: u64) -> ElasticScaling {
    ElasticScaling::with_config(
        AdmissionConfig {
            max_concurrent_requests: limit,
            replica_count: replicas,
        },
        ScalingConfig {
            replication_window_ms: window_ms,
            replicas_per_window: 1,
        },
    )
}

// =============================================================================
// Scale-Up
// =============================================================================

/// The first overload adds a replica and still surfaces the overload; the
/// rate windows then reject further growth until they replenish.
#[tokio::test]
async fn test_overload_scales_up_within_rate_windows() {
    let manager = seeded_manager(registry_with(
        &["10.8.0.1:7400", "10.8.0.2:7400", "10.8.0.3:7400"],
        "us",
    ));
    let park = ParkPolicy::new();
    // Windows far beyond the test's lifetime: no replenish, no shed.
    let stack = PolicyStack::new()
        .with(elastic(1, 2, 60_000))
        .with(park.clone());

    let handle = Arc::new(
        manager
            .deploy(DeploySpec::new("us", stack), Box::new(KeyValueObject::new()))
            .await
            .unwrap(),
    );
    let id = handle.object_id();
    assert_eq!(manager.replica_count(id).unwrap(), 2);

    // Saturate both replicas.
    let mut in_flight = Vec::new();
    for _ in 0..2 {
        let handle = Arc::clone(&handle);
        in_flight.push(tokio::spawn(
            async move { handle.invoke("len", vec![]).await },
        ));
    }
    assert!(wait_until(2_000, || park.parked() == 2).await);
    park.open_gate();

    // Overload reaches the caller, but a third replica now exists.
    let first = handle.invoke("len", vec![]).await;
    assert!(matches!(first, Err(CallError::Overload { limit: 1 })));
    assert_eq!(manager.replica_count(id).unwrap(), 3);

    // The other replica's window still has a permit, but the group window
    // is spent.
    let second = handle.invoke("len", vec![]).await;
    assert!(matches!(second, Err(CallError::ScaleUpRateExceeded)));

    // Back on the first replica, whose own window is spent.
    let third = handle.invoke("len", vec![]).await;
    assert!(matches!(third, Err(CallError::ScaleUpRateExceeded)));
    assert_eq!(manager.replica_count(id).unwrap(), 3);

    park.release_parked();
    for joined in join_all(in_flight).await {
        assert!(joined.unwrap().is_ok());
    }
}

/// Scale-up with every region host occupied surfaces the placement
/// failure in place of the overload.
#[tokio::test]
async fn test_scale_up_exhausts_region_hosts() {
    let manager = seeded_manager(registry_with(&["10.8.1.1:7400", "10.8.1.2:7400"], "us"));
    let park = ParkPolicy::new();
    let stack = PolicyStack::new()
        .with(elastic(1, 2, 60_000))
        .with(park.clone());

    let handle = Arc::new(
        manager
            .deploy(DeploySpec::new("us", stack), Box::new(KeyValueObject::new()))
            .await
            .unwrap(),
    );

    let mut in_flight = Vec::new();
    for _ in 0..2 {
        let handle = Arc::clone(&handle);
        in_flight.push(tokio::spawn(
            async move { handle.invoke("len", vec![]).await },
        ));
    }
    assert!(wait_until(2_000, || park.parked() == 2).await);
    park.open_gate();

    let result = handle.invoke("len", vec![]).await;
    assert!(matches!(
        result,
        Err(CallError::Placement(PlacementError::NoEligibleHost { .. }))
    ));
    assert_eq!(manager.replica_count(handle.object_id()).unwrap(), 2);

    park.release_parked();
    for joined in join_all(in_flight).await {
        assert!(joined.unwrap().is_ok());
    }
}

// =============================================================================
// Scale-Down
// =============================================================================

/// Once load drains, the group sheds its extra replica and stops at the
/// floor of two.
#[tokio::test]
async fn test_idle_group_sheds_to_floor() {
    let manager = seeded_manager(registry_with(
        &["10.8.2.1:7400", "10.8.2.2:7400", "10.8.2.3:7400"],
        "us",
    ));
    let park = ParkPolicy::new();
    let stack = PolicyStack::new()
        .with(elastic(1, 2, 400))
        .with(park.clone());

    let handle = Arc::new(
        manager
            .deploy(DeploySpec::new("us", stack), Box::new(KeyValueObject::new()))
            .await
            .unwrap(),
    );
    let id = handle.object_id();

    let mut in_flight = Vec::new();
    for _ in 0..2 {
        let handle = Arc::clone(&handle);
        in_flight.push(tokio::spawn(
            async move { handle.invoke("len", vec![]).await },
        ));
    }
    assert!(wait_until(2_000, || park.parked() == 2).await);
    park.open_gate();

    let overloaded = handle.invoke("len", vec![]).await;
    assert!(matches!(overloaded, Err(CallError::Overload { .. })));
    assert_eq!(manager.replica_count(id).unwrap(), 3);

    park.release_parked();
    for joined in join_all(in_flight).await {
        assert!(joined.unwrap().is_ok());
    }

    // Idle now: one window tick sheds the extra replica, then the floor
    // holds.
    assert!(wait_until(5_000, || manager.replica_count(id).unwrap() == 2).await);
    tokio::time::sleep(std::time::Duration::from_millis(900)).await;
    assert_eq!(manager.replica_count(id).unwrap(), 2);
}

/// Loaded replicas are never shed, however many window ticks pass.
#[tokio::test]
async fn test_loaded_replicas_are_not_shed() {
    let manager = seeded_manager(registry_with(
        &["10.8.3.1:7400", "10.8.3.2:7400", "10.8.3.3:7400"],
        "us",
    ));
    let park = ParkPolicy::new();
    let stack = PolicyStack::new()
        .with(elastic(1, 3, 300))
        .with(park.clone());

    let handle = Arc::new(
        manager
            .deploy(DeploySpec::new("us", stack), Box::new(KeyValueObject::new()))
            .await
            .unwrap(),
    );
    let id = handle.object_id();
    assert_eq!(manager.replica_count(id).unwrap(), 3);

    // One parked call per replica keeps every member at full load.
    let mut in_flight = Vec::new();
    for _ in 0..3 {
        let handle = Arc::clone(&handle);
        in_flight.push(tokio::spawn(
            async move { handle.invoke("len", vec![]).await },
        ));
    }
    assert!(wait_until(2_000, || park.parked() == 3).await);

    tokio::time::sleep(std::time::Duration::from_millis(1_000)).await;
    assert_eq!(manager.replica_count(id).unwrap(), 3);

    park.release_parked();
    for joined in join_all(in_flight).await {
        assert!(joined.unwrap().is_ok());
    }
    assert!(wait_until(5_000, || manager.replica_count(id).unwrap() == 2).await);
}
