//! Fleet lifecycle tests: idempotent provisioning, allocation uniqueness,
//! restart recovery, and watchdog-driven recycling.

mod common;

use std::collections::HashMap;

use fleetbot::db::worker_repo;
use fleetbot::fleet::FleetError;
use fleetbot::models::WorkerStatus;
use fleetbot::services::watchdog::sweep;
use uuid::Uuid;

use common::*;

#[tokio::test]
async fn test_ensure_worker_is_idempotent() {
    let pool = setup_test_db().await;
    let bridge = std::sync::Arc::new(ScriptedBridge::new());
    let fleet = make_fleet(pool.clone(), bridge.clone());
    let profile = demo_profile(1);

    let first = fleet.ensure_worker(1, &profile).await.unwrap();
    let second = fleet.ensure_worker(1, &profile).await.unwrap();
    assert_eq!(first.worker_id, second.worker_id);
    assert_eq!(second.status, WorkerStatus::Running);

    // One live row, not two.
    let live = worker_repo::list_live(&pool).await.unwrap();
    assert_eq!(live.len(), 1);
}

#[tokio::test]
async fn test_concurrent_ensure_provisions_once() {
    let pool = setup_test_db().await;
    let bridge = std::sync::Arc::new(ScriptedBridge::new());
    let fleet = make_fleet(pool.clone(), bridge.clone());
    let profile = demo_profile(2);

    let (a, b) = tokio::join!(fleet.ensure_worker(2, &profile), fleet.ensure_worker(2, &profile));
    let a = a.unwrap();
    let b = b.unwrap();

    // The per-user lock serializes the two attempts onto one worker.
    assert_eq!(a.worker_id, b.worker_id);
    assert_eq!(worker_repo::list_live(&pool).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_users_get_pairwise_distinct_allocations() {
    let pool = setup_test_db().await;
    let bridge = std::sync::Arc::new(ScriptedBridge::new());
    let fleet = make_fleet(pool.clone(), bridge.clone());

    let mut ports = std::collections::HashSet::new();
    let mut magics = std::collections::HashSet::new();
    for user_id in 1..=5i64 {
        let worker = fleet
            .ensure_worker(user_id, &demo_profile(user_id))
            .await
            .unwrap();
        assert!((9001..=9200).contains(&worker.allocated_port));
        assert!(
            ports.insert(worker.allocated_port),
            "port {} reused",
            worker.allocated_port
        );
        assert!(
            magics.insert(worker.allocated_magic_number),
            "magic {} reused",
            worker.allocated_magic_number
        );
    }
}

#[tokio::test]
async fn test_provisioning_timeout_releases_allocation() {
    let pool = setup_test_db().await;
    let bridge = std::sync::Arc::new(ScriptedBridge::new());
    let fleet = make_fleet(pool.clone(), bridge.clone());
    bridge.fail_all_probes(true);

    let err = fleet
        .ensure_worker(3, &demo_profile(3))
        .await
        .expect_err("worker can never report ready");
    assert!(matches!(err, FleetError::ProvisioningTimeout(_, _)));

    // The failed attempt holds nothing: row is terminal, band is empty.
    assert!(worker_repo::list_live(&pool).await.unwrap().is_empty());
    let util = fleet.registry().utilization().await;
    assert!(util.iter().all(|band| band.in_use == 0));

    // With a healthy probe path the same user provisions cleanly.
    bridge.fail_all_probes(false);
    let worker = fleet.ensure_worker(3, &demo_profile(3)).await.unwrap();
    assert_eq!(worker.status, WorkerStatus::Running);
}

#[tokio::test]
async fn test_watchdog_recycles_after_three_failed_probes() {
    let pool = setup_test_db().await;
    let bridge = std::sync::Arc::new(ScriptedBridge::new());
    let fleet = make_fleet(pool.clone(), bridge.clone());

    let worker = fleet.ensure_worker(4, &demo_profile(4)).await.unwrap();
    bridge.set_unhealthy(worker.worker_id);

    let mut failures: HashMap<Uuid, u32> = HashMap::new();
    for pass in 1..=2 {
        sweep(&pool, &fleet, bridge.as_ref(), 3, &mut failures)
            .await
            .unwrap();
        let status = worker_repo::get_worker(&pool, worker.worker_id)
            .await
            .unwrap()
            .unwrap()
            .status;
        assert_eq!(status, WorkerStatus::Running, "pass {pass} must not recycle");
    }

    // Third consecutive failure crosses the threshold.
    sweep(&pool, &fleet, bridge.as_ref(), 3, &mut failures)
        .await
        .unwrap();
    let status = worker_repo::get_worker(&pool, worker.worker_id)
        .await
        .unwrap()
        .unwrap()
        .status;
    assert_eq!(status, WorkerStatus::Failed);
    assert!(fleet.registry().lookup(worker.worker_id).await.is_err());

    // The replacement is a fresh identity, never the old instance revived.
    let replacement = fleet.ensure_worker(4, &demo_profile(4)).await.unwrap();
    assert_ne!(replacement.worker_id, worker.worker_id);
    assert_eq!(replacement.status, WorkerStatus::Running);
}

#[tokio::test]
async fn test_sweep_retries_recycle_of_stranded_degraded_worker() {
    let pool = setup_test_db().await;
    let bridge = std::sync::Arc::new(ScriptedBridge::new());
    let fleet = make_fleet(pool.clone(), bridge.clone());

    let worker = fleet.ensure_worker(8, &demo_profile(8)).await.unwrap();

    // A recycle interrupted after the degrade write leaves this state.
    fleet.mark_degraded(worker.worker_id).await.unwrap();

    let mut failures: HashMap<Uuid, u32> = HashMap::new();
    sweep(&pool, &fleet, bridge.as_ref(), 3, &mut failures)
        .await
        .unwrap();

    // The next pass finishes the teardown instead of stranding the worker.
    let status = worker_repo::get_worker(&pool, worker.worker_id)
        .await
        .unwrap()
        .unwrap()
        .status;
    assert_eq!(status, WorkerStatus::Failed);
    assert!(fleet.registry().lookup(worker.worker_id).await.is_err());

    let replacement = fleet.ensure_worker(8, &demo_profile(8)).await.unwrap();
    assert_ne!(replacement.worker_id, worker.worker_id);
}

#[tokio::test]
async fn test_probe_recovery_resets_failure_count() {
    let pool = setup_test_db().await;
    let bridge = std::sync::Arc::new(ScriptedBridge::new());
    let fleet = make_fleet(pool.clone(), bridge.clone());

    let worker = fleet.ensure_worker(5, &demo_profile(5)).await.unwrap();
    let mut failures: HashMap<Uuid, u32> = HashMap::new();

    // Two failures, a recovery, then two more failures: the counter is
    // consecutive, so the threshold of three is never crossed.
    bridge.set_unhealthy(worker.worker_id);
    for _ in 0..2 {
        sweep(&pool, &fleet, bridge.as_ref(), 3, &mut failures).await.unwrap();
    }
    bridge.set_healthy(worker.worker_id);
    sweep(&pool, &fleet, bridge.as_ref(), 3, &mut failures).await.unwrap();
    bridge.set_unhealthy(worker.worker_id);
    for _ in 0..2 {
        sweep(&pool, &fleet, bridge.as_ref(), 3, &mut failures).await.unwrap();
    }

    let current = worker_repo::get_worker(&pool, worker.worker_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.status, WorkerStatus::Running);
    assert!(current.last_health_check_at.is_some());
}

#[tokio::test]
async fn test_restore_rebuilds_registry_from_live_workers() {
    let pool = setup_test_db().await;
    let bridge = std::sync::Arc::new(ScriptedBridge::new());
    let fleet = make_fleet(pool.clone(), bridge.clone());

    let worker = fleet.ensure_worker(6, &demo_profile(6)).await.unwrap();

    // A restarted process starts with an empty registry and rebuilds it
    // from the persisted live set.
    let restarted = make_fleet(pool.clone(), bridge.clone());
    let restored = restarted.restore_from_db().await.unwrap();
    assert_eq!(restored, 1);

    let grant = restarted.registry().lookup(worker.worker_id).await.unwrap();
    assert_eq!(grant.port, worker.allocated_port);
    assert_eq!(grant.magic_start, worker.allocated_magic_number);

    // The restored port is claimed: a fresh worker gets a different one.
    let other = restarted.ensure_worker(7, &demo_profile(7)).await.unwrap();
    assert_ne!(other.allocated_port, worker.allocated_port);
}
