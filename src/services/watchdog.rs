use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use sqlx::SqlitePool;
use tokio::time::{interval, Duration};
use uuid::Uuid;

use crate::bridge::ExecutionBridge;
use crate::db::worker_repo;
use crate::fleet::TerminalFleetManager;
use crate::models::WorkerStatus;

/// Run the fleet watchdog loop: probe every running worker each interval
/// and recycle the ones that fail `fail_threshold` consecutive probes.
pub async fn run_fleet_watchdog(
    pool: SqlitePool,
    fleet: Arc<TerminalFleetManager>,
    bridge: Arc<dyn ExecutionBridge>,
    interval_secs: u64,
    fail_threshold: u32,
) {
    let mut ticker = interval(Duration::from_secs(interval_secs));
    let mut failures: HashMap<Uuid, u32> = HashMap::new();

    tracing::info!(interval_secs, fail_threshold, "Fleet watchdog started");

    loop {
        ticker.tick().await;
        if let Err(e) = sweep(&pool, &fleet, bridge.as_ref(), fail_threshold, &mut failures).await
        {
            tracing::error!(error = %e, "Watchdog sweep failed");
        }
    }
}

/// One watchdog pass. Factored out of the loop so recovery behavior is
/// testable without waiting on wall-clock intervals.
pub async fn sweep(
    pool: &SqlitePool,
    fleet: &TerminalFleetManager,
    bridge: &dyn ExecutionBridge,
    fail_threshold: u32,
    failures: &mut HashMap<Uuid, u32>,
) -> anyhow::Result<()> {
    // A worker only stays Degraded when an earlier recycle failed after the
    // degrade write; retry the teardown so it is never stranded.
    for worker in worker_repo::list_by_status(pool, WorkerStatus::Degraded).await? {
        tracing::warn!(
            worker_id = %worker.worker_id,
            user_id = worker.owner_user_id,
            "Retrying recycle of degraded worker"
        );
        if let Err(e) = fleet.recycle_worker(worker.worker_id).await {
            tracing::error!(
                worker_id = %worker.worker_id,
                error = %e,
                "Worker recycle failed"
            );
        }
    }

    let workers = worker_repo::list_by_status(pool, WorkerStatus::Running).await?;
    gauge!("live_workers").set(workers.len() as f64);

    if workers.is_empty() {
        tracing::debug!("Watchdog: no running workers");
        return Ok(());
    }

    for worker in &workers {
        match bridge.probe(worker.worker_id).await {
            Ok(()) => {
                failures.remove(&worker.worker_id);
                if let Err(e) = fleet.record_health_ok(worker.worker_id).await {
                    tracing::warn!(
                        worker_id = %worker.worker_id,
                        error = %e,
                        "Failed to record health check"
                    );
                }
            }
            Err(e) => {
                let count = failures.entry(worker.worker_id).or_insert(0);
                *count += 1;
                tracing::warn!(
                    worker_id = %worker.worker_id,
                    user_id = worker.owner_user_id,
                    consecutive_failures = *count,
                    error = %e,
                    "Worker health probe failed"
                );

                if *count >= fail_threshold {
                    failures.remove(&worker.worker_id);
                    tracing::warn!(
                        worker_id = %worker.worker_id,
                        user_id = worker.owner_user_id,
                        "Failure threshold reached — degrading and recycling worker"
                    );
                    if let Err(e) = fleet.mark_degraded(worker.worker_id).await {
                        tracing::error!(
                            worker_id = %worker.worker_id,
                            error = %e,
                            "Failed to mark worker degraded"
                        );
                        continue;
                    }
                    if let Err(e) = fleet.recycle_worker(worker.worker_id).await {
                        tracing::error!(
                            worker_id = %worker.worker_id,
                            error = %e,
                            "Worker recycle failed"
                        );
                    }
                }
            }
        }
    }

    // Drop counters for workers that are no longer running.
    let running: std::collections::HashSet<Uuid> =
        workers.iter().map(|w| w.worker_id).collect();
    failures.retain(|worker_id, _| running.contains(worker_id));

    Ok(())
}
