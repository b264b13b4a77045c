use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::bridge::ExecutionBridge;
use crate::db::worker_repo;
use crate::models::{BrokerProfile, Worker, WorkerStatus};

use super::allocation::{AllocationError, AllocationRegistry};
use super::launcher::TerminalLauncher;

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// The worker did not report ready in time. Returned as a typed value so
    /// the caller can surface "try again shortly" instead of crashing.
    #[error("worker {0} did not become ready within {1:?}")]
    ProvisioningTimeout(Uuid, Duration),

    #[error("unknown worker {0}")]
    UnknownWorker(Uuid),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Owns the lifecycle of per-user terminal workers: provision, start,
/// health transitions, stop, recycle. All lifecycle transitions go through
/// here — nothing else touches worker state or the allocation registry.
pub struct TerminalFleetManager {
    pool: SqlitePool,
    registry: AllocationRegistry,
    bridge: Arc<dyn ExecutionBridge>,
    launcher: Arc<dyn TerminalLauncher>,
    provision_timeout: Duration,
    ready_poll_interval: Duration,
    /// One lock per user so a single user never gets two concurrent
    /// provisioning attempts. Held only for the duration of the call.
    user_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl TerminalFleetManager {
    pub fn new(
        pool: SqlitePool,
        registry: AllocationRegistry,
        bridge: Arc<dyn ExecutionBridge>,
        launcher: Arc<dyn TerminalLauncher>,
        provision_timeout: Duration,
        ready_poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            registry,
            bridge,
            launcher,
            provision_timeout,
            ready_poll_interval,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &AllocationRegistry {
        &self.registry
    }

    async fn user_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks.entry(user_id).or_default().clone()
    }

    /// Idempotent: returns the user's live worker, provisioning one first if
    /// none exists. Provisioning for one user is serialized by a per-user
    /// lock; different users provision fully in parallel.
    pub async fn ensure_worker(
        &self,
        user_id: i64,
        profile: &BrokerProfile,
    ) -> Result<Worker, FleetError> {
        // Fast path without the lock.
        if let Some(worker) = worker_repo::get_live_worker_for_user(&self.pool, user_id).await?
        {
            if worker.status == WorkerStatus::Running {
                return Ok(worker);
            }
        }

        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        // Re-check under the lock: a concurrent call may have provisioned.
        if let Some(worker) = worker_repo::get_live_worker_for_user(&self.pool, user_id).await?
        {
            match worker.status {
                WorkerStatus::Running | WorkerStatus::Degraded => return Ok(worker),
                // A stale provisioning row means a previous attempt died
                // mid-flight; write it off and provision fresh.
                WorkerStatus::Provisioning => {
                    tracing::warn!(
                        worker_id = %worker.worker_id,
                        user_id,
                        "Stale provisioning row found — marking failed"
                    );
                    worker_repo::update_status(&self.pool, worker.worker_id, WorkerStatus::Failed)
                        .await?;
                    self.registry.release(worker.worker_id).await;
                }
                WorkerStatus::Stopped | WorkerStatus::Failed => {}
            }
        }

        self.provision(user_id, profile).await
    }

    async fn provision(&self, user_id: i64, profile: &BrokerProfile) -> Result<Worker, FleetError> {
        let worker_id = Uuid::new_v4();
        let grant = self.registry.allocate(worker_id, profile.broker_type).await?;

        let mut worker = Worker {
            worker_id,
            owner_user_id: user_id,
            status: WorkerStatus::Provisioning,
            broker_type: profile.broker_type,
            allocated_port: grant.port,
            allocated_magic_number: grant.magic_start,
            created_at: Utc::now(),
            last_health_check_at: None,
        };

        if let Err(e) = worker_repo::insert_worker(&self.pool, &worker).await {
            self.registry.release(worker_id).await;
            return Err(FleetError::Internal(e));
        }

        tracing::info!(
            worker_id = %worker_id,
            user_id,
            port = grant.port,
            magic_start = grant.magic_start,
            "Provisioning worker"
        );

        if let Err(e) = self.launcher.launch(&worker, profile).await {
            tracing::error!(worker_id = %worker_id, error = %e, "Worker launch failed");
            self.fail_and_release(worker_id).await;
            return Err(FleetError::Internal(e));
        }

        // Bounded ready-wait: the worker reports ready via the bridge probe.
        let deadline = Instant::now() + self.provision_timeout;
        loop {
            if self.bridge.probe(worker_id).await.is_ok() {
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    worker_id = %worker_id,
                    user_id,
                    timeout_secs = self.provision_timeout.as_secs(),
                    "Worker did not become ready — tearing down"
                );
                if let Err(e) = self.launcher.terminate(worker_id).await {
                    tracing::warn!(worker_id = %worker_id, error = %e, "Teardown after timeout failed");
                }
                self.fail_and_release(worker_id).await;
                return Err(FleetError::ProvisioningTimeout(worker_id, self.provision_timeout));
            }
            sleep(self.ready_poll_interval).await;
        }

        let now = Utc::now();
        worker_repo::update_status(&self.pool, worker_id, WorkerStatus::Running).await?;
        worker_repo::touch_health_check(&self.pool, worker_id, now).await?;
        worker.status = WorkerStatus::Running;
        worker.last_health_check_at = Some(now);

        counter!("workers_provisioned").increment(1);
        tracing::info!(worker_id = %worker_id, user_id, "Worker running");
        Ok(worker)
    }

    async fn fail_and_release(&self, worker_id: Uuid) {
        if let Err(e) = worker_repo::update_status(&self.pool, worker_id, WorkerStatus::Failed).await
        {
            tracing::error!(worker_id = %worker_id, error = %e, "Failed to mark worker failed");
        }
        self.registry.release(worker_id).await;
    }

    /// Graceful teardown: terminate, mark stopped, release the allocation.
    pub async fn stop_worker(&self, worker_id: Uuid) -> Result<(), FleetError> {
        self.teardown(worker_id, WorkerStatus::Stopped).await
    }

    /// Recovery teardown for an unhealthy worker. The allocation is released
    /// only after the worker row has left the live set, so a replacement for
    /// the same user can never overlap with the old port or magic block.
    pub async fn recycle_worker(&self, worker_id: Uuid) -> Result<(), FleetError> {
        self.teardown(worker_id, WorkerStatus::Failed).await?;
        counter!("workers_recycled").increment(1);
        Ok(())
    }

    async fn teardown(&self, worker_id: Uuid, final_status: WorkerStatus) -> Result<(), FleetError> {
        let worker = worker_repo::get_worker(&self.pool, worker_id)
            .await?
            .ok_or(FleetError::UnknownWorker(worker_id))?;

        // Serialize against provisioning for the same owner.
        let lock = self.user_lock(worker.owner_user_id).await;
        let _guard = lock.lock().await;

        if let Err(e) = self.launcher.terminate(worker_id).await {
            tracing::warn!(worker_id = %worker_id, error = %e, "Terminate failed during teardown");
        }
        worker_repo::update_status(&self.pool, worker_id, final_status).await?;
        self.registry.release(worker_id).await;

        tracing::info!(
            worker_id = %worker_id,
            user_id = worker.owner_user_id,
            status = %final_status,
            "Worker torn down and allocation released"
        );
        Ok(())
    }

    pub async fn mark_degraded(&self, worker_id: Uuid) -> Result<(), FleetError> {
        worker_repo::update_status(&self.pool, worker_id, WorkerStatus::Degraded).await?;
        Ok(())
    }

    pub async fn record_health_ok(&self, worker_id: Uuid) -> Result<(), FleetError> {
        worker_repo::touch_health_check(&self.pool, worker_id, Utc::now()).await?;
        Ok(())
    }

    /// Rebuild the allocation registry from persisted live workers after a
    /// restart. Workers whose allocation can no longer be claimed are marked
    /// failed rather than left holding phantom resources.
    pub async fn restore_from_db(&self) -> anyhow::Result<usize> {
        let live = worker_repo::list_live(&self.pool).await?;
        let mut restored = 0usize;
        for worker in &live {
            match self
                .registry
                .restore(worker.worker_id, worker.broker_type, worker.allocated_port)
                .await
            {
                Ok(_) => restored += 1,
                Err(e) => {
                    tracing::error!(
                        worker_id = %worker.worker_id,
                        port = worker.allocated_port,
                        error = %e,
                        "Could not restore allocation — marking worker failed"
                    );
                    worker_repo::update_status(&self.pool, worker.worker_id, WorkerStatus::Failed)
                        .await?;
                }
            }
        }
        tracing::info!(total = live.len(), restored, "Fleet restored from database");
        Ok(restored)
    }
}
