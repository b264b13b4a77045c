use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::bridge::{BridgeResultStatus, ExecutionBridge};
use crate::db::outcome_repo;
use crate::models::{ExecutionResult, ExecutionStatus};

/// What the monitor needs to track one in-flight dispatch.
#[derive(Debug, Clone)]
pub struct WatchedDispatch {
    pub dispatch_id: String,
    pub user_id: i64,
    pub worker_id: Uuid,
    pub signal_expires_at: DateTime<Utc>,
}

/// Watches dispatched requests until they reach a terminal state.
///
/// Every dispatch gets its own spawned task, so a hung worker delays only
/// its own dispatch. Terminal outcomes go through the append-only log
/// exactly once and out on the broadcast stream.
#[derive(Clone)]
pub struct ResultMonitor {
    pool: SqlitePool,
    bridge: Arc<dyn ExecutionBridge>,
    outcome_tx: broadcast::Sender<ExecutionResult>,
    result_timeout: Duration,
    poll_interval: Duration,
}

impl ResultMonitor {
    pub fn new(
        pool: SqlitePool,
        bridge: Arc<dyn ExecutionBridge>,
        outcome_tx: broadcast::Sender<ExecutionResult>,
        result_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            bridge,
            outcome_tx,
            result_timeout,
            poll_interval,
        }
    }

    /// Spawn the independent watch task for one submitted dispatch.
    pub fn spawn_watch(&self, watched: WatchedDispatch) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            monitor.watch(watched).await;
        })
    }

    async fn watch(&self, watched: WatchedDispatch) {
        let deadline = Instant::now() + self.result_timeout;

        loop {
            match self
                .bridge
                .poll_result(watched.worker_id, &watched.dispatch_id)
                .await
            {
                Ok(Some(result)) => {
                    let status = match result.status {
                        BridgeResultStatus::Filled => ExecutionStatus::Filled,
                        BridgeResultStatus::Rejected => ExecutionStatus::Rejected,
                    };
                    self.finalize(
                        &watched,
                        status,
                        result.fill_price,
                        result.ticket_id,
                        result.message,
                    )
                    .await;
                    return;
                }
                Ok(None) => {}
                // Transient poll failures do not end the wait; the deadline
                // bounds it.
                Err(e) => {
                    tracing::warn!(
                        dispatch_id = %watched.dispatch_id,
                        worker_id = %watched.worker_id,
                        error = %e,
                        "Result poll failed"
                    );
                }
            }

            // Signal expiry cancels a not-yet-terminal dispatch, distinctly
            // from a timeout. A result that already arrived above wins.
            if Utc::now() >= watched.signal_expires_at {
                self.finalize(
                    &watched,
                    ExecutionStatus::Expired,
                    None,
                    None,
                    Some("signal expired before execution completed".into()),
                )
                .await;
                return;
            }

            if Instant::now() >= deadline {
                // The order may still exist at the broker; flagged for
                // reconciliation, never assumed resolved.
                self.finalize(
                    &watched,
                    ExecutionStatus::TimedOut,
                    None,
                    None,
                    Some(format!(
                        "no result within {}s; flagged for reconciliation",
                        self.result_timeout.as_secs()
                    )),
                )
                .await;
                return;
            }

            sleep(self.poll_interval).await;
        }
    }

    /// Write the terminal outcome exactly once and emit it. Losing the
    /// append race means another path already finalized this dispatch, so
    /// the late writer stays silent.
    pub async fn finalize(
        &self,
        watched: &WatchedDispatch,
        status: ExecutionStatus,
        fill_price: Option<rust_decimal::Decimal>,
        ticket_id: Option<i64>,
        detail: Option<String>,
    ) {
        let result = ExecutionResult {
            dispatch_id: watched.dispatch_id.clone(),
            user_id: watched.user_id,
            status,
            fill_price,
            ticket_id,
            detail,
            observed_at: Utc::now(),
        };

        match outcome_repo::insert_once(&self.pool, &result).await {
            Ok(true) => {
                counter!("executions_total", "status" => status.as_str()).increment(1);
                tracing::info!(
                    dispatch_id = %result.dispatch_id,
                    user_id = result.user_id,
                    status = %status,
                    fill_price = ?result.fill_price,
                    ticket_id = ?result.ticket_id,
                    "Dispatch reached terminal state"
                );
                // Subscribers may come and go; an empty receiver set is fine.
                let _ = self.outcome_tx.send(result);
            }
            Ok(false) => {
                tracing::debug!(
                    dispatch_id = %result.dispatch_id,
                    status = %status,
                    "Outcome already recorded — skipping duplicate terminal write"
                );
            }
            Err(e) => {
                tracing::error!(
                    dispatch_id = %result.dispatch_id,
                    error = %e,
                    "Failed to append execution outcome"
                );
            }
        }
    }
}
