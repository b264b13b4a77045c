use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use sqlx::SqlitePool;
use tokio::time::sleep;

use crate::bridge::{BridgeCommand, ExecutionBridge};
use crate::db::dispatch_repo;
use crate::fleet::TerminalFleetManager;
use crate::models::{
    dispatch_id, stealth_seed, DispatchOutcome, DispatchRequest, ExecutionStatus, Signal,
    UserOverlay, Worker,
};
use crate::stealth::{self, BasePlan, StealthConfig};

use super::monitor::{ResultMonitor, WatchedDispatch};
use super::sizer;

/// Bounded retry policy for bridge submission. Retrying lives here, never
/// inside the bridge itself.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(250),
        }
    }
}

/// Renders one signal into one user-specific execution plan and submits it
/// to that user's worker.
pub struct DispatchRouter {
    pool: SqlitePool,
    fleet: Arc<TerminalFleetManager>,
    bridge: Arc<dyn ExecutionBridge>,
    monitor: ResultMonitor,
    stealth: StealthConfig,
    retry: RetryPolicy,
}

impl DispatchRouter {
    pub fn new(
        pool: SqlitePool,
        fleet: Arc<TerminalFleetManager>,
        bridge: Arc<dyn ExecutionBridge>,
        monitor: ResultMonitor,
        stealth: StealthConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            fleet,
            bridge,
            monitor,
            stealth,
            retry,
        }
    }

    /// Dispatch one signal to one user. Idempotent per (signal, user) pair:
    /// the atomic check-and-insert on `dispatch_id` guarantees at most one
    /// non-skipped request ever exists, even under concurrent duplicate
    /// calls.
    pub async fn dispatch(
        &self,
        signal: &Signal,
        overlay: &UserOverlay,
    ) -> anyhow::Result<DispatchOutcome> {
        let id = dispatch_id(&signal.signal_id, overlay.user_id);

        // An expired signal is never dispatched.
        if signal.is_expired(Utc::now()) {
            tracing::debug!(
                signal_id = %signal.signal_id,
                user_id = overlay.user_id,
                "Signal expired before dispatch"
            );
            return Ok(DispatchOutcome::Expired {
                signal_id: signal.signal_id.clone(),
            });
        }

        // Cheap duplicate pre-check before provisioning work. The insert
        // below remains the authoritative, race-free check.
        if dispatch_repo::exists(&self.pool, &id).await? {
            counter!("dispatches_duplicate").increment(1);
            return Ok(DispatchOutcome::AlreadyDispatched { dispatch_id: id });
        }

        // Resolve or provision the user's worker.
        let worker = match self.fleet.ensure_worker(overlay.user_id, &overlay.broker).await {
            Ok(worker) => worker,
            Err(e) => {
                tracing::warn!(
                    signal_id = %signal.signal_id,
                    user_id = overlay.user_id,
                    error = %e,
                    "Worker unavailable — dispatch not submitted"
                );
                counter!("dispatches_worker_unavailable").increment(1);
                return Ok(DispatchOutcome::WorkerUnavailable {
                    reason: e.to_string(),
                });
            }
        };

        // Provisioning above can block for the full ready-wait, so re-check
        // expiry: a signal that lapsed mid-provision is never submitted.
        if signal.is_expired(Utc::now()) {
            tracing::info!(
                signal_id = %signal.signal_id,
                user_id = overlay.user_id,
                "Signal expired while worker was provisioning"
            );
            return Ok(DispatchOutcome::Expired {
                signal_id: signal.signal_id.clone(),
            });
        }

        // Base plan from account risk, then tier-scaled stealth jitter with
        // a request-scoped seed.
        let sl_pips = sizer::stop_distance_pips(signal);
        let base_lot = sizer::lot_size(
            overlay.account_balance,
            overlay.risk_percent,
            sl_pips,
            sizer::pip_value(&signal.symbol),
        );
        let adjustment = stealth::apply(
            &BasePlan { lot_size: base_lot },
            self.stealth.bounds_for(overlay.tier),
            stealth_seed(&id),
        );

        let zero_size = adjustment.lot_size.is_zero();
        let skip = adjustment.skip || zero_size;

        let request = DispatchRequest {
            dispatch_id: id.clone(),
            signal_id: signal.signal_id.clone(),
            user_id: overlay.user_id,
            worker_id: worker.worker_id,
            lot_size: adjustment.lot_size,
            entry_delay_ms: adjustment.entry_delay_ms as i64,
            price_offset_pips: adjustment.price_offset_pips,
            skip,
            signal_expires_at: signal.expires_at,
            created_at: Utc::now(),
        };

        // Atomic check-and-insert on the idempotency key.
        if !dispatch_repo::try_insert(&self.pool, &request).await? {
            counter!("dispatches_duplicate").increment(1);
            return Ok(DispatchOutcome::AlreadyDispatched { dispatch_id: id });
        }
        counter!("dispatches_created").increment(1);

        let watched = WatchedDispatch {
            dispatch_id: id.clone(),
            user_id: overlay.user_id,
            worker_id: worker.worker_id,
            signal_expires_at: signal.expires_at,
        };

        // A stealth skip is a deliberate, auditable non-execution: recorded,
        // finalized, and never sent over the bridge.
        if skip {
            let reason = if zero_size {
                "computed lot below broker step"
            } else {
                "stealth skip"
            };
            counter!("dispatches_skipped").increment(1);
            tracing::info!(
                dispatch_id = %id,
                user_id = overlay.user_id,
                reason,
                "Dispatch skipped"
            );
            self.monitor
                .finalize(
                    &watched,
                    ExecutionStatus::Skipped,
                    None,
                    None,
                    Some(reason.into()),
                )
                .await;
            return Ok(DispatchOutcome::Skipped {
                dispatch_id: id,
                reason: reason.into(),
            });
        }

        let command = build_command(signal, &request, &worker);
        if let Err(e) = self.submit_with_retry(&worker, &command).await {
            counter!("dispatches_failed").increment(1);
            tracing::error!(
                dispatch_id = %id,
                worker_id = %worker.worker_id,
                error = %e,
                "Bridge retries exhausted — dispatch failed"
            );
            self.monitor
                .finalize(
                    &watched,
                    ExecutionStatus::BridgeError,
                    None,
                    None,
                    Some(e.to_string()),
                )
                .await;
            return Ok(DispatchOutcome::Failed {
                dispatch_id: id,
                error: e.to_string(),
            });
        }

        tracing::info!(
            dispatch_id = %id,
            signal_id = %signal.signal_id,
            user_id = overlay.user_id,
            worker_id = %worker.worker_id,
            lot_size = %request.lot_size,
            entry_delay_ms = request.entry_delay_ms,
            "Dispatch submitted"
        );

        self.monitor.spawn_watch(watched);
        Ok(DispatchOutcome::InFlight { dispatch_id: id })
    }

    /// Bounded exponential backoff around `bridge.send`.
    async fn submit_with_retry(
        &self,
        worker: &Worker,
        command: &BridgeCommand,
    ) -> Result<(), crate::bridge::BridgeError> {
        let mut attempt: u32 = 0;
        loop {
            match self.bridge.send(worker.worker_id, command).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.base_backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    counter!("bridge_send_retries").increment(1);
                    tracing::warn!(
                        dispatch_id = %command.dispatch_id,
                        worker_id = %worker.worker_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Bridge send failed — retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn build_command(signal: &Signal, request: &DispatchRequest, worker: &Worker) -> BridgeCommand {
    BridgeCommand {
        dispatch_id: request.dispatch_id.clone(),
        symbol: signal.symbol.clone(),
        direction: signal.direction,
        lot_size: request.lot_size,
        entry_offset_pips: request.price_offset_pips,
        entry_delay_ms: request.entry_delay_ms as u64,
        stop_loss: signal.stop_loss,
        take_profit: signal.take_profit,
        magic_number: worker.allocated_magic_number,
    }
}
