use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use tokio::sync::mpsc;

use crate::execution::DispatchRouter;
use crate::models::Signal;
use crate::services::overlay_cache::OverlayCache;

/// Run the fan-out loop: one canonical signal in, one independent dispatch
/// task per eligible user out.
///
/// Dispatches run as separate spawned tasks so a slow or stuck worker never
/// delays dispatch to other users. The seen-map guards the "delivered
/// exactly once" contract against upstream replays; entries are garbage
/// collected after signal expiry plus a grace window.
pub async fn run_fanout(
    mut rx: mpsc::Receiver<Signal>,
    router: Arc<DispatchRouter>,
    overlays: OverlayCache,
    pause_flag: Arc<AtomicBool>,
    grace_secs: i64,
) {
    let mut seen: HashMap<String, DateTime<Utc>> = HashMap::new();

    tracing::info!("Fan-out loop started");

    while let Some(signal) = rx.recv().await {
        let now = Utc::now();
        seen.retain(|_, drop_after| *drop_after > now);

        if pause_flag.load(Ordering::Relaxed) {
            tracing::info!(signal_id = %signal.signal_id, "Dispatch paused — signal not fanned out");
            continue;
        }

        if signal.is_expired(now) {
            counter!("signals_expired_on_arrival").increment(1);
            tracing::warn!(
                signal_id = %signal.signal_id,
                expires_at = %signal.expires_at,
                "Signal already expired on arrival"
            );
            continue;
        }

        let drop_after = signal.expires_at + ChronoDuration::seconds(grace_secs);
        if seen.insert(signal.signal_id.clone(), drop_after).is_some() {
            counter!("signals_duplicate").increment(1);
            tracing::debug!(signal_id = %signal.signal_id, "Duplicate signal event ignored");
            continue;
        }
        counter!("signals_received").increment(1);

        let targets = overlays.snapshot().await;
        if targets.is_empty() {
            tracing::warn!(signal_id = %signal.signal_id, "No eligible users in overlay cache");
            continue;
        }

        tracing::info!(
            signal_id = %signal.signal_id,
            symbol = %signal.symbol,
            user_count = targets.len(),
            "Fanning out signal"
        );

        for overlay in targets {
            let router = router.clone();
            let signal = signal.clone();
            tokio::spawn(async move {
                let user_id = overlay.user_id;
                match router.dispatch(&signal, &overlay).await {
                    Ok(outcome) => {
                        tracing::debug!(
                            signal_id = %signal.signal_id,
                            user_id,
                            outcome = ?outcome,
                            "Dispatch outcome"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            signal_id = %signal.signal_id,
                            user_id,
                            error = %e,
                            "Dispatch failed with internal error"
                        );
                    }
                }
            });
        }
    }

    tracing::warn!("Signal channel closed — fan-out loop exiting");
}
