use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::models::Signal;

const PING_INTERVAL: Duration = Duration::from_secs(25);
const BASE_RECONNECT_DELAY: Duration = Duration::from_secs(2);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Run the signal-source WebSocket listener loop.
///
/// Each decoded `Signal` goes into the channel exactly once; the fan-out
/// consumer downstream de-duplicates by signal id, so a replay after a
/// reconnect is harmless.
pub async fn run_signal_listener(ws_url: String, tx: mpsc::Sender<Signal>) {
    let mut attempt: u32 = 0;

    loop {
        tracing::info!(url = %ws_url, "Connecting to signal source...");

        match connect_async(ws_url.as_str()).await {
            Ok((ws_stream, _response)) => {
                tracing::info!("Signal source connected");
                attempt = 0;

                let (mut write, mut read) = ws_stream.split();
                let mut ping_timer = interval(PING_INTERVAL);
                ping_timer.tick().await; // consume the first immediate tick

                loop {
                    tokio::select! {
                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    handle_text_message(&text, &tx).await;
                                }
                                Some(Ok(Message::Ping(data))) => {
                                    if let Err(e) = write.send(Message::Pong(data)).await {
                                        tracing::warn!(error = %e, "Failed to send pong");
                                        break;
                                    }
                                }
                                Some(Ok(Message::Close(_))) => {
                                    tracing::warn!("Signal source sent close frame");
                                    break;
                                }
                                Some(Ok(_)) => {} // Binary, Pong, Frame — ignore
                                Some(Err(e)) => {
                                    tracing::error!(error = %e, "Signal source read error");
                                    break;
                                }
                                None => {
                                    tracing::warn!("Signal source stream ended");
                                    break;
                                }
                            }
                        }
                        _ = ping_timer.tick() => {
                            if let Err(e) = write.send(Message::Ping(vec![])).await {
                                tracing::warn!(error = %e, "Failed to send ping");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Signal source connection failed");
            }
        }

        // Exponential backoff with cap
        let delay = BASE_RECONNECT_DELAY * 2u32.saturating_pow(attempt);
        let delay = delay.min(MAX_RECONNECT_DELAY);
        attempt = attempt.saturating_add(1);
        tracing::info!(delay_secs = delay.as_secs(), attempt, "Reconnecting...");
        sleep(delay).await;
    }
}

/// Parse an incoming text frame, which may be a single signal object, an
/// array of signals, or a wrapper with a `data` field.
async fn handle_text_message(text: &str, tx: &mpsc::Sender<Signal>) {
    for signal in parse_signals(text) {
        tracing::info!(
            signal_id = %signal.signal_id,
            symbol = %signal.symbol,
            direction = %signal.direction,
            shield = %signal.shield_classification,
            "Signal received"
        );
        if let Err(e) = tx.send(signal).await {
            tracing::error!(error = %e, "Failed to forward signal to fan-out channel");
        }
    }
}

fn parse_signals(text: &str) -> Vec<Signal> {
    if let Ok(signals) = serde_json::from_str::<Vec<Signal>>(text) {
        return signals;
    }

    if let Ok(wrapper) = serde_json::from_str::<serde_json::Value>(text) {
        if let Some(data) = wrapper.get("data") {
            if let Ok(signals) = serde_json::from_value::<Vec<Signal>>(data.clone()) {
                return signals;
            }
        }
    }

    if let Ok(signal) = serde_json::from_str::<Signal>(text) {
        return vec![signal];
    }

    // Not a signal frame (subscription ack, heartbeat)
    tracing::trace!(raw = %text, "Non-signal message received");
    Vec::new()
}
