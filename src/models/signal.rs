use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Direction;

/// A single proposed trade issued once by the signal source.
///
/// Immutable after issue. One record per signal — the fan-out layer renders
/// per-user execution plans from it without ever duplicating the signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Confidence score computed upstream; passed through, never recomputed.
    pub confidence: Decimal,
    /// Quality/risk label from the shield scorer; opaque to this core.
    pub shield_classification: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Signal {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Signal: id={} {} {} entry={} sl={} tp={}",
            self.signal_id, self.symbol, self.direction, self.entry_price, self.stop_loss, self.take_profit,
        )
    }
}
