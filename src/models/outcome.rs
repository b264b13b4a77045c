use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal state of a dispatch. Written exactly once to the append-only
/// outcome log; never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Filled,
    Rejected,
    /// No result within the wait window. The order may still exist at the
    /// broker — flagged for reconciliation, never assumed resolved.
    TimedOut,
    BridgeError,
    /// Signal expired before execution completed. Distinct from TimedOut.
    Expired,
    /// Stealth skip or zero computed size; no bridge contact happened.
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Filled => "filled",
            ExecutionStatus::Rejected => "rejected",
            ExecutionStatus::TimedOut => "timed_out",
            ExecutionStatus::BridgeError => "bridge_error",
            ExecutionStatus::Expired => "expired",
            ExecutionStatus::Skipped => "skipped",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "filled" => Some(ExecutionStatus::Filled),
            "rejected" => Some(ExecutionStatus::Rejected),
            "timed_out" => Some(ExecutionStatus::TimedOut),
            "bridge_error" => Some(ExecutionStatus::BridgeError),
            "expired" => Some(ExecutionStatus::Expired),
            "skipped" => Some(ExecutionStatus::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final outcome event for one dispatch, emitted on the outcome stream and
/// appended to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub dispatch_id: String,
    pub user_id: i64,
    pub status: ExecutionStatus,
    pub fill_price: Option<Decimal>,
    pub ticket_id: Option<i64>,
    /// Free-form context: reject reason, bridge error text, skip reason.
    pub detail: Option<String>,
    pub observed_at: DateTime<Utc>,
}
