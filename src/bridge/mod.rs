pub mod file_drop;

pub use file_drop::FileDropBridge;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Direction;

/// Command message dropped to a worker. `dispatch_id` is mandatory — the
/// worker de-duplicates on it, so a re-sent command is harmless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeCommand {
    pub dispatch_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub lot_size: Decimal,
    pub entry_offset_pips: Decimal,
    pub entry_delay_ms: u64,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub magic_number: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BridgeResultStatus {
    Filled,
    Rejected,
}

/// Result message read back from a worker, matched by `dispatch_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeResult {
    pub dispatch_id: String,
    pub status: BridgeResultStatus,
    pub fill_price: Option<Decimal>,
    pub ticket_id: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bridge channel unreachable for worker {worker_id}: {reason}")]
    Unreachable { worker_id: Uuid, reason: String },

    #[error("malformed bridge payload: {0}")]
    Malformed(String),

    #[error("bridge i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Narrow, best-effort channel to an external worker process.
///
/// The transport (file-drop vs. socket) hides behind this trait so router
/// and monitor logic never touch the wire format. Implementations never
/// retry internally — retry policy belongs to the dispatch router.
#[async_trait]
pub trait ExecutionBridge: Send + Sync {
    /// Drop one command to the worker. Returns once the channel accepted it;
    /// acceptance is not execution.
    async fn send(&self, worker_id: Uuid, command: &BridgeCommand) -> Result<(), BridgeError>;

    /// Non-blocking result check for one dispatch. `Ok(None)` means no
    /// result yet.
    async fn poll_result(
        &self,
        worker_id: Uuid,
        dispatch_id: &str,
    ) -> Result<Option<BridgeResult>, BridgeError>;

    /// Lightweight liveness probe used by provisioning and the watchdog.
    async fn probe(&self, worker_id: Uuid) -> Result<(), BridgeError>;
}
