use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Idempotency key for one (signal, user) pair.
///
/// Deterministic: the same pair always hashes to the same id, which is the
/// primary defense against duplicate execution — the dispatch table keys on
/// it, so a second attempt collides instead of submitting twice.
pub fn dispatch_id(signal_id: &str, user_id: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signal_id.as_bytes());
    hasher.update(b":");
    hasher.update(user_id.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Request-scoped stealth seed derived from the dispatch id.
///
/// Two concurrent dispatches never share a generator, and a fixed pair
/// reproduces the same jitter, which keeps stealth output testable.
pub fn stealth_seed(dispatch_id: &str) -> u64 {
    let digest = Sha256::digest(dispatch_id.as_bytes());
    u64::from_le_bytes(digest[..8].try_into().unwrap_or([0u8; 8]))
}

/// One user-specific, stealth-adjusted execution plan for one signal.
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub dispatch_id: String,
    pub signal_id: String,
    pub user_id: i64,
    pub worker_id: Uuid,
    pub lot_size: Decimal,
    pub entry_delay_ms: i64,
    pub price_offset_pips: Decimal,
    pub skip: bool,
    pub signal_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Typed result of a dispatch attempt, returned to the caller so retry /
/// surface decisions stay outside this core.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Submitted to the worker; the result monitor owns it from here.
    InFlight { dispatch_id: String },
    /// The pair was already dispatched — idempotent no-op.
    AlreadyDispatched { dispatch_id: String },
    /// Deliberate, auditable non-execution (stealth skip or zero size).
    Skipped { dispatch_id: String, reason: String },
    /// Signal validity lapsed before submission.
    Expired { signal_id: String },
    /// No live worker and provisioning failed; caller should retry shortly.
    WorkerUnavailable { reason: String },
    /// Bridge retries exhausted — terminal, written to the outcome log.
    Failed { dispatch_id: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_id_is_deterministic() {
        let a = dispatch_id("sig-001", 42);
        let b = dispatch_id("sig-001", 42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_dispatch_id_differs_per_user_and_signal() {
        let a = dispatch_id("sig-001", 42);
        let b = dispatch_id("sig-001", 43);
        let c = dispatch_id("sig-002", 42);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_stealth_seed_is_stable() {
        let id = dispatch_id("sig-001", 42);
        assert_eq!(stealth_seed(&id), stealth_seed(&id));
        assert_ne!(stealth_seed(&id), stealth_seed("other"));
    }
}
