use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Broker account category. Port and magic-number bands are partitioned by
/// broker type, so an allocation is never served from an incompatible band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerType {
    Demo,
    Live,
    Prop,
}

impl BrokerType {
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "demo" => Some(BrokerType::Demo),
            "live" => Some(BrokerType::Live),
            "prop" => Some(BrokerType::Prop),
            _ => None,
        }
    }
}

impl fmt::Display for BrokerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerType::Demo => write!(f, "demo"),
            BrokerType::Live => write!(f, "live"),
            BrokerType::Prop => write!(f, "prop"),
        }
    }
}

/// Per-user broker credentials, injected into a freshly provisioned worker.
/// Supplied by the user registry; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerProfile {
    pub broker_type: BrokerType,
    pub server: String,
    pub login: String,
    pub password: String,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Provisioning,
    Running,
    Degraded,
    Stopped,
    Failed,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Provisioning => "provisioning",
            WorkerStatus::Running => "running",
            WorkerStatus::Degraded => "degraded",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "provisioning" => Some(WorkerStatus::Provisioning),
            "running" => Some(WorkerStatus::Running),
            "degraded" => Some(WorkerStatus::Degraded),
            "stopped" => Some(WorkerStatus::Stopped),
            "failed" => Some(WorkerStatus::Failed),
            _ => None,
        }
    }

    /// A live worker holds an allocation and may receive dispatches.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            WorkerStatus::Provisioning | WorkerStatus::Running | WorkerStatus::Degraded
        )
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An isolated trading-terminal instance owned by exactly one user.
///
/// `allocated_port` and `allocated_magic_number` are globally unique across
/// all live workers; both come from the allocation registry and go back to
/// it on stop/recycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: Uuid,
    pub owner_user_id: i64,
    pub status: WorkerStatus,
    pub broker_type: BrokerType,
    pub allocated_port: u16,
    pub allocated_magic_number: i64,
    pub created_at: DateTime<Utc>,
    pub last_health_check_at: Option<DateTime<Utc>>,
}
