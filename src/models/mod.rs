pub mod dispatch;
pub mod outcome;
pub mod overlay;
pub mod signal;
pub mod worker;

pub use dispatch::{dispatch_id, stealth_seed, DispatchOutcome, DispatchRequest};
pub use outcome::{ExecutionResult, ExecutionStatus};
pub use overlay::UserOverlay;
pub use signal::Signal;
pub use worker::{BrokerProfile, BrokerType, Worker, WorkerStatus};

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" | "LONG" | "0" => Some(Direction::Buy),
            "SELL" | "SHORT" | "1" => Some(Direction::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Subscription tier. Stealth jitter bounds are scaled per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Scout,
    Sniper,
    Commander,
    Ghost,
}

impl Tier {
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SCOUT" => Some(Tier::Scout),
            "SNIPER" => Some(Tier::Sniper),
            "COMMANDER" => Some(Tier::Commander),
            "GHOST" => Some(Tier::Ghost),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Scout => write!(f, "SCOUT"),
            Tier::Sniper => write!(f, "SNIPER"),
            Tier::Commander => write!(f, "COMMANDER"),
            Tier::Ghost => write!(f, "GHOST"),
        }
    }
}
