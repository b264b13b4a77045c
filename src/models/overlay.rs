use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::worker::BrokerProfile;
use super::Tier;

/// Per-user execution parameters, refreshed periodically from the external
/// user registry. Owned by that collaborator — read-only in this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOverlay {
    pub user_id: i64,
    pub tier: Tier,
    pub account_balance: Decimal,
    /// Risk per trade as a percentage of balance, e.g. 2.0 for 2%.
    pub risk_percent: Decimal,
    pub broker: BrokerProfile,
}
