use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::Money;

/// Why a ledger entry exists.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PointReason {
    Purchase,
    Sale,
    Refund,
    CoinPack,
    Adjustment,
}

/// Immutable point-ledger record. A user's balance is the running sum of
/// their entries; the store keeps a counter consistent with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointLedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Signed amount: positive for credits, negative for debits
    pub delta: Money,
    pub reason: PointReason,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
