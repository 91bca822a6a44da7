use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::order::Money;

/// A fixed bundle of DieHard Dollars sold for USD through the card rail.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CoinPack {
    pub id: String,
    pub name: String,
    pub coins: Money,
    pub price_usd: Money,
}

/// The fixed pack catalog.
pub fn coin_pack_catalog() -> Vec<CoinPack> {
    vec![
        CoinPack {
            id: "pack_500".to_string(),
            name: "Starter Stack".to_string(),
            coins: 500,
            price_usd: 499,
        },
        CoinPack {
            id: "pack_1200".to_string(),
            name: "Fan Favorite".to_string(),
            coins: 1200,
            price_usd: 999,
        },
        CoinPack {
            id: "pack_2600".to_string(),
            name: "Super Fan".to_string(),
            coins: 2600,
            price_usd: 1999,
        },
        CoinPack {
            id: "pack_5500".to_string(),
            name: "Die Hard".to_string(),
            coins: 5500,
            price_usd: 3999,
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CoinPurchaseStatus {
    Pending,
    Credited,
    Failed,
}

/// Record of a coin-pack purchase. Lives in its own collection, not the Order
/// collection; crediting is keyed on the payment intent so a redelivered
/// webhook can never credit twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinPurchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pack_id: String,
    pub coins: Money,
    pub amount_usd: Money,
    pub intent_ref: Option<String>,
    pub status: CoinPurchaseStatus,
    pub created_at: DateTime<Utc>,
    pub credited_at: Option<DateTime<Utc>>,
}
