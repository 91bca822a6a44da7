use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::{Currency, Money};

/// Sentinel available-quantity meaning "unlimited"; exempt from decrement
/// checks and never mutated by settlement.
pub const UNLIMITED_STOCK: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Active,
    Rejected,
    Removed,
}

/// Purchasable quantity for a product or variant. Mutations are always
/// relative (`available ± n`, `sold ± n`), never absolute writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub available: i64,
    pub sold: i64,
}

impl InventoryLevel {
    pub fn new(available: i64) -> Self {
        Self { available, sold: 0 }
    }

    pub fn unlimited() -> Self {
        Self::new(UNLIMITED_STOCK)
    }

    pub fn is_unlimited(&self) -> bool {
        self.available == UNLIMITED_STOCK
    }

    pub fn has(&self, quantity: i64) -> bool {
        self.is_unlimited() || self.available >= quantity
    }

    pub fn is_sold_out(&self) -> bool {
        !self.is_unlimited() && self.available <= 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: Uuid,
    pub name: String,
    pub inventory: InventoryLevel,
}

/// A shop product or a marketplace listing. Marketplace listings carry a
/// seller; shop products do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub seller_id: Option<Uuid>,
    pub status: ModerationStatus,
    /// Price in cents when the listing accepts USD
    pub price_usd: Option<Money>,
    /// Price in points when the listing accepts DieHard Dollars
    pub price_points: Option<Money>,
    pub is_digital: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub inventory: InventoryLevel,
    pub variants: Vec<ProductVariant>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn is_marketplace(&self) -> bool {
        self.seller_id.is_some()
    }

    pub fn price_for(&self, currency: Currency) -> Option<Money> {
        match currency {
            Currency::Usd => self.price_usd,
            Currency::DiehardDollars => self.price_points,
        }
    }

    /// Active, unexpired, and not sold out at the product level.
    pub fn is_purchasable(&self, now: DateTime<Utc>) -> bool {
        self.status == ModerationStatus::Active
            && self.expires_at.map_or(true, |exp| exp > now)
            && !self.inventory.is_sold_out()
    }

    pub fn variant(&self, id: Uuid) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// Inventory level for a variant, or the product-level record when no
    /// variant is addressed.
    pub fn level(&self, variant_id: Option<Uuid>) -> Option<&InventoryLevel> {
        match variant_id {
            Some(id) => self.variant(id).map(|v| &v.inventory),
            None => Some(&self.inventory),
        }
    }
}

/// A buyer-owned shipping address, resolved at checkout for physical items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country_code: String,
}
