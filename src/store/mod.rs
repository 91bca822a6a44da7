//! Persistence seam. The engine depends only on these traits and on the
//! per-document atomicity they promise: conditional decrement, balance-checked
//! debit, claim-once inserts, and payment-status compare-and-set. The bundled
//! in-memory driver backs development and tests; a document-store driver can
//! be swapped in without touching the services.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::{
        catalog::{Product, ShippingAddress},
        coin_pack::CoinPurchase,
        order::{Money, Order, PaymentRail, PaymentStatus},
        points::{PointLedgerEntry, PointReason},
    },
};

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order document; the id must be unused.
    async fn insert(&self, order: Order) -> Result<(), ServiceError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    async fn find_by_card_intent(&self, intent_ref: &str)
        -> Result<Option<Order>, ServiceError>;

    async fn find_by_wallet_order(&self, order_ref: &str)
        -> Result<Option<Order>, ServiceError>;

    /// Records the card intent reference, enforcing its uniqueness across
    /// orders. Conflicts with a different order are an error.
    async fn set_card_intent(&self, id: Uuid, intent_ref: &str) -> Result<(), ServiceError>;

    /// Records the wallet order reference, enforcing its uniqueness across
    /// orders.
    async fn set_wallet_order_ref(&self, id: Uuid, order_ref: &str) -> Result<(), ServiceError>;

    /// Conditional write: persists `updated` only if the stored document's
    /// payment status still equals `expected`. Returns whether the write won.
    /// This is the settlement idempotency primitive; concurrent captures of
    /// the same order race here and exactly one wins.
    async fn update_if_payment_status(
        &self,
        expected: PaymentStatus,
        updated: &Order,
    ) -> Result<bool, ServiceError>;

    /// Removes an order document. Reserved for the internal-ledger
    /// rollback-on-construction-failure path.
    async fn delete(&self, id: Uuid) -> Result<(), ServiceError>;

    async fn list_for_buyer(
        &self,
        buyer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<Order>, u64), ServiceError>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, ServiceError>;

    async fn upsert_product(&self, product: Product) -> Result<(), ServiceError>;

    /// Atomic conditional decrement: "available -= qty, sold += qty" only if
    /// `available >= qty`. Unlimited stock skips the available mutation but
    /// still counts the sale. Fails with `OutOfStock` on shortfall.
    async fn try_decrement(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i64,
    ) -> Result<(), ServiceError>;

    /// Reverses a decrement: "available += qty, sold -= qty" (available
    /// untouched for unlimited stock).
    async fn restore(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i64,
    ) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait PointLedgerStore: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> Result<Money, ServiceError>;

    /// Atomic balance-checked debit. The balance check happens at debit time
    /// under the account's lock, never from an earlier read. Fails with
    /// `InsufficientBalance { required, current }`.
    async fn debit(
        &self,
        user_id: Uuid,
        amount: Money,
        reason: PointReason,
        order_id: Option<Uuid>,
    ) -> Result<Money, ServiceError>;

    async fn credit(
        &self,
        user_id: Uuid,
        amount: Money,
        reason: PointReason,
        order_id: Option<Uuid>,
    ) -> Result<Money, ServiceError>;

    async fn entries(&self, user_id: Uuid) -> Result<Vec<PointLedgerEntry>, ServiceError>;
}

#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Claims a processor event exactly once. Returns true if this call won
    /// the claim, false if the `(rail, event_id)` tuple was already seen.
    async fn try_claim(&self, rail: PaymentRail, event_id: &str) -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait CoinPurchaseStore: Send + Sync {
    async fn insert(&self, purchase: CoinPurchase) -> Result<(), ServiceError>;

    async fn get(&self, id: Uuid) -> Result<Option<CoinPurchase>, ServiceError>;

    async fn find_by_intent(&self, intent_ref: &str)
        -> Result<Option<CoinPurchase>, ServiceError>;

    async fn set_intent_ref(&self, id: Uuid, intent_ref: &str) -> Result<(), ServiceError>;

    /// Compare-and-set pending -> credited. Returns the purchase when this
    /// call won, None when it was already credited or failed.
    async fn try_mark_credited(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<CoinPurchase>, ServiceError>;

    async fn mark_failed(&self, id: Uuid) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<ShippingAddress>, ServiceError>;

    async fn upsert(&self, address: ShippingAddress) -> Result<(), ServiceError>;
}

/// The shared mutable state of the engine. Everything else is a stateless
/// transformation over data it is given.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub inventory: Arc<dyn InventoryStore>,
    pub points: Arc<dyn PointLedgerStore>,
    pub processed_events: Arc<dyn ProcessedEventStore>,
    pub coin_purchases: Arc<dyn CoinPurchaseStore>,
    pub addresses: Arc<dyn AddressStore>,
}

impl Stores {
    /// All collections backed by one in-memory document store.
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new());
        Self {
            orders: store.clone(),
            inventory: store.clone(),
            points: store.clone(),
            processed_events: store.clone(),
            coin_purchases: store.clone(),
            addresses: store,
        }
    }
}
