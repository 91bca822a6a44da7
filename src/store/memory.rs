//! In-memory document store. Each DashMap entry is a "document"; mutating
//! through `get_mut`/`entry` holds the shard lock for the duration of the
//! closure, which gives the single-document atomicity the traits require.
//! Locks are never held across an await point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::{
        catalog::{Product, ShippingAddress},
        coin_pack::{CoinPurchase, CoinPurchaseStatus},
        order::{Money, Order, PaymentRail, PaymentStatus, RailState},
        points::{PointLedgerEntry, PointReason},
    },
    store::{
        AddressStore, CoinPurchaseStore, InventoryStore, OrderStore, PointLedgerStore,
        ProcessedEventStore,
    },
};

#[derive(Default)]
struct PointAccount {
    balance: Money,
    entries: Vec<PointLedgerEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    orders: DashMap<Uuid, Order>,
    card_intent_index: DashMap<String, Uuid>,
    wallet_order_index: DashMap<String, Uuid>,
    products: DashMap<Uuid, Product>,
    accounts: DashMap<Uuid, PointAccount>,
    claimed_events: DashMap<(PaymentRail, String), ()>,
    coin_purchases: DashMap<Uuid, CoinPurchase>,
    coin_intent_index: DashMap<String, Uuid>,
    addresses: DashMap<Uuid, ShippingAddress>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: Order) -> Result<(), ServiceError> {
        match self.orders.entry(order.id) {
            Entry::Vacant(slot) => {
                slot.insert(order);
                Ok(())
            }
            Entry::Occupied(_) => Err(ServiceError::Conflict(format!(
                "order {} already exists",
                order.id
            ))),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.get(&id).map(|o| o.clone()))
    }

    async fn find_by_card_intent(
        &self,
        intent_ref: &str,
    ) -> Result<Option<Order>, ServiceError> {
        let id = match self.card_intent_index.get(intent_ref) {
            Some(id) => *id,
            None => return Ok(None),
        };
        OrderStore::get(self, id).await
    }

    async fn find_by_wallet_order(
        &self,
        order_ref: &str,
    ) -> Result<Option<Order>, ServiceError> {
        let id = match self.wallet_order_index.get(order_ref) {
            Some(id) => *id,
            None => return Ok(None),
        };
        OrderStore::get(self, id).await
    }

    async fn set_card_intent(&self, id: Uuid, intent_ref: &str) -> Result<(), ServiceError> {
        // The index entry is the uniqueness constraint; claim it first.
        match self.card_intent_index.entry(intent_ref.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
            Entry::Occupied(existing) if *existing.get() == id => {}
            Entry::Occupied(_) => {
                return Err(ServiceError::Conflict(format!(
                    "card intent {} already referenced by another order",
                    intent_ref
                )))
            }
        }

        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", id)))?;
        order.rail = RailState::Card {
            intent_ref: Some(intent_ref.to_string()),
        };
        Ok(())
    }

    async fn set_wallet_order_ref(&self, id: Uuid, order_ref: &str) -> Result<(), ServiceError> {
        match self.wallet_order_index.entry(order_ref.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
            Entry::Occupied(existing) if *existing.get() == id => {}
            Entry::Occupied(_) => {
                return Err(ServiceError::Conflict(format!(
                    "wallet order {} already referenced by another order",
                    order_ref
                )))
            }
        }

        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", id)))?;
        let capture_ref = order.rail.wallet_capture_ref().map(str::to_string);
        order.rail = RailState::Wallet {
            order_ref: Some(order_ref.to_string()),
            capture_ref,
        };
        Ok(())
    }

    async fn update_if_payment_status(
        &self,
        expected: PaymentStatus,
        updated: &Order,
    ) -> Result<bool, ServiceError> {
        let mut order = self
            .orders
            .get_mut(&updated.id)
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", updated.id)))?;
        if order.payment_status != expected {
            return Ok(false);
        }
        *order = updated.clone();
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if let Some((_, order)) = self.orders.remove(&id) {
            if let Some(intent_ref) = order.rail.card_intent_ref() {
                self.card_intent_index.remove(intent_ref);
            }
            if let Some(order_ref) = order.rail.wallet_order_ref() {
                self.wallet_order_index.remove(order_ref);
            }
        }
        Ok(())
    }

    async fn list_for_buyer(
        &self,
        buyer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<Order>, u64), ServiceError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.buyer_id == buyer_id)
            .map(|entry| entry.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = orders.len() as u64;
        let start = page.saturating_sub(1).saturating_mul(per_page) as usize;
        let items = orders
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .collect();
        Ok((items, total))
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, ServiceError> {
        Ok(self.products.get(&id).map(|p| p.clone()))
    }

    async fn upsert_product(&self, product: Product) -> Result<(), ServiceError> {
        self.products.insert(product.id, product);
        Ok(())
    }

    async fn try_decrement(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i64,
    ) -> Result<(), ServiceError> {
        let mut product = self
            .products
            .get_mut(&product_id)
            .ok_or_else(|| ServiceError::NotFound(format!("product {} not found", product_id)))?;
        let name = product.name.clone();

        let level = match variant_id {
            Some(vid) => {
                &mut product
                    .variants
                    .iter_mut()
                    .find(|v| v.id == vid)
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("variant {} not found", vid))
                    })?
                    .inventory
            }
            None => &mut product.inventory,
        };

        if level.is_unlimited() {
            level.sold += quantity;
            return Ok(());
        }
        if level.available < quantity {
            return Err(ServiceError::OutOfStock(name));
        }
        level.available -= quantity;
        level.sold += quantity;
        Ok(())
    }

    async fn restore(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i64,
    ) -> Result<(), ServiceError> {
        let mut product = self
            .products
            .get_mut(&product_id)
            .ok_or_else(|| ServiceError::NotFound(format!("product {} not found", product_id)))?;

        let level = match variant_id {
            Some(vid) => {
                &mut product
                    .variants
                    .iter_mut()
                    .find(|v| v.id == vid)
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("variant {} not found", vid))
                    })?
                    .inventory
            }
            None => &mut product.inventory,
        };

        if !level.is_unlimited() {
            level.available += quantity;
        }
        level.sold -= quantity;
        Ok(())
    }
}

#[async_trait]
impl PointLedgerStore for MemoryStore {
    async fn balance(&self, user_id: Uuid) -> Result<Money, ServiceError> {
        Ok(self.accounts.get(&user_id).map_or(0, |a| a.balance))
    }

    async fn debit(
        &self,
        user_id: Uuid,
        amount: Money,
        reason: PointReason,
        order_id: Option<Uuid>,
    ) -> Result<Money, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::ValidationError(
                "debit amount must be positive".to_string(),
            ));
        }
        let mut account = self.accounts.entry(user_id).or_default();
        if account.balance < amount {
            return Err(ServiceError::InsufficientBalance {
                required: amount,
                current: account.balance,
            });
        }
        account.balance -= amount;
        account.entries.push(PointLedgerEntry {
            id: Uuid::new_v4(),
            user_id,
            delta: -amount,
            reason,
            order_id,
            created_at: Utc::now(),
        });
        Ok(account.balance)
    }

    async fn credit(
        &self,
        user_id: Uuid,
        amount: Money,
        reason: PointReason,
        order_id: Option<Uuid>,
    ) -> Result<Money, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::ValidationError(
                "credit amount must be positive".to_string(),
            ));
        }
        let mut account = self.accounts.entry(user_id).or_default();
        account.balance += amount;
        account.entries.push(PointLedgerEntry {
            id: Uuid::new_v4(),
            user_id,
            delta: amount,
            reason,
            order_id,
            created_at: Utc::now(),
        });
        Ok(account.balance)
    }

    async fn entries(&self, user_id: Uuid) -> Result<Vec<PointLedgerEntry>, ServiceError> {
        Ok(self
            .accounts
            .get(&user_id)
            .map(|a| a.entries.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProcessedEventStore for MemoryStore {
    async fn try_claim(&self, rail: PaymentRail, event_id: &str) -> Result<bool, ServiceError> {
        let previous = self
            .claimed_events
            .insert((rail, event_id.to_string()), ());
        Ok(previous.is_none())
    }
}

#[async_trait]
impl CoinPurchaseStore for MemoryStore {
    async fn insert(&self, purchase: CoinPurchase) -> Result<(), ServiceError> {
        match self.coin_purchases.entry(purchase.id) {
            Entry::Vacant(slot) => {
                slot.insert(purchase);
                Ok(())
            }
            Entry::Occupied(_) => Err(ServiceError::Conflict(format!(
                "coin purchase {} already exists",
                purchase.id
            ))),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<CoinPurchase>, ServiceError> {
        Ok(self.coin_purchases.get(&id).map(|p| p.clone()))
    }

    async fn find_by_intent(
        &self,
        intent_ref: &str,
    ) -> Result<Option<CoinPurchase>, ServiceError> {
        let id = match self.coin_intent_index.get(intent_ref) {
            Some(id) => *id,
            None => return Ok(None),
        };
        CoinPurchaseStore::get(self, id).await
    }

    async fn set_intent_ref(&self, id: Uuid, intent_ref: &str) -> Result<(), ServiceError> {
        match self.coin_intent_index.entry(intent_ref.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
            Entry::Occupied(existing) if *existing.get() == id => {}
            Entry::Occupied(_) => {
                return Err(ServiceError::Conflict(format!(
                    "intent {} already referenced by another coin purchase",
                    intent_ref
                )))
            }
        }

        let mut purchase = self
            .coin_purchases
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("coin purchase {} not found", id)))?;
        purchase.intent_ref = Some(intent_ref.to_string());
        Ok(())
    }

    async fn try_mark_credited(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<CoinPurchase>, ServiceError> {
        let mut purchase = self
            .coin_purchases
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("coin purchase {} not found", id)))?;
        if purchase.status != CoinPurchaseStatus::Pending {
            return Ok(None);
        }
        purchase.status = CoinPurchaseStatus::Credited;
        purchase.credited_at = Some(at);
        Ok(Some(purchase.clone()))
    }

    async fn mark_failed(&self, id: Uuid) -> Result<(), ServiceError> {
        let mut purchase = self
            .coin_purchases
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("coin purchase {} not found", id)))?;
        if purchase.status == CoinPurchaseStatus::Pending {
            purchase.status = CoinPurchaseStatus::Failed;
        }
        Ok(())
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<ShippingAddress>, ServiceError> {
        Ok(self.addresses.get(&id).map(|a| a.clone()))
    }

    async fn upsert(&self, address: ShippingAddress) -> Result<(), ServiceError> {
        self.addresses.insert(address.id, address);
        Ok(())
    }
}
