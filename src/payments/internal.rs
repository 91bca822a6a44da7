//! Synchronous internal-ledger rail: stock is reserved with an atomic
//! conditional decrement, the buyer is debited with a balance-checked ledger
//! operation, and the order settles in the same request.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::order::{Order, OrderItem, PaymentStatus},
    models::points::PointReason,
    payments::{CheckoutOutcome, PaymentStrategy},
    store::{InventoryStore, OrderStore, PointLedgerStore},
};

pub struct InternalLedgerStrategy {
    orders: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryStore>,
    points: Arc<dyn PointLedgerStore>,
    events: EventSender,
}

impl InternalLedgerStrategy {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        inventory: Arc<dyn InventoryStore>,
        points: Arc<dyn PointLedgerStore>,
        events: EventSender,
    ) -> Self {
        Self {
            orders,
            inventory,
            points,
            events,
        }
    }

    /// Reserves stock line by line. On a shortfall, lines already reserved
    /// are put back and the shortfall error is returned.
    async fn reserve_stock<'a>(&self, items: &'a [OrderItem]) -> Result<(), ServiceError> {
        for (index, item) in items.iter().enumerate() {
            if let Err(err) = self
                .inventory
                .try_decrement(item.product_id, item.variant_id, item.quantity)
                .await
            {
                self.release_stock(&items[..index]).await;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn release_stock(&self, items: &[OrderItem]) {
        for item in items {
            if let Err(err) = self
                .inventory
                .restore(item.product_id, item.variant_id, item.quantity)
                .await
            {
                error!(
                    product_id = %item.product_id,
                    error = %err,
                    "failed to release reserved stock; inventory needs manual correction"
                );
            }
        }
    }
}

#[async_trait]
impl PaymentStrategy for InternalLedgerStrategy {
    #[instrument(skip(self, order), fields(order_id = %order.id, buyer_id = %order.buyer_id))]
    async fn execute(&self, order: Order) -> Result<CheckoutOutcome, ServiceError> {
        // Stock first: the buyer must never be debited for stock that cannot
        // be delivered. A lost race is undone locally and the pending order
        // must not outlive the failed purchase.
        if let Err(err) = self.reserve_stock(&order.items).await {
            warn!(order_id = %order.id, error = %err, "stock reservation failed, rolling back");
            self.orders.delete(order.id).await?;
            return Err(err);
        }

        let debit = self
            .points
            .debit(
                order.buyer_id,
                order.total,
                PointReason::Purchase,
                Some(order.id),
            )
            .await;

        if let Err(err) = debit {
            warn!(order_id = %order.id, error = %err, "point debit failed, rolling back");
            self.release_stock(&order.items).await;
            self.orders.delete(order.id).await?;
            return Err(err);
        }

        // The buyer's debit is contractually earned from here on; a failed
        // seller credit is flagged for manual payout, never auto-reversed.
        if let crate::models::order::OrderKind::Marketplace {
            seller_id,
            ref commission,
        } = order.kind
        {
            let payout = commission.seller_payout;
            if let Err(err) = self
                .points
                .credit(seller_id, payout, PointReason::Sale, Some(order.id))
                .await
            {
                error!(
                    order_id = %order.id,
                    seller_id = %seller_id,
                    amount = payout,
                    error = %err,
                    "seller credit failed after buyer debit"
                );
                self.events
                    .send(Event::SellerCreditFailed {
                        order_id: order.id,
                        seller_id,
                        amount: payout,
                    })
                    .await;
            }
        }

        let mut settled = order.clone();
        settled.mark_paid(Utc::now());
        settled.mark_digital_delivered();

        let won = self
            .orders
            .update_if_payment_status(PaymentStatus::Pending, &settled)
            .await?;
        if !won {
            // Nothing else mutates a points-rail order; reaching this means a
            // store-level anomaly worth surfacing loudly.
            error!(order_id = %order.id, "internal-ledger settlement lost a status race");
            return Err(ServiceError::Conflict(format!(
                "order {} was concurrently modified",
                order.id
            )));
        }

        info!(
            order_id = %settled.id,
            total = settled.total,
            "internal-ledger purchase settled"
        );
        self.events
            .send(Event::OrderPaid {
                order_id: settled.id,
                buyer_id: settled.buyer_id,
                rail: settled.rail.rail(),
                total: settled.total,
                currency: settled.currency,
            })
            .await;

        Ok(CheckoutOutcome::PurchaseComplete { order: settled })
    }
}
