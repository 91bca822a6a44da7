//! Order lookups and the operator/client commands that ride on top of the
//! settlement engine: explicit wallet capture, card intent cancellation, and
//! refund initiation.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::order::{FulfillmentStatus, Order, PaymentEventKind, PaymentRail, PaymentStatus},
    payments::{card::CardProcessor, wallet::WalletProcessor},
    services::settlement::{CaptureUpdate, SettleOutcome, SettlementService},
    store::Stores,
};

pub struct OrderCommandService {
    stores: Stores,
    settlement: Arc<SettlementService>,
    card: Arc<dyn CardProcessor>,
    wallet: Arc<dyn WalletProcessor>,
}

impl OrderCommandService {
    pub fn new(
        stores: Stores,
        settlement: Arc<SettlementService>,
        card: Arc<dyn CardProcessor>,
        wallet: Arc<dyn WalletProcessor>,
    ) -> Self {
        Self {
            stores,
            settlement,
            card,
            wallet,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Order, ServiceError> {
        self.stores
            .orders
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", id)))
    }

    pub async fn list_for_buyer(
        &self,
        buyer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<Order>, u64), ServiceError> {
        self.stores
            .orders
            .list_for_buyer(buyer_id, page, per_page)
            .await
    }

    /// Explicit capture after the buyer approved on the wallet processor's
    /// site. The webhook performs the same settlement independently; whichever
    /// lands second is acknowledged by the compare-and-set and does nothing.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn capture_wallet(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self.get(order_id).await?;

        if order.payment_status == PaymentStatus::Paid {
            return Ok(order);
        }
        let order_ref = order
            .rail
            .wallet_order_ref()
            .ok_or_else(|| {
                ServiceError::InvalidOperation(
                    "order has no wallet approval to capture".to_string(),
                )
            })?
            .to_string();

        let capture = self.wallet.capture_order(&order_ref).await?;
        if capture.status != "COMPLETED" {
            warn!(order_id = %order_id, status = %capture.status, "wallet capture not completed");
            return Err(ServiceError::ProcessorError(format!(
                "wallet capture returned status {}",
                capture.status
            )));
        }

        let outcome = self
            .settlement
            .apply(
                order,
                PaymentEventKind::CaptureCompleted,
                Some(CaptureUpdate::WalletCapture {
                    capture_ref: capture.capture_id,
                }),
            )
            .await?;

        match outcome {
            SettleOutcome::Applied(order) => Ok(order),
            // The webhook won the race; return the settled order.
            SettleOutcome::AlreadySettled | SettleOutcome::Rejected => self.get(order_id).await,
        }
    }

    /// Cancels a card intent before capture; the order maps to `failed`.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_card_payment(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self.get(order_id).await?;

        if order.rail.rail() != PaymentRail::Card {
            return Err(ServiceError::InvalidOperation(
                "only card orders can cancel a payment intent".to_string(),
            ));
        }
        if order.payment_status != PaymentStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "order is {} and can no longer be cancelled",
                order.payment_status
            )));
        }

        // A pending order may have no intent yet (creation timed out); there
        // is nothing processor-side to cancel then.
        if let Some(intent_ref) = order.rail.card_intent_ref() {
            self.card.cancel_intent(intent_ref).await?;
        }

        let outcome = self
            .settlement
            .apply(order, PaymentEventKind::CaptureDenied, None)
            .await?;
        match outcome {
            SettleOutcome::Applied(order) => {
                info!(order_id = %order_id, "card payment cancelled");
                Ok(order)
            }
            SettleOutcome::AlreadySettled | SettleOutcome::Rejected => self.get(order_id).await,
        }
    }

    /// Marks a paid physical order as shipped. The write is conditional on
    /// the order still being paid so it cannot race a refund cancelling
    /// fulfillment.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_shipped(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self.get(order_id).await?;

        if order.payment_status != PaymentStatus::Paid {
            return Err(ServiceError::InvalidOperation(format!(
                "order is {} and cannot ship",
                order.payment_status
            )));
        }
        if order.is_digital_only() {
            return Err(ServiceError::InvalidOperation(
                "digital orders do not ship".to_string(),
            ));
        }
        if order.fulfillment_status != FulfillmentStatus::Unfulfilled {
            return Err(ServiceError::InvalidOperation(format!(
                "order is already {}",
                order.fulfillment_status
            )));
        }

        let mut updated = order;
        updated.fulfillment_status = FulfillmentStatus::Shipped;
        if updated.shipped_at.is_none() {
            updated.shipped_at = Some(chrono::Utc::now());
        }
        if self
            .stores
            .orders
            .update_if_payment_status(PaymentStatus::Paid, &updated)
            .await?
        {
            Ok(updated)
        } else {
            Err(ServiceError::Conflict(format!(
                "order {} was concurrently modified",
                order_id
            )))
        }
    }

    /// Marks a shipped order as delivered.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self.get(order_id).await?;

        if order.fulfillment_status != FulfillmentStatus::Shipped {
            return Err(ServiceError::InvalidOperation(format!(
                "order is {} and cannot be delivered",
                order.fulfillment_status
            )));
        }

        let mut updated = order;
        updated.fulfillment_status = FulfillmentStatus::Delivered;
        if updated.delivered_at.is_none() {
            updated.delivered_at = Some(chrono::Utc::now());
        }
        if self
            .stores
            .orders
            .update_if_payment_status(PaymentStatus::Paid, &updated)
            .await?
        {
            Ok(updated)
        } else {
            Err(ServiceError::Conflict(format!(
                "order {} was concurrently modified",
                order_id
            )))
        }
    }

    /// Initiates a refund at the processor. State only changes when the
    /// refund event comes back through the webhook reconciler.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn refund(
        &self,
        order_id: Uuid,
        amount: Option<i64>,
    ) -> Result<String, ServiceError> {
        let order = self.get(order_id).await?;

        if !matches!(
            order.payment_status,
            PaymentStatus::Paid | PaymentStatus::PartiallyRefunded
        ) {
            return Err(ServiceError::InvalidOperation(format!(
                "order is {} and cannot be refunded",
                order.payment_status
            )));
        }
        if let Some(amount) = amount {
            if amount <= 0 || amount > order.total {
                return Err(ServiceError::ValidationError(
                    "refund amount must be positive and at most the order total".to_string(),
                ));
            }
        }

        match order.rail.rail() {
            PaymentRail::Card => {
                let intent_ref = order.rail.card_intent_ref().ok_or_else(|| {
                    ServiceError::InvalidOperation("order has no card intent".to_string())
                })?;
                self.card.create_refund(intent_ref, amount).await
            }
            PaymentRail::Wallet => {
                let capture_ref = order.rail.wallet_capture_ref().ok_or_else(|| {
                    ServiceError::InvalidOperation("order has no wallet capture".to_string())
                })?;
                self.wallet.refund_capture(capture_ref, amount).await
            }
            PaymentRail::Points => Err(ServiceError::InvalidOperation(
                "internal-ledger orders are refunded through support tooling".to_string(),
            )),
        }
    }
}
