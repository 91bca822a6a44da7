//! Settlement: applying a payment event to an order and driving its side
//! effects exactly once. Every path that can settle an order — webhook
//! delivery, explicit wallet capture, redelivery — funnels through here, so
//! the conditional write below is the only place an order's payment status
//! changes on the asynchronous rails.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::order::{
        plan_transition, FulfillmentStatus, Order, OrderKind, PaymentEventKind, PaymentStatus,
        RailState, SettlementEffect, TransitionPlan,
    },
    store::Stores,
};

/// How the capture was recorded processor-side, when the event carries it.
#[derive(Debug, Clone)]
pub enum CaptureUpdate {
    WalletCapture { capture_ref: String },
}

#[derive(Debug)]
pub enum SettleOutcome {
    /// This call performed the transition and its side effects.
    Applied(Order),
    /// The order was already in a state consistent with the event; the event
    /// is acknowledged with no side effects.
    AlreadySettled,
    /// The event does not apply to the order's current state; acknowledged
    /// and logged, never executed.
    Rejected,
}

pub struct SettlementService {
    stores: Stores,
    events: EventSender,
}

impl SettlementService {
    pub fn new(stores: Stores, events: EventSender) -> Self {
        Self { stores, events }
    }

    #[instrument(skip(self, order, capture), fields(order_id = %order.id, status = %order.payment_status))]
    pub async fn apply(
        &self,
        order: Order,
        event: PaymentEventKind,
        capture: Option<CaptureUpdate>,
    ) -> Result<SettleOutcome, ServiceError> {
        let loaded_status = order.payment_status;
        let (next, effects) = match plan_transition(loaded_status, event) {
            TransitionPlan::Apply { next, effects } => (next, effects),
            TransitionPlan::AlreadySettled => {
                info!(order_id = %order.id, ?event, "event already settled, acknowledging");
                return Ok(SettleOutcome::AlreadySettled);
            }
            TransitionPlan::Rejected => {
                warn!(
                    order_id = %order.id,
                    status = %loaded_status,
                    ?event,
                    "event does not apply to order state, ignoring"
                );
                return Ok(SettleOutcome::Rejected);
            }
        };

        let now = Utc::now();
        let mut updated = order.clone();
        match next {
            PaymentStatus::Paid => updated.mark_paid(now),
            other => updated.payment_status = other,
        }
        for effect in effects {
            match effect {
                SettlementEffect::DeliverDigital => updated.mark_digital_delivered(),
                SettlementEffect::CancelFulfillment => {
                    updated.fulfillment_status = FulfillmentStatus::Cancelled;
                }
                _ => {}
            }
        }
        if let Some(CaptureUpdate::WalletCapture { capture_ref }) = capture {
            if let RailState::Wallet {
                capture_ref: ref mut slot,
                ..
            } = updated.rail
            {
                *slot = Some(capture_ref);
            }
        }

        // The conditional write is the settlement idempotency gate: of any
        // number of concurrent appliers, exactly one wins and runs the
        // store-level effects below.
        let won = self
            .stores
            .orders
            .update_if_payment_status(loaded_status, &updated)
            .await?;
        if !won {
            info!(order_id = %order.id, "lost settlement race, acknowledging");
            return Ok(SettleOutcome::AlreadySettled);
        }

        for effect in effects {
            match effect {
                SettlementEffect::DebitInventory => self.debit_inventory(&updated).await,
                SettlementEffect::RestoreInventory => self.restore_inventory(&updated).await,
                SettlementEffect::SignalSellerPayout => self.signal_seller_payout(&updated).await,
                SettlementEffect::DeliverDigital | SettlementEffect::CancelFulfillment => {}
            }
        }

        match next {
            PaymentStatus::Paid => {
                info!(order_id = %updated.id, "order settled as paid");
                self.events
                    .send(Event::OrderPaid {
                        order_id: updated.id,
                        buyer_id: updated.buyer_id,
                        rail: updated.rail.rail(),
                        total: updated.total,
                        currency: updated.currency,
                    })
                    .await;
            }
            PaymentStatus::Failed => {
                self.events
                    .send(Event::OrderPaymentFailed {
                        order_id: updated.id,
                    })
                    .await;
            }
            PaymentStatus::Refunded | PaymentStatus::PartiallyRefunded => {
                self.events
                    .send(Event::OrderRefunded {
                        order_id: updated.id,
                        full: next == PaymentStatus::Refunded,
                    })
                    .await;
            }
            PaymentStatus::Pending => {}
        }

        Ok(SettleOutcome::Applied(updated))
    }

    /// The payment is already captured, so a shortfall here is an oversell to
    /// flag, not a reason to fail the settlement.
    async fn debit_inventory(&self, order: &Order) {
        for item in &order.items {
            match self
                .stores
                .inventory
                .try_decrement(item.product_id, item.variant_id, item.quantity)
                .await
            {
                Ok(()) => {}
                Err(ServiceError::OutOfStock(_)) => {
                    self.events
                        .send(Event::OversellDetected {
                            order_id: order.id,
                            product_id: item.product_id,
                        })
                        .await;
                }
                Err(err) => {
                    error!(
                        order_id = %order.id,
                        product_id = %item.product_id,
                        error = %err,
                        "inventory debit failed during settlement"
                    );
                }
            }
        }
    }

    async fn restore_inventory(&self, order: &Order) {
        for item in &order.items {
            if let Err(err) = self
                .stores
                .inventory
                .restore(item.product_id, item.variant_id, item.quantity)
                .await
            {
                error!(
                    order_id = %order.id,
                    product_id = %item.product_id,
                    error = %err,
                    "inventory restore failed during refund"
                );
            }
        }
    }

    /// Cash rails never auto-credit the point ledger; marketplace payouts on
    /// those rails are signalled for offline payout processing.
    async fn signal_seller_payout(&self, order: &Order) {
        if let OrderKind::Marketplace {
            seller_id,
            ref commission,
        } = order.kind
        {
            info!(
                order_id = %order.id,
                seller_id = %seller_id,
                payout = commission.seller_payout,
                "marketplace sale settled, payout due"
            );
            self.events
                .send(Event::SellerPayoutDue {
                    order_id: order.id,
                    seller_id,
                    amount: commission.seller_payout,
                    currency: order.currency,
                })
                .await;
        }
    }
}
