use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::order::{Currency, Money, PaymentRail};

/// Domain events emitted by the settlement engine. Consumers are
/// notification-style: delivery is best effort and never feeds back into the
/// triggering request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        buyer_id: Uuid,
        rail: PaymentRail,
    },
    OrderPaid {
        order_id: Uuid,
        buyer_id: Uuid,
        rail: PaymentRail,
        total: Money,
        currency: Currency,
    },
    OrderPaymentFailed {
        order_id: Uuid,
    },
    OrderRefunded {
        order_id: Uuid,
        full: bool,
    },
    /// A cash-rail marketplace sale settled; the seller is owed a payout
    /// outside the point ledger.
    SellerPayoutDue {
        order_id: Uuid,
        seller_id: Uuid,
        amount: Money,
        currency: Currency,
    },
    /// The seller credit failed after the buyer debit succeeded. Requires
    /// manual reconciliation; the debit is never auto-reversed.
    SellerCreditFailed {
        order_id: Uuid,
        seller_id: Uuid,
        amount: Money,
    },
    /// Settlement could not decrement stock for an already-captured payment.
    OversellDetected {
        order_id: Uuid,
        product_id: Uuid,
    },
    PointsCredited {
        user_id: Uuid,
        amount: Money,
    },
}

/// Fire-and-forget sender. A full or closed channel is logged and swallowed;
/// event delivery must never fail the triggering request.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "event channel closed, notification dropped");
        }
    }
}

/// Drains the event channel and dispatches notifications. Runs as a spawned
/// task for the life of the process.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        dispatch_notification(&event);
    }
    info!("event channel closed, notification worker stopping");
}

fn dispatch_notification(event: &Event) {
    match event {
        Event::SellerCreditFailed {
            order_id,
            seller_id,
            amount,
        } => {
            // Money owed to a seller with no ledger entry backing it.
            error!(
                order_id = %order_id,
                seller_id = %seller_id,
                amount = amount,
                "seller credit failed after buyer debit; manual payout reconciliation required"
            );
        }
        Event::OversellDetected {
            order_id,
            product_id,
        } => {
            error!(
                order_id = %order_id,
                product_id = %product_id,
                "captured payment for stock that is no longer available; manual follow-up required"
            );
        }
        other => {
            info!(event = ?other, "dispatching notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_on_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender
            .send(Event::OrderPaymentFailed {
                order_id: Uuid::new_v4(),
            })
            .await;
    }
}
