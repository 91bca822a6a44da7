//! The three payment rails behind one strategy interface. The checkout
//! orchestrator validates and persists the pending order, then hands it to
//! exactly one strategy: the internal-ledger strategy settles synchronously,
//! the card and wallet strategies return continuation data and leave
//! settlement to the webhook reconciler.

pub mod card;
pub mod internal;
pub mod wallet;

use async_trait::async_trait;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{errors::ServiceError, models::order::Order};

/// Rail-specific data the client needs to finish an asynchronous payment.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentContinuation {
    CardIntent {
        intent_ref: String,
        client_secret: String,
    },
    WalletApproval {
        wallet_order_ref: String,
        approval_url: String,
    },
}

/// What checkout hands back to the caller.
#[derive(Debug)]
pub enum CheckoutOutcome {
    /// Internal-ledger rail: the order settled synchronously.
    PurchaseComplete { order: Order },
    /// Card or wallet rail: the order is pending and the client must
    /// continue with the processor.
    RequiresPayment {
        order: Order,
        continuation: PaymentContinuation,
    },
}

#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    /// Takes the freshly persisted pending order and either settles it or
    /// prepares the processor-side continuation.
    async fn execute(&self, order: Order) -> Result<CheckoutOutcome, ServiceError>;
}
