use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::commission::CommissionResult;

/// Integer minor-unit amount: cents for `usd`, whole points for
/// `diehard_dollars`. Money is never floating point.
pub type Money = i64;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Currency {
    Usd,
    DiehardDollars,
}

/// The three payment paths a purchase can take.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentRail {
    Points,
    Card,
    Wallet,
}

impl PaymentRail {
    pub fn currency(&self) -> Currency {
        match self {
            PaymentRail::Points => Currency::DiehardDollars,
            PaymentRail::Card | PaymentRail::Wallet => Currency::Usd,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    PartiallyRefunded,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FulfillmentStatus {
    Unfulfilled,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DigitalDeliveryStatus {
    Pending,
    Delivered,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShippingMethod {
    Standard,
    Express,
    Overnight,
}

impl ShippingMethod {
    /// Flat shipping cost in cents.
    pub fn cost(&self) -> Money {
        match self {
            ShippingMethod::Standard => 1000,
            ShippingMethod::Express => 2500,
            ShippingMethod::Overnight => 5000,
        }
    }
}

/// One purchased line.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    /// Quantity purchased, always >= 1
    pub quantity: i64,
    pub unit_price: Money,
    pub currency: Currency,
    pub is_digital: bool,
}

/// Shop sales have no counterparty; marketplace sales carry the seller and
/// the commission breakdown. Commission fields existing exactly when a seller
/// does is enforced here by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderKind {
    Shop,
    Marketplace {
        seller_id: Uuid,
        commission: CommissionResult,
    },
}

impl OrderKind {
    pub fn seller_id(&self) -> Option<Uuid> {
        match self {
            OrderKind::Shop => None,
            OrderKind::Marketplace { seller_id, .. } => Some(*seller_id),
        }
    }

    pub fn commission(&self) -> Option<&CommissionResult> {
        match self {
            OrderKind::Shop => None,
            OrderKind::Marketplace { commission, .. } => Some(commission),
        }
    }
}

/// Rail-specific external references. At most one external reference exists
/// per rail; internal-ledger purchases never have one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rail", rename_all = "snake_case")]
pub enum RailState {
    InternalLedger,
    Card {
        intent_ref: Option<String>,
    },
    Wallet {
        order_ref: Option<String>,
        capture_ref: Option<String>,
    },
}

impl RailState {
    pub fn rail(&self) -> PaymentRail {
        match self {
            RailState::InternalLedger => PaymentRail::Points,
            RailState::Card { .. } => PaymentRail::Card,
            RailState::Wallet { .. } => PaymentRail::Wallet,
        }
    }

    pub fn card_intent_ref(&self) -> Option<&str> {
        match self {
            RailState::Card { intent_ref } => intent_ref.as_deref(),
            _ => None,
        }
    }

    pub fn wallet_order_ref(&self) -> Option<&str> {
        match self {
            RailState::Wallet { order_ref, .. } => order_ref.as_deref(),
            _ => None,
        }
    }

    pub fn wallet_capture_ref(&self) -> Option<&str> {
        match self {
            RailState::Wallet { capture_ref, .. } => capture_ref.as_deref(),
            _ => None,
        }
    }
}

/// The aggregate root of a purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    #[serde(flatten)]
    pub kind: OrderKind,
    #[serde(flatten)]
    pub rail: RailState,
    pub items: Vec<OrderItem>,
    pub currency: Currency,
    pub subtotal: Money,
    pub shipping: Money,
    /// Always zero in this design; kept on the document for auditability.
    pub tax: Money,
    pub total: Money,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    /// Present when the order contains digital items.
    pub digital_delivery: Option<DigitalDeliveryStatus>,
    pub shipping_address_id: Option<Uuid>,
    pub shipping_method: Option<ShippingMethod>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_digital_only(&self) -> bool {
        self.items.iter().all(|i| i.is_digital)
    }

    pub fn has_digital_items(&self) -> bool {
        self.items.iter().any(|i| i.is_digital)
    }

    /// Sets `paid_at` exactly once; later calls keep the original timestamp.
    pub fn mark_paid(&mut self, at: DateTime<Utc>) {
        self.payment_status = PaymentStatus::Paid;
        if self.paid_at.is_none() {
            self.paid_at = Some(at);
        }
    }

    pub fn mark_digital_delivered(&mut self) {
        if self.digital_delivery.is_some() {
            self.digital_delivery = Some(DigitalDeliveryStatus::Delivered);
        }
    }
}

/// Inbound payment-processor event kinds, normalized across rails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    CaptureCompleted,
    CaptureDenied,
    RefundIssued { full: bool },
}

/// Side effects a transition demands. Document-level effects are folded into
/// the order before the conditional write; store-level effects run only after
/// the write wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementEffect {
    DebitInventory,
    DeliverDigital,
    SignalSellerPayout,
    CancelFulfillment,
    RestoreInventory,
}

/// Outcome of consulting the transition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionPlan {
    Apply {
        next: PaymentStatus,
        effects: &'static [SettlementEffect],
    },
    /// Duplicate event consistent with the current state: acknowledge, no
    /// side effects. This is the order-level idempotency gate.
    AlreadySettled,
    /// Illegal transition; acknowledged to the sender but never applied.
    Rejected,
}

use SettlementEffect::*;

const CAPTURE_EFFECTS: &[SettlementEffect] = &[DebitInventory, DeliverDigital, SignalSellerPayout];
const FULL_REFUND_EFFECTS: &[SettlementEffect] = &[CancelFulfillment, RestoreInventory];
const PARTIAL_REFUND_EFFECTS: &[SettlementEffect] = &[CancelFulfillment];

/// The settlement state machine as one table. Every webhook and every explicit
/// capture call funnels through here, so idempotent acknowledgement and
/// illegal-transition rejection live in a single place.
pub fn plan_transition(current: PaymentStatus, event: PaymentEventKind) -> TransitionPlan {
    use PaymentEventKind::*;
    use PaymentStatus::*;

    match (current, event) {
        (Pending, CaptureCompleted) => TransitionPlan::Apply {
            next: Paid,
            effects: CAPTURE_EFFECTS,
        },
        (Pending, CaptureDenied) => TransitionPlan::Apply {
            next: Failed,
            effects: &[],
        },
        (Paid, RefundIssued { full: true }) => TransitionPlan::Apply {
            next: Refunded,
            effects: FULL_REFUND_EFFECTS,
        },
        (Paid, RefundIssued { full: false }) => TransitionPlan::Apply {
            next: PartiallyRefunded,
            effects: PARTIAL_REFUND_EFFECTS,
        },

        // Redeliveries of an event consistent with where we already are.
        (Paid, CaptureCompleted)
        | (Failed, CaptureDenied)
        | (Refunded, RefundIssued { .. })
        | (PartiallyRefunded, RefundIssued { full: false }) => TransitionPlan::AlreadySettled,

        _ => TransitionPlan::Rejected,
    }
}
