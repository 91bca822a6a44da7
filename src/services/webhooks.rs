//! Webhook reconciliation for the two asynchronous rails. Signature
//! verification happens over the raw body before any business parsing; the
//! `(rail, event id)` tuple is claimed atomically so redelivered events are
//! acknowledged without side effects; the transition table decides what, if
//! anything, the event does to the order.

use chrono::Utc;
use http::HeaderMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::order::{Order, PaymentEventKind, PaymentRail},
    models::points::PointReason,
    payments::{
        card::{self, CardEvent},
        wallet::{self, WalletProcessor},
    },
    services::settlement::{CaptureUpdate, SettlementService},
    store::Stores,
};

/// What the handler tells the processor. Everything here is a 200; failures
/// that should trigger redelivery surface as `ServiceError` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    Processed,
    Duplicate,
    Ignored,
}

pub struct WebhookService {
    stores: Stores,
    settlement: Arc<SettlementService>,
    wallet: Arc<dyn WalletProcessor>,
    events: EventSender,
    card_webhook_secret: String,
    card_webhook_tolerance_secs: i64,
}

impl WebhookService {
    pub fn new(
        stores: Stores,
        settlement: Arc<SettlementService>,
        wallet: Arc<dyn WalletProcessor>,
        events: EventSender,
        card_webhook_secret: String,
        card_webhook_tolerance_secs: i64,
    ) -> Self {
        Self {
            stores,
            settlement,
            wallet,
            events,
            card_webhook_secret,
            card_webhook_tolerance_secs,
        }
    }

    #[instrument(skip_all)]
    pub async fn handle_card_event(
        &self,
        headers: &HeaderMap,
        payload: &[u8],
    ) -> Result<WebhookAck, ServiceError> {
        // Signature first, over the raw bytes. A forged event never reaches
        // the parser, let alone the stores.
        let event = card::construct_verified_event(
            headers,
            payload,
            &self.card_webhook_secret,
            self.card_webhook_tolerance_secs,
        )?;

        if !self
            .stores
            .processed_events
            .try_claim(PaymentRail::Card, &event.id)
            .await?
        {
            info!(event_id = %event.id, "card event already processed");
            return Ok(WebhookAck::Duplicate);
        }

        // Coin-pack intents settle against the coin-purchase collection, not
        // the order collection.
        if event.data.object.metadata.contains_key("coin_purchase_id") {
            return self.apply_coin_event(&event).await;
        }

        let order = match self.find_card_order(&event).await? {
            Some(order) => order,
            None => {
                warn!(event_id = %event.id, intent_ref = %event.data.object.id,
                    "card event does not match any order");
                return Ok(WebhookAck::Ignored);
            }
        };

        match event.kind.as_str() {
            "payment_intent.succeeded" => {
                self.settlement
                    .apply(order, PaymentEventKind::CaptureCompleted, None)
                    .await?;
                Ok(WebhookAck::Processed)
            }
            "payment_intent.payment_failed" | "payment_intent.canceled" => {
                self.settlement
                    .apply(order, PaymentEventKind::CaptureDenied, None)
                    .await?;
                Ok(WebhookAck::Processed)
            }
            "charge.refunded" => {
                let full = event.data.object.amount_refunded >= order.total;
                self.settlement
                    .apply(order, PaymentEventKind::RefundIssued { full }, None)
                    .await?;
                Ok(WebhookAck::Processed)
            }
            other => {
                // Unknown kinds are acknowledged so the processor stops
                // retrying; they are logged for investigation.
                info!(event_id = %event.id, kind = %other, "unhandled card event type");
                Ok(WebhookAck::Ignored)
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn handle_wallet_event(
        &self,
        headers: &HeaderMap,
        payload: &[u8],
    ) -> Result<WebhookAck, ServiceError> {
        if !self.wallet.verify_webhook_signature(headers, payload) {
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
        let event = wallet::parse_event(payload)?;

        if !self
            .stores
            .processed_events
            .try_claim(PaymentRail::Wallet, &event.id)
            .await?
        {
            info!(event_id = %event.id, "wallet event already processed");
            return Ok(WebhookAck::Duplicate);
        }

        let order = match self.find_wallet_order(&event).await? {
            Some(order) => order,
            None => {
                warn!(event_id = %event.id, "wallet event does not match any order");
                return Ok(WebhookAck::Ignored);
            }
        };

        match event.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" => {
                let capture = event
                    .resource
                    .capture_id
                    .clone()
                    .map(|capture_ref| CaptureUpdate::WalletCapture { capture_ref });
                self.settlement
                    .apply(order, PaymentEventKind::CaptureCompleted, capture)
                    .await?;
                Ok(WebhookAck::Processed)
            }
            "PAYMENT.CAPTURE.DENIED" => {
                self.settlement
                    .apply(order, PaymentEventKind::CaptureDenied, None)
                    .await?;
                Ok(WebhookAck::Processed)
            }
            "PAYMENT.CAPTURE.REFUNDED" => {
                let refunded = event.resource.refund_amount.unwrap_or(event.resource.amount);
                let full = refunded >= order.total;
                self.settlement
                    .apply(order, PaymentEventKind::RefundIssued { full }, None)
                    .await?;
                Ok(WebhookAck::Processed)
            }
            other => {
                info!(event_id = %event.id, kind = %other, "unhandled wallet event type");
                Ok(WebhookAck::Ignored)
            }
        }
    }

    /// Orders are durably visible before the intent exists, so a verified
    /// event that matches nothing is foreign, not early.
    async fn find_card_order(&self, event: &CardEvent) -> Result<Option<Order>, ServiceError> {
        if let Some(order_id) = event.data.object.order_id() {
            if let Some(order) = self.stores.orders.get(order_id).await? {
                return Ok(Some(order));
            }
        }
        self.stores
            .orders
            .find_by_card_intent(&event.data.object.id)
            .await
    }

    async fn find_wallet_order(
        &self,
        event: &wallet::WalletEvent,
    ) -> Result<Option<Order>, ServiceError> {
        if let Some(order_id) = event.resource.order_id() {
            if let Some(order) = self.stores.orders.get(order_id).await? {
                return Ok(Some(order));
            }
        }
        if let Some(order_ref) = event.resource.order_ref.as_deref() {
            return self.stores.orders.find_by_wallet_order(order_ref).await;
        }
        Ok(None)
    }

    /// Coin-pack settlement. Crediting is keyed on the purchase row's own
    /// pending -> credited compare-and-set (one row per payment session), so
    /// a redelivered capture event can never credit twice even if it slips
    /// past the event-id claim.
    async fn apply_coin_event(&self, event: &CardEvent) -> Result<WebhookAck, ServiceError> {
        let purchase = match self.find_coin_purchase(event).await? {
            Some(purchase) => purchase,
            None => {
                warn!(event_id = %event.id, "coin event does not match any purchase");
                return Ok(WebhookAck::Ignored);
            }
        };

        match event.kind.as_str() {
            "payment_intent.succeeded" => {
                let claimed = self
                    .stores
                    .coin_purchases
                    .try_mark_credited(purchase.id, Utc::now())
                    .await?;
                match claimed {
                    Some(purchase) => {
                        self.stores
                            .points
                            .credit(purchase.user_id, purchase.coins, PointReason::CoinPack, None)
                            .await?;
                        info!(
                            purchase_id = %purchase.id,
                            user_id = %purchase.user_id,
                            coins = purchase.coins,
                            "coin pack credited"
                        );
                        self.events
                            .send(Event::PointsCredited {
                                user_id: purchase.user_id,
                                amount: purchase.coins,
                            })
                            .await;
                        Ok(WebhookAck::Processed)
                    }
                    None => {
                        info!(purchase_id = %purchase.id, "coin purchase already credited");
                        Ok(WebhookAck::Duplicate)
                    }
                }
            }
            "payment_intent.payment_failed" | "payment_intent.canceled" => {
                self.stores.coin_purchases.mark_failed(purchase.id).await?;
                Ok(WebhookAck::Processed)
            }
            other => {
                info!(event_id = %event.id, kind = %other, "unhandled coin event type");
                Ok(WebhookAck::Ignored)
            }
        }
    }

    async fn find_coin_purchase(
        &self,
        event: &CardEvent,
    ) -> Result<Option<crate::models::coin_pack::CoinPurchase>, ServiceError> {
        if let Some(purchase_id) = event
            .data
            .object
            .metadata
            .get("coin_purchase_id")
            .and_then(|v| Uuid::parse_str(v).ok())
        {
            if let Some(purchase) = self.stores.coin_purchases.get(purchase_id).await? {
                return Ok(Some(purchase));
            }
        }
        self.stores
            .coin_purchases
            .find_by_intent(&event.data.object.id)
            .await
    }
}
