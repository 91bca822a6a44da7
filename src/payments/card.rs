//! Card processor adapter: payment intents created over HTTP, webhook events
//! verified with an HMAC signature over the raw payload.

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    config::CardProcessorConfig,
    errors::ServiceError,
    models::order::{Currency, Money, Order},
    payments::{CheckoutOutcome, PaymentContinuation, PaymentStrategy},
    store::OrderStore,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub status: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CardProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount: Money,
        currency: Currency,
        metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent, ServiceError>;

    async fn retrieve_intent(&self, intent_ref: &str) -> Result<PaymentIntent, ServiceError>;

    async fn cancel_intent(&self, intent_ref: &str) -> Result<PaymentIntent, ServiceError>;

    /// Refunds a captured intent, the full amount when `amount` is None.
    async fn create_refund(
        &self,
        intent_ref: &str,
        amount: Option<Money>,
    ) -> Result<String, ServiceError>;
}

/// HTTP client for the card processor.
pub struct HttpCardProcessor {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpCardProcessor {
    pub fn new(cfg: &CardProcessorConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            secret_key: cfg.secret_key.clone(),
        })
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<PaymentIntent, ServiceError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::ProcessorError(format!("card processor: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ProcessorError(format!(
                "card processor returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ServiceError::ProcessorError(format!("card processor body: {}", e)))
    }
}

#[async_trait]
impl CardProcessor for HttpCardProcessor {
    async fn create_payment_intent(
        &self,
        amount: Money,
        currency: Currency,
        metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent, ServiceError> {
        let body = serde_json::json!({
            "amount": amount,
            "currency": currency,
            "metadata": metadata,
        });
        self.post_json("/v1/payment_intents", &body).await
    }

    async fn retrieve_intent(&self, intent_ref: &str) -> Result<PaymentIntent, ServiceError> {
        let response = self
            .http
            .get(format!("{}/v1/payment_intents/{}", self.base_url, intent_ref))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ServiceError::ProcessorError(format!("card processor: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ProcessorError(format!(
                "card processor returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ServiceError::ProcessorError(format!("card processor body: {}", e)))
    }

    async fn cancel_intent(&self, intent_ref: &str) -> Result<PaymentIntent, ServiceError> {
        let body = serde_json::json!({});
        self.post_json(
            &format!("/v1/payment_intents/{}/cancel", intent_ref),
            &body,
        )
        .await
    }

    async fn create_refund(
        &self,
        intent_ref: &str,
        amount: Option<Money>,
    ) -> Result<String, ServiceError> {
        #[derive(Deserialize)]
        struct Refund {
            id: String,
        }

        let mut body = serde_json::json!({ "payment_intent": intent_ref });
        if let Some(amount) = amount {
            body["amount"] = serde_json::json!(amount);
        }
        let response = self
            .http
            .post(format!("{}/v1/refunds", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ProcessorError(format!("card processor: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ProcessorError(format!(
                "card processor returned {}",
                response.status()
            )));
        }
        let refund: Refund = response
            .json()
            .await
            .map_err(|e| ServiceError::ProcessorError(format!("card processor body: {}", e)))?;
        Ok(refund.id)
    }
}

/// Asynchronous card rail: creates a processor intent tagged with order
/// metadata, persists the reference, and leaves the order pending. All
/// settlement happens in the webhook reconciler.
pub struct CardIntentStrategy {
    processor: Arc<dyn CardProcessor>,
    orders: Arc<dyn OrderStore>,
}

impl CardIntentStrategy {
    pub fn new(processor: Arc<dyn CardProcessor>, orders: Arc<dyn OrderStore>) -> Self {
        Self { processor, orders }
    }
}

#[async_trait]
impl PaymentStrategy for CardIntentStrategy {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn execute(&self, order: Order) -> Result<CheckoutOutcome, ServiceError> {
        let metadata = order_metadata(&order);

        // A failure or timeout here leaves the order pending with no external
        // reference, which the buyer can safely retry from.
        let intent = self
            .processor
            .create_payment_intent(order.total, order.currency, metadata)
            .await?;

        self.orders.set_card_intent(order.id, &intent.id).await?;
        info!(order_id = %order.id, intent_ref = %intent.id, "card payment intent created");

        let order = self
            .orders
            .get(order.id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order.id)))?;

        Ok(CheckoutOutcome::RequiresPayment {
            order,
            continuation: PaymentContinuation::CardIntent {
                intent_ref: intent.id,
                client_secret: intent.client_secret,
            },
        })
    }
}

/// Metadata attached to every processor-side object so webhooks can find the
/// order without relying on the external-reference index.
pub fn order_metadata(order: &Order) -> HashMap<String, String> {
    let mut metadata = HashMap::from([
        ("order_id".to_string(), order.id.to_string()),
        ("order_number".to_string(), order.order_number.clone()),
        ("buyer_id".to_string(), order.buyer_id.to_string()),
    ]);
    if let Some(seller_id) = order.kind.seller_id() {
        metadata.insert("seller_id".to_string(), seller_id.to_string());
    }
    metadata
}

/// A verified inbound card-processor event.
#[derive(Debug, Clone, Deserialize)]
pub struct CardEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: CardEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardEventData {
    pub object: CardEventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardEventObject {
    /// The payment intent reference
    pub id: String,
    pub amount: Money,
    #[serde(default)]
    pub amount_refunded: Money,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CardEventObject {
    pub fn order_id(&self) -> Option<Uuid> {
        self.metadata
            .get("order_id")
            .and_then(|v| Uuid::parse_str(v).ok())
    }
}

/// Verifies the signature over the raw payload and only then parses it.
/// Rejecting before parsing keeps forged payloads away from business logic.
pub fn construct_verified_event(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
) -> Result<CardEvent, ServiceError> {
    if !verify_signature(headers, payload, secret, tolerance_secs) {
        return Err(ServiceError::Unauthorized(
            "invalid webhook signature".to_string(),
        ));
    }
    serde_json::from_slice(payload)
        .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {}", e)))
}

/// Two accepted header schemes: plain `x-timestamp` + `x-signature`, and the
/// combined `x-card-signature: t=...,v1=...` form. Both sign
/// `"{timestamp}.{raw body}"` with HMAC-SHA256.
fn verify_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
) -> bool {
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            return verify_timestamped(ts, sig, payload, secret, tolerance_secs);
        }
    }

    if let Some(combined) = headers
        .get("x-card-signature")
        .and_then(|h| h.to_str().ok())
    {
        let mut ts = "";
        let mut v1 = "";
        for part in combined.split(',') {
            let mut it = part.trim().splitn(2, '=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            return verify_timestamped(ts, v1, payload, secret, tolerance_secs);
        }
    }

    false
}

fn verify_timestamped(
    ts: &str,
    signature: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
) -> bool {
    let Ok(ts_i) = ts.parse::<i64>() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts_i).abs() > tolerance_secs {
        return false;
    }

    let expected = sign_payload(ts, payload, secret);
    constant_time_eq(&expected, signature)
}

/// HMAC-SHA256 over `"{timestamp}.{raw body}"`, hex-encoded.
pub fn sign_payload(ts: &str, payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
