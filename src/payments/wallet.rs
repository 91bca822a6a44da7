//! Wallet processor adapter: redirect-based checkout with an OAuth access
//! token. The token lives in an explicit `{token, expires_at}` cache owned by
//! the client instance and is refreshed lazily with a safety margin.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::{
    config::WalletProcessorConfig,
    errors::ServiceError,
    models::order::{Currency, Money, Order},
    payments::{card::constant_time_eq, CheckoutOutcome, PaymentContinuation, PaymentStrategy},
    store::OrderStore,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
pub struct WalletOrder {
    pub id: String,
    pub status: String,
    pub approval_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletCapture {
    pub status: String,
    pub capture_id: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletProcessor: Send + Sync {
    async fn create_order(
        &self,
        amount: Money,
        currency: Currency,
        metadata: HashMap<String, String>,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<WalletOrder, ServiceError>;

    async fn capture_order(&self, order_ref: &str) -> Result<WalletCapture, ServiceError>;

    /// Refunds a capture, the full amount when `amount` is None.
    async fn refund_capture(
        &self,
        capture_ref: &str,
        amount: Option<Money>,
    ) -> Result<String, ServiceError>;

    fn verify_webhook_signature(&self, headers: &HeaderMap, payload: &[u8]) -> bool;
}

/// Cached OAuth token with its expiry.
#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Usable only while comfortably inside its lifetime.
    fn is_fresh(&self, margin: ChronoDuration, now: DateTime<Utc>) -> bool {
        now + margin < self.expires_at
    }
}

/// HTTP client for the wallet processor.
pub struct HttpWalletProcessor {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    webhook_secret: String,
    webhook_tolerance_secs: i64,
    token_refresh_margin: ChronoDuration,
    token: RwLock<Option<AccessToken>>,
}

impl HttpWalletProcessor {
    pub fn new(cfg: &WalletProcessorConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            webhook_secret: cfg.webhook_secret.clone(),
            webhook_tolerance_secs: cfg.webhook_tolerance_secs,
            token_refresh_margin: ChronoDuration::seconds(cfg.token_refresh_margin_secs),
            token: RwLock::new(None),
        })
    }

    /// Returns the cached token, fetching a new one when absent or about to
    /// expire. The write lock is only taken for the refresh path and the
    /// double-check keeps concurrent refreshers from stampeding.
    async fn access_token(&self) -> Result<String, ServiceError> {
        let now = Utc::now();

        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh(self.token_refresh_margin, now) {
                return Ok(token.token.clone());
            }
        }

        let mut slot = self.token.write().await;
        if let Some(token) = slot.as_ref() {
            if token.is_fresh(self.token_refresh_margin, now) {
                return Ok(token.token.clone());
            }
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        debug!("refreshing wallet processor access token");
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ServiceError::ProcessorError(format!("wallet token: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ProcessorError(format!(
                "wallet token endpoint returned {}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ProcessorError(format!("wallet token body: {}", e)))?;

        let token = AccessToken {
            token: body.access_token,
            expires_at: now + ChronoDuration::seconds(body.expires_in),
        };
        let value = token.token.clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn post_authed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ServiceError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::ProcessorError(format!("wallet processor: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ProcessorError(format!(
                "wallet processor returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ServiceError::ProcessorError(format!("wallet processor body: {}", e)))
    }
}

#[async_trait]
impl WalletProcessor for HttpWalletProcessor {
    async fn create_order(
        &self,
        amount: Money,
        currency: Currency,
        metadata: HashMap<String, String>,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<WalletOrder, ServiceError> {
        let body = serde_json::json!({
            "amount": amount,
            "currency": currency,
            "metadata": metadata,
            "return_url": return_url,
            "cancel_url": cancel_url,
        });
        self.post_authed("/v2/checkout/orders", &body).await
    }

    async fn capture_order(&self, order_ref: &str) -> Result<WalletCapture, ServiceError> {
        let body = serde_json::json!({});
        self.post_authed(&format!("/v2/checkout/orders/{}/capture", order_ref), &body)
            .await
    }

    async fn refund_capture(
        &self,
        capture_ref: &str,
        amount: Option<Money>,
    ) -> Result<String, ServiceError> {
        #[derive(Deserialize)]
        struct Refund {
            id: String,
        }

        let mut body = serde_json::json!({});
        if let Some(amount) = amount {
            body["amount"] = serde_json::json!(amount);
        }
        let refund: Refund = self
            .post_authed(&format!("/v2/payments/captures/{}/refund", capture_ref), &body)
            .await?;
        Ok(refund.id)
    }

    fn verify_webhook_signature(&self, headers: &HeaderMap, payload: &[u8]) -> bool {
        verify_transmission_signature(
            headers,
            payload,
            &self.webhook_secret,
            self.webhook_tolerance_secs,
        )
    }
}

/// Wallet webhook scheme: HMAC-SHA256 over
/// `"{transmission id}|{transmission time}|{raw body}"`, hex-encoded in the
/// `x-wallet-transmission-sig` header.
pub fn verify_transmission_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
) -> bool {
    let Some(id) = headers
        .get("x-wallet-transmission-id")
        .and_then(|h| h.to_str().ok())
    else {
        return false;
    };
    let Some(ts) = headers
        .get("x-wallet-transmission-time")
        .and_then(|h| h.to_str().ok())
    else {
        return false;
    };
    let Some(sig) = headers
        .get("x-wallet-transmission-sig")
        .and_then(|h| h.to_str().ok())
    else {
        return false;
    };

    let Ok(ts_i) = ts.parse::<i64>() else {
        return false;
    };
    if (Utc::now().timestamp() - ts_i).abs() > tolerance_secs {
        return false;
    }

    let expected = sign_transmission(id, ts, payload, secret);
    constant_time_eq(&expected, sig)
}

pub fn sign_transmission(id: &str, ts: &str, payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(id.as_bytes());
    mac.update(b"|");
    mac.update(ts.as_bytes());
    mac.update(b"|");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// An inbound wallet-processor event. Parsed only after the transmission
/// signature has been verified.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletEvent {
    pub id: String,
    pub event_type: String,
    pub resource: WalletEventResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletEventResource {
    #[serde(default)]
    pub capture_id: Option<String>,
    #[serde(default)]
    pub order_ref: Option<String>,
    pub amount: Money,
    #[serde(default)]
    pub refund_amount: Option<Money>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl WalletEventResource {
    pub fn order_id(&self) -> Option<uuid::Uuid> {
        self.metadata
            .get("order_id")
            .and_then(|v| uuid::Uuid::parse_str(v).ok())
    }
}

pub fn parse_event(payload: &[u8]) -> Result<WalletEvent, ServiceError> {
    serde_json::from_slice(payload)
        .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {}", e)))
}

/// Asynchronous wallet rail: creates a processor order with redirect URLs,
/// persists the reference, and hands the approval link back. Settlement
/// happens on explicit capture or on the webhook, whichever lands first.
pub struct RedirectWalletStrategy {
    processor: Arc<dyn WalletProcessor>,
    orders: Arc<dyn OrderStore>,
    return_url: String,
    cancel_url: String,
}

impl RedirectWalletStrategy {
    pub fn new(
        processor: Arc<dyn WalletProcessor>,
        orders: Arc<dyn OrderStore>,
        cfg: &WalletProcessorConfig,
    ) -> Self {
        Self {
            processor,
            orders,
            return_url: cfg.return_url.clone(),
            cancel_url: cfg.cancel_url.clone(),
        }
    }
}

#[async_trait]
impl PaymentStrategy for RedirectWalletStrategy {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn execute(&self, order: Order) -> Result<CheckoutOutcome, ServiceError> {
        let metadata = crate::payments::card::order_metadata(&order);

        let wallet_order = self
            .processor
            .create_order(
                order.total,
                order.currency,
                metadata,
                &self.return_url,
                &self.cancel_url,
            )
            .await?;

        self.orders
            .set_wallet_order_ref(order.id, &wallet_order.id)
            .await?;
        info!(order_id = %order.id, wallet_order_ref = %wallet_order.id, "wallet order created");

        let order = self
            .orders
            .get(order.id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order.id)))?;

        Ok(CheckoutOutcome::RequiresPayment {
            order,
            continuation: PaymentContinuation::WalletApproval {
                wallet_order_ref: wallet_order.id,
                approval_url: wallet_order.approval_url,
            },
        })
    }
}
