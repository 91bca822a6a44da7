//! Shared harness for integration tests: in-memory stores, fake payment
//! processors, and helpers for driving the router and signing webhook
//! payloads the way the processors would.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, Response, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use diehard_api::{
    config::{AppConfig, CardProcessorConfig, WalletProcessorConfig},
    errors::ServiceError,
    events::EventSender,
    models::catalog::{InventoryLevel, ModerationStatus, Product, ShippingAddress},
    models::order::{Currency, Money},
    models::points::PointReason,
    payments::card::{self, CardProcessor, PaymentIntent},
    payments::wallet::{self, WalletCapture, WalletOrder, WalletProcessor},
    services::AppServices,
    store::Stores,
    AppState,
};

pub const CARD_WEBHOOK_SECRET: &str = "whsec_card_test_secret";
pub const WALLET_WEBHOOK_SECRET: &str = "whsec_wallet_test_secret";

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "development".to_string(),
        log_level: "info".to_string(),
        log_json: false,
        cors_allowed_origins: None,
        request_timeout_secs: 30,
        event_channel_capacity: 64,
        card: CardProcessorConfig {
            base_url: "https://cards.invalid".to_string(),
            secret_key: "sk_test_1234567890".to_string(),
            webhook_secret: CARD_WEBHOOK_SECRET.to_string(),
            timeout_secs: 5,
            webhook_tolerance_secs: 300,
        },
        wallet: WalletProcessorConfig {
            base_url: "https://wallet.invalid".to_string(),
            client_id: "wallet-client".to_string(),
            client_secret: "wallet-secret-123".to_string(),
            webhook_secret: WALLET_WEBHOOK_SECRET.to_string(),
            timeout_secs: 5,
            webhook_tolerance_secs: 300,
            token_refresh_margin_secs: 60,
            return_url: "https://diehard.community/checkout/return".to_string(),
            cancel_url: "https://diehard.community/checkout/cancel".to_string(),
        },
    }
}

/// Card processor double: hands out predictable intent references.
#[derive(Default)]
pub struct FakeCardProcessor {
    counter: AtomicU64,
    pub fail_next_create: AtomicBool,
    pub cancelled: Mutex<Vec<String>>,
    pub refunds: Mutex<Vec<(String, Option<Money>)>>,
}

#[async_trait]
impl CardProcessor for FakeCardProcessor {
    async fn create_payment_intent(
        &self,
        _amount: Money,
        _currency: Currency,
        _metadata: std::collections::HashMap<String, String>,
    ) -> Result<PaymentIntent, ServiceError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::ProcessorError(
                "card processor unavailable".to_string(),
            ));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentIntent {
            id: format!("pi_test_{}", n),
            client_secret: format!("pi_test_{}_secret", n),
            status: "requires_payment_method".to_string(),
        })
    }

    async fn retrieve_intent(&self, intent_ref: &str) -> Result<PaymentIntent, ServiceError> {
        Ok(PaymentIntent {
            id: intent_ref.to_string(),
            client_secret: format!("{}_secret", intent_ref),
            status: "requires_payment_method".to_string(),
        })
    }

    async fn cancel_intent(&self, intent_ref: &str) -> Result<PaymentIntent, ServiceError> {
        self.cancelled.lock().await.push(intent_ref.to_string());
        Ok(PaymentIntent {
            id: intent_ref.to_string(),
            client_secret: format!("{}_secret", intent_ref),
            status: "canceled".to_string(),
        })
    }

    async fn create_refund(
        &self,
        intent_ref: &str,
        amount: Option<Money>,
    ) -> Result<String, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.refunds
            .lock()
            .await
            .push((intent_ref.to_string(), amount));
        Ok(format!("re_test_{}", n))
    }
}

/// Wallet processor double: approves everything, verifies webhooks with the
/// real transmission-signature scheme.
pub struct FakeWalletProcessor {
    counter: AtomicU64,
    webhook_secret: String,
    pub captures: Mutex<Vec<String>>,
    pub refunds: Mutex<Vec<(String, Option<Money>)>>,
}

impl Default for FakeWalletProcessor {
    fn default() -> Self {
        Self {
            counter: AtomicU64::new(0),
            webhook_secret: WALLET_WEBHOOK_SECRET.to_string(),
            captures: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WalletProcessor for FakeWalletProcessor {
    async fn create_order(
        &self,
        _amount: Money,
        _currency: Currency,
        _metadata: std::collections::HashMap<String, String>,
        _return_url: &str,
        _cancel_url: &str,
    ) -> Result<WalletOrder, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(WalletOrder {
            id: format!("W-ORD-{}", n),
            status: "CREATED".to_string(),
            approval_url: format!("https://wallet.invalid/approve/W-ORD-{}", n),
        })
    }

    async fn capture_order(&self, order_ref: &str) -> Result<WalletCapture, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.captures.lock().await.push(order_ref.to_string());
        Ok(WalletCapture {
            status: "COMPLETED".to_string(),
            capture_id: format!("CAP-{}", n),
        })
    }

    async fn refund_capture(
        &self,
        capture_ref: &str,
        amount: Option<Money>,
    ) -> Result<String, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.refunds
            .lock()
            .await
            .push((capture_ref.to_string(), amount));
        Ok(format!("WREF-{}", n))
    }

    fn verify_webhook_signature(&self, headers: &HeaderMap, payload: &[u8]) -> bool {
        wallet::verify_transmission_signature(headers, payload, &self.webhook_secret, 300)
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub card: Arc<FakeCardProcessor>,
    pub wallet: Arc<FakeWalletProcessor>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = test_config();
        let stores = Stores::in_memory();
        let (event_tx, event_rx) = tokio::sync::mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        tokio::spawn(diehard_api::events::process_events(event_rx));

        let card = Arc::new(FakeCardProcessor::default());
        let wallet = Arc::new(FakeWalletProcessor::default());

        let services = AppServices::new(
            &config,
            stores.clone(),
            card.clone(),
            wallet.clone(),
            event_sender.clone(),
        );

        let state = AppState {
            config,
            stores,
            services,
            event_sender,
        };

        let router = diehard_api::app_router().with_state(state.clone());

        Self {
            router,
            state,
            card,
            wallet,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn post_json(&self, path: &str, payload: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let response = self.request(request).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    pub async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self.request(request).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    // ---- seeding ----

    pub async fn seed_product(&self, product: Product) -> Uuid {
        let id = product.id;
        self.state
            .stores
            .inventory
            .upsert_product(product)
            .await
            .expect("seed product");
        id
    }

    pub async fn seed_points(&self, user_id: Uuid, amount: Money) {
        self.state
            .stores
            .points
            .credit(user_id, amount, PointReason::Adjustment, None)
            .await
            .expect("seed points");
    }

    pub async fn seed_address(&self, user_id: Uuid) -> Uuid {
        let address = ShippingAddress {
            id: Uuid::new_v4(),
            user_id,
            line1: "42 Terrace Way".to_string(),
            line2: None,
            city: "Nakatomi".to_string(),
            region: "CA".to_string(),
            postal_code: "90210".to_string(),
            country_code: "US".to_string(),
        };
        let id = address.id;
        self.state
            .stores
            .addresses
            .upsert(address)
            .await
            .expect("seed address");
        id
    }

    pub async fn balance(&self, user_id: Uuid) -> Money {
        self.state.stores.points.balance(user_id).await.unwrap()
    }

    pub async fn product(&self, id: Uuid) -> Product {
        self.state
            .stores
            .inventory
            .get_product(id)
            .await
            .unwrap()
            .expect("product exists")
    }

    // ---- signed webhook requests ----

    pub fn card_webhook(&self, payload: &Value, secret: &str) -> Request<Body> {
        let body = payload.to_string();
        let ts = Utc::now().timestamp().to_string();
        let sig = card::sign_payload(&ts, body.as_bytes(), secret);
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/webhooks/card")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-card-signature", format!("t={},v1={}", ts, sig))
            .body(Body::from(body))
            .unwrap()
    }

    pub fn wallet_webhook(&self, payload: &Value, secret: &str) -> Request<Body> {
        let body = payload.to_string();
        let transmission_id = Uuid::new_v4().to_string();
        let ts = Utc::now().timestamp().to_string();
        let sig = wallet::sign_transmission(&transmission_id, &ts, body.as_bytes(), secret);
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/webhooks/wallet")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-wallet-transmission-id", transmission_id)
            .header("x-wallet-transmission-time", ts)
            .header("x-wallet-transmission-sig", sig)
            .body(Body::from(body))
            .unwrap()
    }
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or(Value::String(
        String::from_utf8_lossy(&bytes).to_string(),
    ))
}

// ---- product builders ----

pub fn shop_product(name: &str, price_usd: Money, available: i64) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        seller_id: None,
        status: ModerationStatus::Active,
        price_usd: Some(price_usd),
        price_points: None,
        is_digital: false,
        expires_at: None,
        inventory: InventoryLevel::new(available),
        variants: vec![],
        created_at: Utc::now(),
    }
}

pub fn digital_product(name: &str, price_points: Money, available: i64) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        seller_id: None,
        status: ModerationStatus::Active,
        price_usd: None,
        price_points: Some(price_points),
        is_digital: true,
        expires_at: None,
        inventory: InventoryLevel::new(available),
        variants: vec![],
        created_at: Utc::now(),
    }
}

pub fn marketplace_listing(
    seller_id: Uuid,
    name: &str,
    price_points: Money,
    available: i64,
) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        seller_id: Some(seller_id),
        status: ModerationStatus::Active,
        price_usd: None,
        price_points: Some(price_points),
        is_digital: false,
        expires_at: None,
        inventory: InventoryLevel::new(available),
        variants: vec![],
        created_at: Utc::now(),
    }
}

/// A standard card-processor capture event for an intent.
pub fn card_capture_event(event_id: &str, intent_ref: &str, order_id: Uuid, amount: Money) -> Value {
    serde_json::json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": intent_ref,
            "amount": amount,
            "metadata": { "order_id": order_id.to_string() }
        }}
    })
}
