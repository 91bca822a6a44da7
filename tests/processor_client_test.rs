//! HTTP adapter tests against a stubbed processor: request shape, error
//! mapping, and the wallet token cache.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use diehard_api::config::{CardProcessorConfig, WalletProcessorConfig};
use diehard_api::errors::ServiceError;
use diehard_api::models::order::Currency;
use diehard_api::payments::card::{CardProcessor, HttpCardProcessor};
use diehard_api::payments::wallet::{HttpWalletProcessor, WalletProcessor};

fn card_config(base_url: String) -> CardProcessorConfig {
    CardProcessorConfig {
        base_url,
        secret_key: "sk_test_1234567890".to_string(),
        webhook_secret: "whsec_card_test_secret".to_string(),
        timeout_secs: 5,
        webhook_tolerance_secs: 300,
    }
}

fn wallet_config(base_url: String) -> WalletProcessorConfig {
    WalletProcessorConfig {
        base_url,
        client_id: "wallet-client".to_string(),
        client_secret: "wallet-secret-123".to_string(),
        webhook_secret: "whsec_wallet_test_secret".to_string(),
        timeout_secs: 5,
        webhook_tolerance_secs: 300,
        token_refresh_margin_secs: 60,
        return_url: "https://diehard.community/checkout/return".to_string(),
        cancel_url: "https://diehard.community/checkout/cancel".to_string(),
    }
}

#[tokio::test]
async fn card_client_creates_intents() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({ "amount": 2500, "currency": "usd" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_wm_1",
            "client_secret": "pi_wm_1_secret",
            "status": "requires_payment_method"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpCardProcessor::new(&card_config(server.uri())).unwrap();
    let intent = client
        .create_payment_intent(2500, Currency::Usd, Default::default())
        .await
        .unwrap();

    assert_eq!(intent.id, "pi_wm_1");
    assert_eq!(intent.client_secret, "pi_wm_1_secret");
}

#[tokio::test]
async fn card_client_maps_processor_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = HttpCardProcessor::new(&card_config(server.uri())).unwrap();
    let err = client
        .create_payment_intent(100, Currency::Usd, Default::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::ProcessorError(_)));
}

#[tokio::test]
async fn wallet_client_reuses_the_cached_token() {
    let server = MockServer::start().await;

    // The token endpoint must be hit exactly once across two API calls.
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok_wm_1",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "W-ORD-wm",
            "status": "CREATED",
            "approval_url": "https://wallet.example/approve/W-ORD-wm"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = HttpWalletProcessor::new(&wallet_config(server.uri())).unwrap();
    for _ in 0..2 {
        let order = client
            .create_order(
                1000,
                Currency::Usd,
                Default::default(),
                "https://diehard.community/checkout/return",
                "https://diehard.community/checkout/cancel",
            )
            .await
            .unwrap();
        assert_eq!(order.id, "W-ORD-wm");
    }
}

#[tokio::test]
async fn wallet_client_captures_orders() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok_wm_2",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/W-ORD-9/capture"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "COMPLETED",
            "capture_id": "CAP-9"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpWalletProcessor::new(&wallet_config(server.uri())).unwrap();
    let capture = client.capture_order("W-ORD-9").await.unwrap();
    assert_eq!(capture.status, "COMPLETED");
    assert_eq!(capture.capture_id, "CAP-9");
}
