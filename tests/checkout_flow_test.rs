//! Checkout and internal-ledger settlement flows: validation failures, the
//! synchronous points rail, and the rollback guarantees around it.

mod common;

use axum::http::StatusCode;
use common::{digital_product, marketplace_listing, shop_product, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

fn checkout_body(buyer: Uuid, product: Uuid, quantity: i64, rail: &str) -> Value {
    json!({
        "buyer_id": buyer.to_string(),
        "lines": [{ "product_id": product.to_string(), "quantity": quantity }],
        "rail": rail,
    })
}

#[tokio::test]
async fn points_marketplace_purchase_settles_synchronously() {
    let app = TestApp::new();
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    app.seed_points(buyer, 5_000).await;
    let address = app.seed_address(buyer).await;
    let listing = app
        .seed_product(marketplace_listing(seller, "Signed jersey", 1_000, 3))
        .await;

    let mut body = checkout_body(buyer, listing, 1, "points");
    body["shipping_address_id"] = json!(address.to_string());

    let (status, response) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, StatusCode::CREATED, "{}", response);
    assert_eq!(response["status"], "purchase_complete");
    assert_eq!(response["order"]["payment_status"], "paid");
    assert_eq!(response["order"]["total"], 1_000);
    assert_eq!(response["order"]["seller_id"], seller.to_string());
    // 5% internal-currency commission: 950 to the seller, 50 to the platform
    assert_eq!(response["order"]["commission"]["seller_payout"], 950);
    assert_eq!(response["order"]["commission"]["commission_amount"], 50);

    assert_eq!(app.balance(buyer).await, 4_000);
    assert_eq!(app.balance(seller).await, 950);

    let product = app.product(listing).await;
    assert_eq!(product.inventory.available, 2);
    assert_eq!(product.inventory.sold, 1);
}

#[tokio::test]
async fn insufficient_balance_leaves_no_order_behind() {
    let app = TestApp::new();
    let buyer = Uuid::new_v4();

    app.seed_points(buyer, 500).await;
    let product = app.seed_product(digital_product("Avatar frame", 1_000, 10)).await;

    let (status, response) = app
        .post_json(
            "/api/v1/checkout",
            checkout_body(buyer, product, 1, "points"),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response["code"], "insufficient_balance");
    assert_eq!(response["details"]["required"], 1_000);
    assert_eq!(response["details"]["current"], 500);

    // No order persists, no stock moved, no points moved.
    let (_, orders) = app
        .get_json(&format!("/api/v1/orders?buyer_id={}", buyer))
        .await;
    assert_eq!(orders["total"], 0);
    let product = app.product(product).await;
    assert_eq!(product.inventory.available, 10);
    assert_eq!(product.inventory.sold, 0);
    assert_eq!(app.balance(buyer).await, 500);
}

#[tokio::test]
async fn digital_purchase_is_delivered_immediately() {
    let app = TestApp::new();
    let buyer = Uuid::new_v4();

    app.seed_points(buyer, 2_000).await;
    let product = app.seed_product(digital_product("Emote bundle", 750, 100)).await;

    let (status, response) = app
        .post_json(
            "/api/v1/checkout",
            checkout_body(buyer, product, 1, "points"),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(response["order"]["digital_delivery"], "delivered");
    // Digital-only orders never ship
    assert_eq!(response["order"]["shipping"], 0);
    assert!(response["order"]["shipping_method"].is_null());
}

#[tokio::test]
async fn self_purchase_is_rejected() {
    let app = TestApp::new();
    let seller = Uuid::new_v4();

    app.seed_points(seller, 10_000).await;
    let address = app.seed_address(seller).await;
    let listing = app
        .seed_product(marketplace_listing(seller, "My own listing", 1_000, 1))
        .await;

    let mut body = checkout_body(seller, listing, 1, "points");
    body["shipping_address_id"] = json!(address.to_string());

    let (status, response) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "self_purchase");
}

#[tokio::test]
async fn rail_must_be_accepted_by_the_listing() {
    let app = TestApp::new();
    let buyer = Uuid::new_v4();

    // Points-only listing bought over the card rail
    let product = app.seed_product(digital_product("Points-only item", 500, 5)).await;

    let (status, response) = app
        .post_json("/api/v1/checkout", checkout_body(buyer, product, 1, "card"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "payment_method_not_accepted");
}

#[tokio::test]
async fn physical_items_require_an_owned_address() {
    let app = TestApp::new();
    let buyer = Uuid::new_v4();
    let someone_else = Uuid::new_v4();

    let product = app.seed_product(shop_product("Poster", 1_500, 5)).await;

    // Missing address
    let (status, response) = app
        .post_json("/api/v1/checkout", checkout_body(buyer, product, 1, "card"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "shipping_address_required");

    // Address owned by a different user
    let foreign_address = app.seed_address(someone_else).await;
    let mut body = checkout_body(buyer, product, 1, "card");
    body["shipping_address_id"] = json!(foreign_address.to_string());
    let (status, response) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "shipping_address_required");
}

#[tokio::test]
async fn oversized_quantity_is_out_of_stock() {
    let app = TestApp::new();
    let buyer = Uuid::new_v4();
    app.seed_points(buyer, 100_000).await;

    let product = app.seed_product(digital_product("Scarce drop", 100, 2)).await;

    let (status, response) = app
        .post_json(
            "/api/v1/checkout",
            checkout_body(buyer, product, 3, "points"),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response["code"], "out_of_stock");
}

#[tokio::test]
async fn unknown_product_is_listing_unavailable() {
    let app = TestApp::new();
    let buyer = Uuid::new_v4();

    let (status, response) = app
        .post_json(
            "/api/v1/checkout",
            checkout_body(buyer, Uuid::new_v4(), 1, "points"),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response["code"], "listing_unavailable");
}

#[tokio::test]
async fn unlimited_stock_skips_the_quantity_check() {
    let app = TestApp::new();
    let buyer = Uuid::new_v4();
    app.seed_points(buyer, 50_000).await;

    let product = app
        .seed_product(digital_product("Unlimited emote", 100, -1))
        .await;

    let (status, response) = app
        .post_json(
            "/api/v1/checkout",
            checkout_body(buyer, product, 40, "points"),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", response);

    let product = app.product(product).await;
    assert!(product.inventory.is_unlimited());
    assert_eq!(product.inventory.sold, 40);
}

#[tokio::test]
async fn card_checkout_returns_continuation_and_stays_pending() {
    let app = TestApp::new();
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer).await;

    let product = app.seed_product(shop_product("Tour tee", 2_000, 10)).await;

    let mut body = checkout_body(buyer, product, 2, "card");
    body["shipping_address_id"] = json!(address.to_string());
    body["shipping_method"] = json!("express");

    let (status, response) = app.post_json("/api/v1/checkout", body).await;
    assert_eq!(status, StatusCode::CREATED, "{}", response);
    assert_eq!(response["status"], "requires_payment");
    assert_eq!(response["order"]["payment_status"], "pending");
    // 2 x 2000 + 2500 express shipping
    assert_eq!(response["order"]["total"], 6_500);
    assert_eq!(response["continuation"]["type"], "card_intent");
    assert!(response["continuation"]["client_secret"]
        .as_str()
        .unwrap()
        .contains("secret"));

    // No settlement side effects yet
    let product = app.product(product).await;
    assert_eq!(product.inventory.available, 10);
    assert_eq!(product.inventory.sold, 0);
}

#[tokio::test]
async fn wallet_checkout_returns_approval_link() {
    let app = TestApp::new();
    let buyer = Uuid::new_v4();
    let product = app
        .seed_product({
            let mut p = shop_product("Sticker pack", 500, 10);
            p.is_digital = true;
            p
        })
        .await;

    let (status, response) = app
        .post_json(
            "/api/v1/checkout",
            checkout_body(buyer, product, 1, "wallet"),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", response);
    assert_eq!(response["continuation"]["type"], "wallet_approval");
    assert!(response["continuation"]["approval_url"]
        .as_str()
        .unwrap()
        .starts_with("https://wallet.invalid/approve/"));
}

#[tokio::test]
async fn processor_failure_leaves_a_retryable_pending_order() {
    let app = TestApp::new();
    let buyer = Uuid::new_v4();
    let product = app.seed_product(digital_product("Badge", 0, 5)).await;

    // Listing accepts USD too
    let mut listing = app.product(product).await;
    listing.price_usd = Some(900);
    app.seed_product(listing).await;

    app.card
        .fail_next_create
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let (status, response) = app
        .post_json("/api/v1/checkout", checkout_body(buyer, product, 1, "card"))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(response["code"], "processor_error");

    // The pending order survives with no external reference and no side
    // effects; the buyer can retry from it.
    let (_, orders) = app
        .get_json(&format!("/api/v1/orders?buyer_id={}", buyer))
        .await;
    assert_eq!(orders["total"], 1);
    assert_eq!(orders["items"][0]["payment_status"], "pending");
}
