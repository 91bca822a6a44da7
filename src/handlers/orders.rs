use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::{success_response, PaginatedResponse},
    models::order::{
        Currency, DigitalDeliveryStatus, FulfillmentStatus, Money, Order, OrderItem, PaymentRail,
        PaymentStatus, ShippingMethod,
    },
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/capture", post(capture_order))
        .route("/:id/cancel-payment", post(cancel_payment))
        .route("/:id/refund", post(refund_order))
        .route("/:id/ship", post(ship_order))
        .route("/:id/deliver", post(deliver_order))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommissionView {
    pub rate: Decimal,
    pub commission_amount: Money,
    pub seller_payout: Money,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<Uuid>,
    pub rail: PaymentRail,
    pub currency: Currency,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<CommissionView>,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digital_delivery: Option<DigitalDeliveryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_method: Option<ShippingMethod>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let seller_id = order.kind.seller_id();
        let commission = order.kind.commission().map(|c| CommissionView {
            rate: c.rate,
            commission_amount: c.commission_amount,
            seller_payout: c.seller_payout,
        });
        Self {
            id: order.id,
            order_number: order.order_number,
            buyer_id: order.buyer_id,
            seller_id,
            rail: order.rail.rail(),
            currency: order.currency,
            items: order.items,
            subtotal: order.subtotal,
            shipping: order.shipping,
            tax: order.tax,
            total: order.total,
            commission,
            payment_status: order.payment_status,
            fulfillment_status: order.fulfillment_status,
            digital_delivery: order.digital_delivery,
            shipping_method: order.shipping_method,
            created_at: order.created_at,
            paid_at: order.paid_at,
            shipped_at: order.shipped_at,
            delivered_at: order.delivered_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderListQuery {
    pub buyer_id: Uuid,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

// GET /api/v1/orders?buyer_id=...
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders for the buyer, newest first")
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, 100);

    let (orders, total) = state
        .services
        .orders
        .list_for_buyer(query.buyer_id, page, per_page)
        .await?;

    let items: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(success_response(PaginatedResponse::new(
        items, page, per_page, total,
    )))
}

// GET /api/v1/orders/:id
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "The order", body = OrderResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get(id).await?;
    Ok(success_response(OrderResponse::from(order)))
}

// POST /api/v1/orders/:id/capture
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/capture",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Capture applied (or already settled)", body = OrderResponse),
        (status = 400, description = "Order is not awaiting wallet capture", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn capture_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.capture_wallet(id).await?;
    Ok(success_response(OrderResponse::from(order)))
}

// POST /api/v1/orders/:id/cancel-payment
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel-payment",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Intent cancelled, order failed", body = OrderResponse),
        (status = 400, description = "Order cannot be cancelled", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.cancel_card_payment(id).await?;
    Ok(success_response(OrderResponse::from(order)))
}

// POST /api/v1/orders/:id/ship
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/ship",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order marked shipped", body = OrderResponse),
        (status = 400, description = "Order cannot ship", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn ship_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.mark_shipped(id).await?;
    Ok(success_response(OrderResponse::from(order)))
}

// POST /api/v1/orders/:id/deliver
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/deliver",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order marked delivered", body = OrderResponse),
        (status = 400, description = "Order has not shipped", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn deliver_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.mark_delivered(id).await?;
    Ok(success_response(OrderResponse::from(order)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Minor-unit amount to refund; omit for a full refund
    pub amount: Option<Money>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefundResponse {
    pub refund_ref: String,
}

// POST /api/v1/orders/:id/refund
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/refund",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund initiated at the processor", body = RefundResponse),
        (status = 400, description = "Order cannot be refunded", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn refund_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let refund_ref = state.services.orders.refund(id, payload.amount).await?;
    Ok(success_response(RefundResponse { refund_ref }))
}
