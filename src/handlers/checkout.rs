use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    errors::ServiceError,
    handlers::{common::created_response, orders::OrderResponse},
    payments::{CheckoutOutcome, PaymentContinuation},
    services::checkout::CheckoutRequest,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(checkout))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    /// `purchase_complete` or `requires_payment`
    pub status: &'static str,
    pub order: OrderResponse,
    /// Present when the payment continues on a processor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation: Option<PaymentContinuation>,
}

// POST /api/v1/checkout
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created; settled or awaiting payment", body = CheckoutResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Listing unavailable, out of stock, or insufficient balance", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.checkout.checkout(payload).await?;

    let response = match outcome {
        CheckoutOutcome::PurchaseComplete { order } => CheckoutResponse {
            status: "purchase_complete",
            order: OrderResponse::from(order),
            continuation: None,
        },
        CheckoutOutcome::RequiresPayment {
            order,
            continuation,
        } => CheckoutResponse {
            status: "requires_payment",
            order: OrderResponse::from(order),
            continuation: Some(continuation),
        },
    };
    Ok(created_response(response))
}
