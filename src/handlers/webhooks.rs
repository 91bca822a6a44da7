use axum::{extract::State, http::HeaderMap, response::IntoResponse, routing::post, Router};
use bytes::Bytes;
use tracing::info;

use crate::{errors::ServiceError, services::webhooks::WebhookAck, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/card", post(card_webhook))
        .route("/wallet", post(wallet_webhook))
}

// POST /api/v1/webhooks/card
//
// The raw body must reach signature verification unmodified, so the handler
// takes `Bytes` rather than a typed extractor.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/card",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted (possibly a duplicate or unhandled kind)"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Malformed payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn card_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let ack = state
        .services
        .webhooks
        .handle_card_event(&headers, &body)
        .await?;
    if ack == WebhookAck::Duplicate {
        info!("duplicate card webhook acknowledged");
    }
    Ok((axum::http::StatusCode::OK, "ok"))
}

// POST /api/v1/webhooks/wallet
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/wallet",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted (possibly a duplicate or unhandled kind)"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Malformed payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn wallet_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let ack = state
        .services
        .webhooks
        .handle_wallet_event(&headers, &body)
        .await?;
    if ack == WebhookAck::Duplicate {
        info!("duplicate wallet webhook acknowledged");
    }
    Ok((axum::http::StatusCode::OK, "ok"))
}
