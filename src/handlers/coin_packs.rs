use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::{created_response, success_response},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_coin_packs))
        .route("/:id/purchase", post(purchase_coin_pack))
}

// GET /api/v1/coin-packs
#[utoipa::path(
    get,
    path = "/api/v1/coin-packs",
    responses(
        (status = 200, description = "The coin pack catalog")
    ),
    tag = "CoinPacks"
)]
pub async fn list_coin_packs(State(state): State<AppState>) -> impl IntoResponse {
    success_response(state.services.coin_packs.list())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CoinPackPurchaseRequest {
    pub user_id: Uuid,
}

// POST /api/v1/coin-packs/:id/purchase
#[utoipa::path(
    post,
    path = "/api/v1/coin-packs/{id}/purchase",
    params(("id" = String, Path, description = "Coin pack id")),
    request_body = CoinPackPurchaseRequest,
    responses(
        (status = 201, description = "Card intent created for the pack", body = crate::services::coin_packs::CoinPurchaseInitiated),
        (status = 404, description = "Unknown coin pack", body = crate::errors::ErrorResponse)
    ),
    tag = "CoinPacks"
)]
pub async fn purchase_coin_pack(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CoinPackPurchaseRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let initiated = state
        .services
        .coin_packs
        .purchase(payload.user_id, &id)
        .await?;
    Ok(created_response(initiated))
}
