pub mod checkout;
pub mod coin_packs;
pub mod common;
pub mod health;
pub mod orders;
pub mod webhooks;

use axum::Router;

use crate::AppState;

/// The versioned API surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/checkout", checkout::routes())
        .nest("/orders", orders::routes())
        .nest("/webhooks", webhooks::routes())
        .nest("/coin-packs", coin_packs::routes())
}
