//! DieHard Community API
//!
//! Commerce backend for the DieHard community platform: order creation across
//! three payment rails, webhook-driven settlement, variant-level inventory,
//! the DieHard Dollar point ledger, and marketplace commissions.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod commission;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod payments;
pub mod services;
pub mod store;

use axum::Router;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub stores: store::Stores,
    pub services: services::AppServices,
    pub event_sender: events::EventSender,
}

/// Full router: health probe plus the versioned API.
pub fn app_router() -> Router<AppState> {
    Router::new()
        .merge(handlers::health::routes())
        .nest("/api/v1", handlers::api_v1_routes())
}
