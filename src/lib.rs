//! AgriLink Backend Library
//!
//! Marketplace API connecting farmers and buyers: OTP and password
//! authentication, catalog, multi-vendor orders, escrowed payments, reviews,
//! chat and realtime notifications.

pub mod auth;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod reviews;
pub mod routes;
pub mod state;
pub mod users;
pub mod websocket;

use axum::{routing::get, Router};

use state::AppState;

/// Application router with shared middleware, without CORS
///
/// Production builds hide internal error detail and send HSTS.
pub fn create_app(state: AppState) -> Router {
    let production = state.environment.is_production();

    let mut app = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes())
        .with_state(state);

    if production {
        app = app
            .layer(axum::middleware::from_fn(middleware::redact_internal_errors))
            .layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    app.layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
}
