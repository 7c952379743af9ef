//! Route definitions for the AgriLink API

mod auth;
mod chat;
mod notifications;
mod orders;
mod payments;
mod products;
mod reviews;
mod users;

use axum::{routing::get, Router};

use crate::handlers;
use crate::state::AppState;
use crate::websocket;

pub use auth::auth_routes;
pub use chat::chat_routes;
pub use notifications::notification_routes;
pub use orders::order_routes;
pub use payments::payment_routes;
pub use products::product_routes;
pub use reviews::review_routes;
pub use users::user_routes;

/// Everything served under `/api/v1`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ws", get(websocket::ws_handler))
        .merge(auth_routes())
        .merge(user_routes())
        .merge(product_routes())
        .merge(order_routes())
        .merge(payment_routes())
        .merge(chat_routes())
        .merge(notification_routes())
        .merge(review_routes())
}
