//! Order route definitions

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::orders;
use crate::state::AppState;

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", patch(orders::update_order_status))
        .route("/orders/:id/negotiate", post(orders::negotiate_price))
}
