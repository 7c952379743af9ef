//! Payment route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::payments;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/payments/webhook", post(payments::payment_webhook))
        .route("/payments/:id", get(payments::get_payment))
        .route("/payments/:id/initialize", post(payments::initialize_payment))
        .route("/payments/:id/release-escrow", post(payments::release_escrow))
        .route("/payments/:id/refund", post(payments::refund_payment))
}
