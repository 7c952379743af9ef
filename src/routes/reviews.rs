//! Review route definitions

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::reviews;
use crate::state::AppState;

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/reviews", post(reviews::create_review))
        .route("/reviews/user/:id", get(reviews::list_user_reviews))
        .route("/reviews/product/:id", get(reviews::list_product_reviews))
        .route(
            "/reviews/:id",
            put(reviews::update_review).delete(reviews::delete_review),
        )
}
