//! User route definitions

use axum::{
    routing::{get, patch},
    Router,
};

use crate::handlers::users;
use crate::state::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(users::get_me).put(users::update_me))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/verification", patch(users::set_verification))
        .route("/users/:id/status", patch(users::set_status))
}
