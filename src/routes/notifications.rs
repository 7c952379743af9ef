//! Notification route definitions

use axum::{
    routing::{delete, get, patch},
    Router,
};

use crate::handlers::notifications;
use crate::state::AppState;

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", patch(notifications::mark_all_read))
        .route("/notifications/:id/read", patch(notifications::mark_read))
        .route("/notifications/:id", delete(notifications::delete_notification))
}
