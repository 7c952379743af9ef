//! Chat route definitions

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::chat;
use crate::state::AppState;

pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/chat/conversations", get(chat::list_conversations))
        .route("/chat/unread-count", get(chat::unread_count))
        .route("/chat/messages", post(chat::send_message))
        .route("/chat/:user_id", get(chat::get_messages))
        .route("/chat/:user_id/read", patch(chat::mark_read))
}
