//! Chat handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::AuthenticatedUser;
use crate::chat::{ChatMessage, Conversation, SendMessageRequest, UnreadCount};
use crate::error::ApiError;
use crate::models::{ApiResponse, PaginationParams};
use crate::state::AppState;

/// GET /chat/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<Vec<Conversation>>>, ApiError> {
    let conversations = state.chat_service.list_conversations(user.user_id).await?;
    Ok(Json(ApiResponse::ok("Conversations retrieved", conversations)))
}

/// GET /chat/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<UnreadCount>>, ApiError> {
    let count = state.chat_service.unread_count(user.user_id).await?;
    Ok(Json(ApiResponse::ok("Unread count retrieved", UnreadCount { count })))
}

/// GET /chat/:userId
pub async fn get_messages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(other_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<Vec<ChatMessage>>>, ApiError> {
    let (messages, pagination) = state
        .chat_service
        .get_messages(user.user_id, other_id, params.window())
        .await?;

    Ok(Json(ApiResponse::paginated(
        "Messages retrieved",
        messages,
        pagination,
    )))
}

/// POST /chat/messages
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ChatMessage>>), ApiError> {
    req.validate()?;

    let message = state.chat_service.send_message(user.user_id, req).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Message sent", message))))
}

/// PATCH /chat/:userId/read
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(other_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let marked = state.chat_service.mark_read(user.user_id, other_id).await?;

    Ok(Json(ApiResponse::ok(
        "Messages marked as read",
        serde_json::json!({ "marked": marked }),
    )))
}
