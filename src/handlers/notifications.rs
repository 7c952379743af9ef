//! Notification handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use super::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::ApiResponse;
use crate::notifications::{ListNotificationsQuery, Notification, NotificationListResponse};
use crate::state::AppState;

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<ApiResponse<NotificationListResponse>>, ApiError> {
    let (list, pagination) = state
        .notification_service
        .list(user.user_id, &query)
        .await?;

    Ok(Json(ApiResponse::paginated(
        "Notifications retrieved",
        list,
        pagination,
    )))
}

/// PATCH /notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Notification>>, ApiError> {
    let notification = state
        .notification_service
        .mark_read(id, user.user_id)
        .await?;

    Ok(Json(ApiResponse::ok("Notification marked as read", notification)))
}

/// PATCH /notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let marked = state.notification_service.mark_all_read(user.user_id).await?;

    Ok(Json(ApiResponse::ok(
        "All notifications marked as read",
        serde_json::json!({ "marked": marked }),
    )))
}

/// DELETE /notifications/:id
pub async fn delete_notification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.notification_service.delete(id, user.user_id).await?;
    Ok(Json(ApiResponse::message("Notification deleted")))
}
