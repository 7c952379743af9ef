//! User profile handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::{AdminUser, AuthenticatedUser};
use crate::error::ApiError;
use crate::models::{ApiResponse, FarmerProfile, PublicUserResponse, UserResponse};
use crate::state::AppState;
use crate::users::{SetActiveRequest, UpdateProfileRequest, VerificationRequest};

/// GET /users/me
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let me = state.user_service.get_me(user.user_id).await?;
    Ok(Json(ApiResponse::ok("Profile retrieved successfully", me)))
}

/// PUT /users/me
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    req.validate()?;

    let updated = state.user_service.update_profile(user.user_id, req).await?;
    Ok(Json(ApiResponse::ok("Profile updated successfully", updated)))
}

/// GET /users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PublicUserResponse>>, ApiError> {
    let user = state.user_service.get_public_profile(id).await?;
    Ok(Json(ApiResponse::ok("User retrieved successfully", user)))
}

/// PATCH /users/:id/verification
pub async fn set_verification(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<VerificationRequest>,
) -> Result<Json<ApiResponse<FarmerProfile>>, ApiError> {
    let profile = state
        .user_service
        .set_farmer_verification(admin.user_id, id, req.status)
        .await?;

    Ok(Json(ApiResponse::ok("Verification status updated", profile)))
}

/// PATCH /users/:id/status
pub async fn set_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = state
        .user_service
        .set_active(admin.user_id, id, req.is_active)
        .await?;

    let message = if req.is_active {
        "Account activated"
    } else {
        "Account deactivated"
    };
    Ok(Json(ApiResponse::ok(message, user)))
}
