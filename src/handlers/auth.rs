//! Authentication HTTP handlers
//!
//! OTP issuance and verification, registration, password login and session
//! management.

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use super::{AuthenticatedUser, OptionalUser};
use crate::error::ApiError;
use crate::models::{
    ApiResponse, AuthTokensResponse, ChangePasswordRequest, LoginRequest, OtpRequestResponse,
    RefreshTokenRequest, RegisterRequest, RequestOtpRequest, ResetPasswordRequest,
    SetPasswordRequest, UserResponse, VerifyOtpRequest,
};
use crate::state::AppState;

/// POST /auth/otp/request
pub async fn request_otp(
    State(state): State<AppState>,
    Json(req): Json<RequestOtpRequest>,
) -> Result<Json<ApiResponse<OtpRequestResponse>>, ApiError> {
    req.validate()?;

    let response = state
        .auth_service
        .request_otp(&req.phone_number, req.purpose)
        .await?;

    Ok(Json(ApiResponse::ok("OTP sent successfully", response)))
}

/// POST /auth/otp/verify
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<ApiResponse<AuthTokensResponse>>, ApiError> {
    req.validate()?;

    let tokens = state
        .auth_service
        .verify_otp(&req.phone_number, &req.code, req.purpose)
        .await?;

    Ok(Json(ApiResponse::ok("OTP verified successfully", tokens)))
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    OptionalUser(caller): OptionalUser,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthTokensResponse>>), ApiError> {
    req.validate()?;

    let signed_in_phone = caller.as_ref().map(|user| user.phone_number.as_str());
    let tokens = state.auth_service.register(req, signed_in_phone).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Registration successful", tokens)),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthTokensResponse>>, ApiError> {
    req.validate()?;

    let tokens = state
        .auth_service
        .login(&req.phone_number, &req.password)
        .await?;

    Ok(Json(ApiResponse::ok("Login successful", tokens)))
}

/// POST /auth/refresh - rotate the refresh token
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<ApiResponse<AuthTokensResponse>>, ApiError> {
    req.validate()?;

    let tokens = state.auth_service.refresh(&req.refresh_token).await?;

    Ok(Json(ApiResponse::ok("Token refreshed successfully", tokens)))
}

/// POST /auth/logout - revoke one refresh token
pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    req.validate()?;

    state.auth_service.logout(&req.refresh_token).await?;

    Ok(Json(ApiResponse::message("Logged out successfully")))
}

/// POST /auth/logout-all - revoke every session of the caller
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let revoked = state.auth_service.logout_all(user.user_id).await?;

    Ok(Json(ApiResponse::ok(
        "Logged out from all devices",
        serde_json::json!({ "sessionsRevoked": revoked }),
    )))
}

/// POST /auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    req.validate()?;

    state
        .auth_service
        .change_password(user.user_id, &req.current_password, &req.new_password)
        .await?;

    Ok(Json(ApiResponse::message(
        "Password changed successfully. Please log in again",
    )))
}

/// POST /auth/set-password - first password for an OTP-only account
pub async fn set_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<SetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    req.validate()?;

    state
        .auth_service
        .set_password(user.user_id, &req.password)
        .await?;

    Ok(Json(ApiResponse::message("Password set successfully")))
}

/// POST /auth/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    req.validate()?;

    state
        .auth_service
        .reset_password(&req.phone_number, &req.code, &req.new_password)
        .await?;

    Ok(Json(ApiResponse::message("Password reset successfully")))
}

/// GET /auth/me
pub async fn get_current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = state.user_service.get_me(user.user_id).await?;

    Ok(Json(ApiResponse::ok("User retrieved successfully", user)))
}
