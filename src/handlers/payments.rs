//! Payment and escrow handlers

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use uuid::Uuid;

use super::{AdminUser, AuthenticatedUser};
use crate::error::ApiError;
use crate::models::ApiResponse;
use crate::payments::{InitializePaymentRequest, Payment, RefundRequest, SIGNATURE_HEADER};
use crate::state::AppState;

/// GET /payments/:id
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    let payment = state.payment_service.get_payment(id, &user).await?;
    Ok(Json(ApiResponse::ok("Payment retrieved successfully", payment)))
}

/// POST /payments/:id/initialize - start checkout
pub async fn initialize_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<InitializePaymentRequest>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    let payment = state
        .payment_service
        .initialize_payment(id, &user, req.method)
        .await?;

    Ok(Json(ApiResponse::ok("Payment initialized", payment)))
}

/// POST /payments/webhook - signed gateway callback
///
/// The signature covers the raw body, so it is read as bytes.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let payment = state
        .payment_service
        .handle_webhook(&body, signature)
        .await?;

    Ok(Json(ApiResponse::ok("Webhook processed", payment)))
}

/// POST /payments/:id/release-escrow
pub async fn release_escrow(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    let payment = state.payment_service.release_escrow(id, &user).await?;
    Ok(Json(ApiResponse::ok("Escrow released to farmer", payment)))
}

/// POST /payments/:id/refund
pub async fn refund_payment(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    req: Option<Json<RefundRequest>>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    let reason = req.and_then(|Json(req)| req.reason);

    let payment = state
        .payment_service
        .refund_payment(id, &admin, reason.as_deref())
        .await?;

    Ok(Json(ApiResponse::ok("Payment refunded", payment)))
}
