//! Review handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::{ApiResponse, PaginationParams};
use crate::reviews::{CreateReviewRequest, Review, ReviewWithReviewer, UpdateReviewRequest};
use crate::state::AppState;

/// POST /reviews
pub async fn create_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Review>>), ApiError> {
    req.validate()?;

    let review = state.review_service.create_review(&user, req).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Review submitted", review)),
    ))
}

/// GET /reviews/user/:id
pub async fn list_user_reviews(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<Vec<ReviewWithReviewer>>>, ApiError> {
    let (reviews, pagination) = state
        .review_service
        .list_for_user(user_id, params.window())
        .await?;

    Ok(Json(ApiResponse::paginated("Reviews retrieved", reviews, pagination)))
}

/// GET /reviews/product/:id
pub async fn list_product_reviews(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<Vec<ReviewWithReviewer>>>, ApiError> {
    let (reviews, pagination) = state
        .review_service
        .list_for_product(product_id, params.window())
        .await?;

    Ok(Json(ApiResponse::paginated("Reviews retrieved", reviews, pagination)))
}

/// PUT /reviews/:id
pub async fn update_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateReviewRequest>,
) -> Result<Json<ApiResponse<Review>>, ApiError> {
    req.validate()?;

    let review = state.review_service.update_review(id, &user, req).await?;
    Ok(Json(ApiResponse::ok("Review updated", review)))
}

/// DELETE /reviews/:id
pub async fn delete_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.review_service.delete_review(id, &user).await?;
    Ok(Json(ApiResponse::message("Review deleted")))
}
