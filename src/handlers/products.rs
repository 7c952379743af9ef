//! Product catalog handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::{AuthenticatedUser, FarmerUser, OptionalUser};
use crate::catalog::{CreateProductRequest, ListProductsQuery, Product, UpdateProductRequest};
use crate::error::ApiError;
use crate::models::ApiResponse;
use crate::state::AppState;

/// GET /products
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<ApiResponse<Vec<Product>>>, ApiError> {
    let (products, pagination) = state.catalog_service.get_products(&query).await?;

    Ok(Json(ApiResponse::paginated(
        "Products retrieved successfully",
        products,
        pagination,
    )))
}

/// POST /products
pub async fn create_product(
    State(state): State<AppState>,
    FarmerUser(farmer): FarmerUser,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>), ApiError> {
    req.validate()?;

    let product = state
        .catalog_service
        .create_product(farmer.user_id, req)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Product created successfully", product)),
    ))
}

/// GET /products/:id
pub async fn get_product(
    State(state): State<AppState>,
    OptionalUser(viewer): OptionalUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    let viewer_id = viewer.map(|user| user.user_id);
    let product = state.catalog_service.get_product(id, viewer_id).await?;
    Ok(Json(ApiResponse::ok("Product retrieved successfully", product)))
}

/// PUT /products/:id
pub async fn update_product(
    State(state): State<AppState>,
    FarmerUser(farmer): FarmerUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    req.validate()?;

    let product = state
        .catalog_service
        .update_product(id, farmer.user_id, req)
        .await?;

    Ok(Json(ApiResponse::ok("Product updated successfully", product)))
}

/// DELETE /products/:id - soft delete by the owner or an admin
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state
        .catalog_service
        .delete_product(id, user.user_id, user.is_admin())
        .await?;

    Ok(Json(ApiResponse::message("Product deleted successfully")))
}
