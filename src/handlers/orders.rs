//! Order handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::ApiResponse;
use crate::orders::{
    CreateOrderRequest, ListOrdersQuery, NegotiatePriceRequest, OrderWithDetails,
    UpdateOrderStatusRequest,
};
use crate::state::AppState;

/// POST /orders - one order per farmer in the cart
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<OrderWithDetails>>>), ApiError> {
    req.validate()?;

    let orders = state.order_service.create_order(&user, req).await?;
    let message = if orders.len() == 1 {
        "Order created successfully".to_string()
    } else {
        format!("{} orders created successfully", orders.len())
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message, orders))))
}

/// GET /orders
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ApiResponse<Vec<OrderWithDetails>>>, ApiError> {
    let (orders, pagination) = state.order_service.list_orders(&user, &query).await?;

    Ok(Json(ApiResponse::paginated(
        "Orders retrieved successfully",
        orders,
        pagination,
    )))
}

/// GET /orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderWithDetails>>, ApiError> {
    let order = state.order_service.get_order(id, &user).await?;
    Ok(Json(ApiResponse::ok("Order retrieved successfully", order)))
}

/// PATCH /orders/:id/status
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderWithDetails>>, ApiError> {
    req.validate()?;

    let order = state.order_service.update_status(id, &user, req).await?;
    Ok(Json(ApiResponse::ok("Order status updated", order)))
}

/// POST /orders/:id/negotiate
pub async fn negotiate_price(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<NegotiatePriceRequest>,
) -> Result<Json<ApiResponse<OrderWithDetails>>, ApiError> {
    req.validate()?;

    let order = state.order_service.negotiate_price(id, &user, req).await?;
    Ok(Json(ApiResponse::ok("Price updated", order)))
}
