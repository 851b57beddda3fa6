//! Checkout and order history.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::api::extract::AuthUser;
use crate::app::AppState;
use crate::domain::{
    AppError, CheckoutRequest, ErrorResponse, Order, OrderListQuery, PaginatedResponse,
};

/// Turn the cart into an order
#[utoipa::path(
    post,
    path = "/api/v1/orders/checkout",
    tag = "orders",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = Order),
        (status = 400, description = "Cart is empty", body = ErrorResponse),
        (status = 404, description = "Address not found", body = ErrorResponse),
        (status = 409, description = "A product ran out of stock", body = ErrorResponse)
    )
)]
pub async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state.orders.checkout(caller.id, &payload).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// The caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "orders",
    params(
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("page" = Option<u32>, Query, description = "1-based page (default 1)"),
        ("per_page" = Option<u32>, Query, description = "Page size 1-100 (default 20)")
    ),
    responses(
        (status = 200, description = "Orders", body = PaginatedResponse<Order>)
    )
)]
pub async fn list_orders_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<PaginatedResponse<Order>>, AppError> {
    Ok(Json(state.orders.list_for_user(caller.id, &query).await?))
}

/// One order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order", body = Order),
        (status = 404, description = "Order not found", body = ErrorResponse)
    )
)]
pub async fn get_order_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.get(caller, id).await?))
}

/// Cancel a pending order and release its stock
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled", body = Order),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order is no longer pending", body = ErrorResponse)
    )
)]
pub async fn cancel_order_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.cancel(caller, id).await?))
}
