//! Back-office endpoints. Every handler requires the admin role.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::api::extract::AdminUser;
use crate::app::AppState;
use crate::domain::{
    AnalyticsSummary, AppError, DailySales, ErrorResponse, Order, OrderListQuery,
    PaginatedResponse, SalesQuery, SetActiveRequest, SetRoleRequest, TopProduct,
    TopProductsQuery, UpdateOrderStatusRequest, UserDto, UserListQuery,
};

/// Search users
#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    tag = "admin",
    params(
        ("search" = Option<String>, Query, description = "Case-insensitive match on email or display name"),
        ("page" = Option<u32>, Query, description = "1-based page (default 1)"),
        ("per_page" = Option<u32>, Query, description = "Page size 1-100 (default 20)")
    ),
    responses(
        (status = 200, description = "Users", body = PaginatedResponse<UserDto>),
        (status = 403, description = "Admin only", body = ErrorResponse)
    )
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<PaginatedResponse<UserDto>>, AppError> {
    Ok(Json(state.admin.list_users(&query).await?))
}

/// One user
#[utoipa::path(
    get,
    path = "/api/v1/admin/users/{id}",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserDto),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserDto>, AppError> {
    Ok(Json(state.admin.get_user(id).await?))
}

/// Change a user's role
#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}/role",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SetRoleRequest,
    responses(
        (status = 200, description = "User updated", body = UserDto),
        (status = 400, description = "Cannot change your own role", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn set_role_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<UserDto>, AppError> {
    Ok(Json(state.admin.set_role(admin, id, payload.role).await?))
}

/// Activate or deactivate a user
#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}/active",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SetActiveRequest,
    responses(
        (status = 200, description = "User updated", body = UserDto),
        (status = 400, description = "Cannot deactivate yourself", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn set_active_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<UserDto>, AppError> {
    Ok(Json(
        state.admin.set_active(admin, id, payload.is_active).await?,
    ))
}

/// All orders, optionally by status
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    tag = "admin",
    params(
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("page" = Option<u32>, Query, description = "1-based page (default 1)"),
        ("per_page" = Option<u32>, Query, description = "Page size 1-100 (default 20)")
    ),
    responses(
        (status = 200, description = "Orders", body = PaginatedResponse<Order>)
    )
)]
pub async fn admin_list_orders_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<PaginatedResponse<Order>>, AppError> {
    Ok(Json(state.orders.admin_list(&query).await?))
}

/// Move an order through its lifecycle
#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order updated", body = Order),
        (status = 400, description = "Tracking number required", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse)
    )
)]
pub async fn update_order_status_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.admin_update_status(id, &payload).await?))
}

/// Store-wide totals
#[utoipa::path(
    get,
    path = "/api/v1/admin/analytics/summary",
    tag = "analytics",
    responses(
        (status = 200, description = "Summary", body = AnalyticsSummary)
    )
)]
pub async fn analytics_summary_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<AnalyticsSummary>, AppError> {
    Ok(Json(state.analytics.summary().await?))
}

/// Best sellers by quantity
#[utoipa::path(
    get,
    path = "/api/v1/admin/analytics/top-products",
    tag = "analytics",
    params(("limit" = Option<u32>, Query, description = "1-50, default 5")),
    responses(
        (status = 200, description = "Top products", body = Vec<TopProduct>),
        (status = 400, description = "Limit out of range", body = ErrorResponse)
    )
)]
pub async fn top_products_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<TopProductsQuery>,
) -> Result<Json<Vec<TopProduct>>, AppError> {
    Ok(Json(state.analytics.top_products(&query).await?))
}

/// Daily order count and revenue
#[utoipa::path(
    get,
    path = "/api/v1/admin/analytics/sales",
    tag = "analytics",
    params(("days" = Option<u32>, Query, description = "1-90, default 30")),
    responses(
        (status = 200, description = "Sales per day", body = Vec<DailySales>),
        (status = 400, description = "Days out of range", body = ErrorResponse)
    )
)]
pub async fn sales_by_day_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<SalesQuery>,
) -> Result<Json<Vec<DailySales>>, AppError> {
    Ok(Json(state.analytics.sales_by_day(&query).await?))
}
