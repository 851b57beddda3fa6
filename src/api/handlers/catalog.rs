//! Product catalog endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::api::extract::{AdminUser, MaybeUser};
use crate::app::AppState;
use crate::domain::{
    AppError, CreateProductRequest, ErrorResponse, PaginatedResponse, Product, ProductQuery,
    StockAdjustmentRequest, UpdateProductRequest,
};

/// Browse active products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    tag = "products",
    params(
        ("search" = Option<String>, Query, description = "Case-insensitive match on name or description"),
        ("category" = Option<String>, Query, description = "Exact category"),
        ("min_price" = Option<i64>, Query, description = "Minimum price in cents"),
        ("max_price" = Option<i64>, Query, description = "Maximum price in cents"),
        ("sort" = Option<String>, Query, description = "newest | price_asc | price_desc | rating | name"),
        ("page" = Option<u32>, Query, description = "1-based page (default 1)"),
        ("per_page" = Option<u32>, Query, description = "Page size 1-100 (default 20)")
    ),
    responses(
        (status = 200, description = "Products", body = PaginatedResponse<Product>),
        (status = 400, description = "Invalid filters", body = ErrorResponse)
    )
)]
pub async fn list_products_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<PaginatedResponse<Product>>, AppError> {
    Ok(Json(state.catalog.list(&query).await?))
}

/// Distinct categories of active products
#[utoipa::path(
    get,
    path = "/api/v1/products/categories",
    tag = "products",
    responses(
        (status = 200, description = "Category names", body = Vec<String>)
    )
)]
pub async fn list_categories_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.catalog.categories().await?))
}

/// A single product; admins also see deactivated products
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product", body = Product),
        (status = 404, description = "Product not found", body = ErrorResponse)
    )
)]
pub async fn get_product_handler(
    State(state): State<Arc<AppState>>,
    MaybeUser(caller): MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    let include_inactive = caller.is_some_and(|c| c.is_admin());
    Ok(Json(state.catalog.get(id, include_inactive).await?))
}

/// Create a product
#[utoipa::path(
    post,
    path = "/api/v1/products",
    tag = "products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 403, description = "Admin only", body = ErrorResponse),
        (status = 409, description = "SKU already exists", body = ErrorResponse)
    )
)]
pub async fn create_product_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = state.catalog.create(&payload).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Partially update a product
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = Product),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse)
    )
)]
pub async fn update_product_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.update(id, &payload).await?))
}

/// Deactivate a product
#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Product deactivated"),
        (status = 404, description = "Product not found", body = ErrorResponse)
    )
)]
pub async fn delete_product_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Apply a signed stock adjustment
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/stock",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = StockAdjustmentRequest,
    responses(
        (status = 200, description = "Stock adjusted", body = Product),
        (status = 400, description = "Stock would go negative", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse)
    )
)]
pub async fn adjust_stock_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StockAdjustmentRequest>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.adjust_stock(id, payload.delta).await?))
}
