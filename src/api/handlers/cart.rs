use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::api::extract::AuthUser;
use crate::app::AppState;
use crate::domain::{
    AddCartItemRequest, AppError, CartDto, ErrorResponse, UpdateCartItemRequest,
};

/// The caller's cart
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    tag = "cart",
    responses(
        (status = 200, description = "Cart contents", body = CartDto),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    )
)]
pub async fn get_cart_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<CartDto>, AppError> {
    Ok(Json(state.cart.get_cart(caller.id).await?))
}

/// Add a product, merging with an existing line
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    tag = "cart",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartDto),
        (status = 400, description = "Quantity out of range", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse),
        (status = 409, description = "Not enough stock", body = ErrorResponse)
    )
)]
pub async fn add_cart_item_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<AddCartItemRequest>,
) -> Result<Json<CartDto>, AppError> {
    Ok(Json(state.cart.add_item(caller.id, &payload).await?))
}

/// Set a line's quantity; zero removes it
#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{product_id}",
    tag = "cart",
    params(("product_id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartDto),
        (status = 404, description = "Item not in cart", body = ErrorResponse),
        (status = 409, description = "Not enough stock", body = ErrorResponse)
    )
)]
pub async fn update_cart_item_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<Json<CartDto>, AppError> {
    Ok(Json(
        state.cart.update_item(caller.id, product_id, &payload).await?,
    ))
}

/// Remove a line
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{product_id}",
    tag = "cart",
    params(("product_id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Updated cart", body = CartDto)
    )
)]
pub async fn remove_cart_item_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<CartDto>, AppError> {
    Ok(Json(state.cart.remove_item(caller.id, product_id).await?))
}

/// Empty the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    tag = "cart",
    responses(
        (status = 204, description = "Cart cleared")
    )
)]
pub async fn clear_cart_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<StatusCode, AppError> {
    state.cart.clear(caller.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
