use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::api::extract::AuthUser;
use crate::app::AppState;
use crate::domain::{AppError, CartDto, ErrorResponse, WishlistEntry, WishlistRequest};

/// The caller's wishlist
#[utoipa::path(
    get,
    path = "/api/v1/wishlist",
    tag = "wishlist",
    responses(
        (status = 200, description = "Wishlist", body = Vec<WishlistEntry>)
    )
)]
pub async fn list_wishlist_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<WishlistEntry>>, AppError> {
    Ok(Json(state.wishlist.list(caller.id).await?))
}

/// Save a product
#[utoipa::path(
    post,
    path = "/api/v1/wishlist",
    tag = "wishlist",
    request_body = WishlistRequest,
    responses(
        (status = 200, description = "Wishlist", body = Vec<WishlistEntry>),
        (status = 404, description = "Product not found", body = ErrorResponse)
    )
)]
pub async fn add_wishlist_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<WishlistRequest>,
) -> Result<Json<Vec<WishlistEntry>>, AppError> {
    Ok(Json(state.wishlist.add(caller.id, payload.product_id).await?))
}

/// Forget a product
#[utoipa::path(
    delete,
    path = "/api/v1/wishlist/{product_id}",
    tag = "wishlist",
    params(("product_id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Removed")
    )
)]
pub async fn remove_wishlist_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.wishlist.remove(caller.id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Move a saved product into the cart
#[utoipa::path(
    post,
    path = "/api/v1/wishlist/{product_id}/move-to-cart",
    tag = "wishlist",
    params(("product_id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Updated cart", body = CartDto),
        (status = 404, description = "Not on the wishlist", body = ErrorResponse),
        (status = 409, description = "Not enough stock", body = ErrorResponse)
    )
)]
pub async fn move_to_cart_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<CartDto>, AppError> {
    Ok(Json(state.wishlist.move_to_cart(caller.id, product_id).await?))
}
