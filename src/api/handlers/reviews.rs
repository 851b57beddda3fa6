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
    AppError, ErrorResponse, PaginatedResponse, PaginationParams, Review, ReviewRequest,
};

/// Reviews of a product, newest first
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/reviews",
    tag = "reviews",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        ("page" = Option<u32>, Query, description = "1-based page (default 1)"),
        ("per_page" = Option<u32>, Query, description = "Page size 1-100 (default 20)")
    ),
    responses(
        (status = 200, description = "Reviews", body = PaginatedResponse<Review>),
        (status = 404, description = "Product not found", body = ErrorResponse)
    )
)]
pub async fn list_reviews_handler(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<Review>>, AppError> {
    let page = page.normalized();
    Ok(Json(state.reviews.list_for_product(product_id, &page).await?))
}

/// Review a product (one review per user)
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/reviews",
    tag = "reviews",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = ReviewRequest,
    responses(
        (status = 201, description = "Review created", body = Review),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse),
        (status = 409, description = "Already reviewed", body = ErrorResponse)
    )
)]
pub async fn create_review_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    let review = state.reviews.create(caller.id, product_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// Edit one of your reviews
#[utoipa::path(
    put,
    path = "/api/v1/reviews/{id}",
    tag = "reviews",
    params(("id" = Uuid, Path, description = "Review ID")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Review updated", body = Review),
        (status = 403, description = "Not your review", body = ErrorResponse),
        (status = 404, description = "Review not found", body = ErrorResponse)
    )
)]
pub async fn update_review_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(review_id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<Review>, AppError> {
    Ok(Json(state.reviews.update(caller.id, review_id, &payload).await?))
}

/// Delete a review (author or admin)
#[utoipa::path(
    delete,
    path = "/api/v1/reviews/{id}",
    tag = "reviews",
    params(("id" = Uuid, Path, description = "Review ID")),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 403, description = "Not your review", body = ErrorResponse),
        (status = 404, description = "Review not found", body = ErrorResponse)
    )
)]
pub async fn delete_review_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(review_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.reviews.delete(caller, review_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
