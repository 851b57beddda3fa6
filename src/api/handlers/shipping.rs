//! Address book and shipping quotes.

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
    Address, AddressRequest, AppError, ErrorResponse, ShippingQuote, ShippingQuoteQuery,
};

/// The caller's addresses, default first
#[utoipa::path(
    get,
    path = "/api/v1/addresses",
    tag = "shipping",
    responses(
        (status = 200, description = "Addresses", body = Vec<Address>),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    )
)]
pub async fn list_addresses_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<Address>>, AppError> {
    Ok(Json(state.shipping.list(caller.id).await?))
}

/// Add an address
#[utoipa::path(
    post,
    path = "/api/v1/addresses",
    tag = "shipping",
    request_body = AddressRequest,
    responses(
        (status = 201, description = "Address created", body = Address),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Address book is full", body = ErrorResponse)
    )
)]
pub async fn create_address_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<AddressRequest>,
) -> Result<(StatusCode, Json<Address>), AppError> {
    let address = state.shipping.create(caller.id, &payload).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// Replace an address
#[utoipa::path(
    put,
    path = "/api/v1/addresses/{id}",
    tag = "shipping",
    params(("id" = Uuid, Path, description = "Address ID")),
    request_body = AddressRequest,
    responses(
        (status = 200, description = "Address updated", body = Address),
        (status = 404, description = "Address not found", body = ErrorResponse)
    )
)]
pub async fn update_address_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddressRequest>,
) -> Result<Json<Address>, AppError> {
    Ok(Json(state.shipping.update(caller.id, id, &payload).await?))
}

/// Delete an address
#[utoipa::path(
    delete,
    path = "/api/v1/addresses/{id}",
    tag = "shipping",
    params(("id" = Uuid, Path, description = "Address ID")),
    responses(
        (status = 204, description = "Address deleted"),
        (status = 404, description = "Address not found", body = ErrorResponse)
    )
)]
pub async fn delete_address_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.shipping.delete(caller.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Make an address the default
#[utoipa::path(
    post,
    path = "/api/v1/addresses/{id}/default",
    tag = "shipping",
    params(("id" = Uuid, Path, description = "Address ID")),
    responses(
        (status = 200, description = "Default address", body = Address),
        (status = 404, description = "Address not found", body = ErrorResponse)
    )
)]
pub async fn set_default_address_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Address>, AppError> {
    Ok(Json(state.shipping.set_default(caller.id, id).await?))
}

/// Shipping cost for a cart subtotal
#[utoipa::path(
    get,
    path = "/api/v1/shipping/quote",
    tag = "shipping",
    params(("subtotal_cents" = i64, Query, description = "Cart subtotal in cents")),
    responses(
        (status = 200, description = "Quote", body = ShippingQuote),
        (status = 400, description = "Negative subtotal", body = ErrorResponse)
    )
)]
pub async fn shipping_quote_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ShippingQuoteQuery>,
) -> Result<Json<ShippingQuote>, AppError> {
    Ok(Json(state.shipping.quote(query.subtotal_cents)?))
}
