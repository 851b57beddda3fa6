//! Payment intents and provider webhooks.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::extract::AuthUser;
use crate::app::AppState;
use crate::domain::{AppError, ErrorResponse, PaymentIntentResponse};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

/// Start (or resume) payment for a pending order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payment",
    tag = "payments",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payment intent", body = PaymentIntentResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order is not pending", body = ErrorResponse),
        (status = 502, description = "Payment provider error", body = ErrorResponse)
    )
)]
pub async fn create_payment_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    Ok(Json(state.payments.create_intent(caller, order_id).await?))
}

/// Payment state of an order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/payment",
    tag = "payments",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payment", body = PaymentIntentResponse),
        (status = 404, description = "No payment for this order", body = ErrorResponse)
    )
)]
pub async fn get_payment_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    Ok(Json(state.payments.get_for_order(caller, order_id).await?))
}

/// Payment provider event callback
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    tag = "payments",
    request_body(content = String, description = "Raw provider event, signed in the Stripe-Signature header"),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 401, description = "Bad signature", body = ErrorResponse)
    )
)]
pub async fn payment_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Authentication("Missing webhook signature".to_string()))?;

    state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(WebhookAck { received: true }))
}
