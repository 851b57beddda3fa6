//! Registration, login and token lifecycle endpoints.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::api::extract::{
    AuthUser, REFRESH_COOKIE, clear_refresh_cookie, read_cookie, refresh_cookie,
};
use crate::app::AppState;
use crate::app::services::AuthSession;
use crate::domain::{
    AppError, AuthResponse, ErrorResponse, ExternalLoginRequest, LoginRequest, RateLimitResponse,
    RefreshRequest, RegisterRequest, UserDto,
};

/// Token pair response: the access token in the body, the refresh token in
/// an HttpOnly cookie.
fn session_response(
    state: &AppState,
    session: AuthSession,
    status: StatusCode,
) -> Result<Response, AppError> {
    let cookie = refresh_cookie(&session.refresh_token, session.refresh_ttl, state.cookie_secure)?;
    let mut response = (status, Json(session.response)).into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

/// The cookie wins; the JSON body is a fallback for non-browser clients.
fn presented_refresh_token(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    if let Some(token) = read_cookie(headers, REFRESH_COOKIE) {
        return Some(token.to_string());
    }
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice::<RefreshRequest>(body)
        .ok()
        .and_then(|r| r.refresh_token)
        .filter(|t| !t.trim().is_empty())
}

/// Create an account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitResponse)
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    let session = state.auth.register(&payload).await?;
    session_response(&state, session, StatusCode::CREATED)
}

/// Sign in with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitResponse)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let session = state.auth.login(&payload).await?;
    session_response(&state, session, StatusCode::OK)
}

/// Sign in with an external identity provider token
#[utoipa::path(
    post,
    path = "/api/v1/auth/external",
    tag = "auth",
    request_body = ExternalLoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Identity token rejected", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse),
        (status = 501, description = "Provider not configured", body = ErrorResponse)
    )
)]
pub async fn external_login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExternalLoginRequest>,
) -> Result<Response, AppError> {
    let session = state.auth.external_login(&payload).await?;
    session_response(&state, session, StatusCode::OK)
}

/// Rotate the refresh token and issue a new access token
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body(content = RefreshRequest, description = "Only needed without the refresh cookie"),
    responses(
        (status = 200, description = "Tokens rotated", body = AuthResponse),
        (status = 401, description = "Missing, expired or reused refresh token", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse)
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let token = presented_refresh_token(&headers, &body)
        .ok_or_else(|| AppError::Authentication("Missing refresh token".to_string()))?;

    match state.auth.refresh(&token).await {
        Ok(session) => session_response(&state, session, StatusCode::OK),
        Err(err) => {
            // A dead token should not keep being replayed by the browser
            let mut response = err.into_response();
            response
                .headers_mut()
                .insert(header::SET_COOKIE, clear_refresh_cookie(state.cookie_secure));
            Ok(response)
        }
    }
}

/// Revoke the refresh token and clear the cookie
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    request_body(content = RefreshRequest, description = "Only needed without the refresh cookie"),
    responses(
        (status = 204, description = "Signed out")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = presented_refresh_token(&headers, &body);
    let mut response = match state.auth.logout(token.as_deref()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    };
    response
        .headers_mut()
        .insert(header::SET_COOKIE, clear_refresh_cookie(state.cookie_secure));
    response
}

/// The signed-in user
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserDto),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<UserDto>, AppError> {
    Ok(Json(state.auth.me(caller.id).await?))
}
