//! Request extractors for authenticated callers and the refresh cookie.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header, request::Parts},
};
use tracing::warn;

use crate::app::{AppState, Caller};
use crate::domain::AppError;

pub const REFRESH_COOKIE: &str = "refresh_token";
/// The refresh cookie is only sent to the auth endpoints.
pub const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";

/// Any signed-in user.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Caller);

/// A signed-in user with the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Caller);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            AppError::Authentication("Missing bearer token".to_string())
        })?;
        let claims = state.jwt.verify(token)?;
        Ok(AuthUser(Caller::new(claims.sub, claims.role)))
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(caller) = AuthUser::from_request_parts(parts, state).await?;
        if !caller.is_admin() {
            warn!(user_id = %caller.id, path = %parts.uri.path(), "Non-admin hit an admin route");
            return Err(AppError::Authorization(
                "Administrator role required".to_string(),
            ));
        }
        Ok(AdminUser(caller))
    }
}

/// Caller on public routes that behave differently for signed-in users.
/// A missing or invalid token yields `None` rather than a rejection.
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<Caller>);

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let caller = bearer_token(&parts.headers)
            .and_then(|token| state.jwt.verify(token).ok())
            .map(|claims| Caller::new(claims.sub, claims.role));
        Ok(MaybeUser(caller))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Value of a cookie from the `Cookie` header(s).
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value carrying a new refresh token.
pub fn refresh_cookie(token: &str, max_age: Duration, secure: bool) -> Result<HeaderValue, AppError> {
    let mut cookie = format!(
        "{REFRESH_COOKIE}={token}; HttpOnly; SameSite=Strict; Path={REFRESH_COOKIE_PATH}; Max-Age={}",
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| AppError::Internal(format!("invalid cookie: {e}")))
}

/// `Set-Cookie` value that removes the refresh token.
pub fn clear_refresh_cookie(secure: bool) -> HeaderValue {
    let cookie = if secure {
        "refresh_token=; HttpOnly; SameSite=Strict; Path=/api/v1/auth; Max-Age=0; Secure"
    } else {
        "refresh_token=; HttpOnly; SameSite=Strict; Path=/api/v1/auth; Max-Age=0"
    };
    HeaderValue::from_static(cookie)
}
