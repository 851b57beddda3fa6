//! Self-service account endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::api::extract::{AuthUser, clear_refresh_cookie};
use crate::app::AppState;
use crate::app::services::MAX_AVATAR_BYTES;
use crate::domain::{
    AppError, ChangePasswordRequest, ErrorResponse, StorageError, UpdateProfileRequest, UserDto,
};

/// Multipart field carrying the avatar image.
pub const AVATAR_FIELD: &str = "file";

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::Storage(StorageError::TooLarge {
            size: MAX_AVATAR_BYTES + 1,
            limit: MAX_AVATAR_BYTES,
        });
    }
    warn!(error = %err, "Malformed multipart body");
    AppError::invalid(AVATAR_FIELD, err.body_text())
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/api/v1/profile",
    tag = "profile",
    responses(
        (status = 200, description = "Profile", body = UserDto),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    )
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<UserDto>, AppError> {
    Ok(Json(state.profile.get_profile(caller.id).await?))
}

/// Update display name or phone
#[utoipa::path(
    put,
    path = "/api/v1/profile",
    tag = "profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserDto),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    )
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserDto>, AppError> {
    Ok(Json(state.profile.update_profile(caller.id, &payload).await?))
}

/// Change (or set) the account password
#[utoipa::path(
    put,
    path = "/api/v1/profile/password",
    tag = "profile",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed; other sessions signed out"),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Current password is wrong", body = ErrorResponse)
    )
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    state.profile.change_password(caller.id, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Upload a new avatar image (PNG, JPEG, GIF or WebP, max 2 MiB)
#[utoipa::path(
    post,
    path = "/api/v1/profile/avatar",
    tag = "profile",
    request_body(content_type = "multipart/form-data", description = "Image in the `file` field"),
    responses(
        (status = 200, description = "Avatar stored", body = UserDto),
        (status = 400, description = "Missing file field", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 415, description = "Not a supported image", body = ErrorResponse)
    )
)]
pub async fn upload_avatar_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UserDto>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(AVATAR_FIELD) {
            continue;
        }
        let declared = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        let user = state
            .profile
            .upload_avatar(caller.id, &bytes, declared.as_deref())
            .await?;
        return Ok(Json(user));
    }

    Err(AppError::invalid(AVATAR_FIELD, "multipart field `file` is required"))
}

/// Deactivate the account and sign out everywhere
#[utoipa::path(
    delete,
    path = "/api/v1/profile",
    tag = "profile",
    responses(
        (status = 204, description = "Account deactivated"),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    )
)]
pub async fn delete_account_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Response, AppError> {
    state.profile.delete_account(caller.id).await?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, clear_refresh_cookie(state.cookie_secure));
    Ok(response)
}
