//! HTTP rendering of [`AppError`].

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::domain::{
    AppError, DatabaseError, ErrorDetail, ErrorResponse, ExternalServiceError, StorageError,
};

impl AppError {
    /// Status code and machine-readable error type.
    pub fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Database(db_err) => match db_err {
                DatabaseError::Unavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "database_unavailable")
                }
                DatabaseError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                DatabaseError::Duplicate(_) => (StatusCode::CONFLICT, "duplicate"),
                DatabaseError::Query(_) | DatabaseError::Migration(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            },
            AppError::ExternalService(ext_err) => match ext_err {
                ExternalServiceError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                ExternalServiceError::RateLimited(_) => {
                    (StatusCode::TOO_MANY_REQUESTS, "rate_limited")
                }
                ExternalServiceError::Rejected(_) => {
                    (StatusCode::PAYMENT_REQUIRED, "payment_rejected")
                }
                ExternalServiceError::HttpError(_) | ExternalServiceError::Unavailable(_) => {
                    (StatusCode::BAD_GATEWAY, "external_service_error")
                }
            },
            AppError::Storage(storage_err) => match storage_err {
                StorageError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "file_too_large"),
                StorageError::UnsupportedType(_) => {
                    (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type")
                }
                StorageError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            },
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, "authorization_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::NotSupported(_) => (StatusCode::NOT_IMPLEMENTED, "not_supported"),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        // Server-side details stay in the log
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error_type, error = %self, "Server error");
            "Internal server error".to_string()
        } else {
            if status.is_server_error() {
                error!(error_type, error = %self, "Upstream error");
            }
            self.to_string()
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
            },
        });

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidationError;
    use http_body_util::BodyExt;

    async fn render(err: AppError) -> (StatusCode, ErrorResponse) {
        let response = err.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_validation_maps_to_400() {
        let (status, body) =
            render(AppError::Validation(ValidationError::Request("email: email".into()))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.r#type, "validation_error");
    }

    #[tokio::test]
    async fn test_client_error_statuses() {
        let cases = [
            (AppError::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Authorization("x".into()), StatusCode::FORBIDDEN),
            (AppError::not_found("order"), StatusCode::NOT_FOUND),
            (AppError::conflict("stock"), StatusCode::CONFLICT),
            (
                AppError::Database(DatabaseError::Duplicate("users_email_key".into())),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Storage(StorageError::TooLarge { size: 10, limit: 5 }),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                AppError::Storage(StorageError::UnsupportedType("application/pdf".into())),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (AppError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status_and_type().0, expected);
        }
    }

    #[tokio::test]
    async fn test_unauthorized_sets_challenge_header() {
        let response = AppError::Authentication("expired".into()).into_response();
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) = render(AppError::Database(DatabaseError::Query(
            "relation \"users\" does not exist".into(),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.message, "Internal server error");
    }

    #[tokio::test]
    async fn test_upstream_errors() {
        let (status, _) = render(AppError::Database(DatabaseError::Unavailable("refused".into()))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = render(AppError::ExternalService(
            ExternalServiceError::Unavailable("stripe".into()),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.error.message.contains("stripe"));
    }
}
