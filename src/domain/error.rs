//! Error types shared by every layer.
//!
//! Infrastructure failures are lifted into [`AppError`] with `?`; the API
//! layer maps each variant to a status code and a stable `type` string.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DatabaseError {
    /// Connecting failed or the pool had no free connection in time
    #[error("Database unavailable: {0}")]
    Unavailable(String),
    #[error("Query execution failed: {0}")]
    Query(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    /// A unique constraint was violated; carries a client-facing message
    #[error("{0}")]
    Duplicate(String),
    #[error("Migration failed: {0}")]
    Migration(String),
}

impl DatabaseError {
    /// Human message for a unique-constraint violation, keyed on the
    /// Postgres constraint name.
    pub fn duplicate_of(constraint: &str) -> Self {
        let message = match constraint {
            "users_email_key" => "Email is already registered",
            "products_sku_key" => "A product with this SKU already exists",
            "reviews_product_id_user_id_key" => "You have already reviewed this product",
            "idx_addresses_one_default" => "Only one default address is allowed",
            other => return DatabaseError::Duplicate(format!("Duplicate value for {other}")),
        };
        DatabaseError::Duplicate(message.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Input rejected before any state changed.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    Field { field: String, message: String },
    /// Every failing field of a request body, `field: code` pairs joined by `; `
    #[error("Invalid request: {0}")]
    Request(String),
    #[error("Malformed payload: {0}")]
    Payload(String),
}

impl ValidationError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::Field {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut issues: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let reason = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    format!("{field}: {reason}")
                })
            })
            .collect();
        if issues.is_empty() {
            // Nested struct or list errors
            return ValidationError::Request(errors.to_string());
        }
        issues.sort();
        ValidationError::Request(issues.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum ExternalServiceError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// The provider understood the request and declined it (card declined)
    #[error("Rejected by provider: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File too large: {size} bytes exceeds {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("I/O failure: {0}")]
    Io(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    ExternalService(#[from] ExternalServiceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Authorization denied: {0}")]
    Authorization(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Internal error: {0}")]
    Internal(String),
    /// A feature whose provider is not configured (payments, Google login)
    #[error("Operation not supported: {0}")]
    NotSupported(String),
    #[error("Rate limit exceeded")]
    RateLimited,
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        AppError::Conflict(what.into())
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(ValidationError::field(field, message))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.into())
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                DatabaseError::Unavailable(err.to_string())
            }
            sqlx::Error::Io(e) => DatabaseError::Unavailable(e.to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    return DatabaseError::duplicate_of(db_err.constraint().unwrap_or("unique key"));
                }
                DatabaseError::Query(db_err.message().to_string())
            }
            _ => DatabaseError::Query(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(DatabaseError::from(err))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(DatabaseError::Migration(err.to_string()))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
