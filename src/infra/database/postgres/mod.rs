//! PostgreSQL adapters for every repository trait.
//!
//! The client owns a single pool; each submodule implements one repository
//! trait on [`PostgresClient`]. Multi-row invariants (token rotation,
//! checkout, default addresses, rating aggregates) run inside transactions.

mod addresses;
mod analytics;
mod cart;
mod catalog;
mod orders;
mod payments;
mod reviews;
mod users;
mod wishlist;

use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::{AppError, DatabaseError, HealthCheck};

/// Pool sizing. Checkout and token rotation hold a connection for the
/// whole transaction, so `max_connections` bounds concurrent checkouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// Store backed by one shared pool.
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections.min(config.max_connections))
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Unavailable(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Applies the embedded schema migrations under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Storefront schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Unavailable(e.to_string())))?;
        Ok(())
    }
}

/// Parse a text enum column, surfacing unknown values as query errors.
fn parse_column<T>(column: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e: String| AppError::Database(DatabaseError::Query(format!("{column}: {e}"))))
}

/// `%term%` with LIKE wildcards escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderStatus;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("mug"), "%mug%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_parse_column_reports_column_name() {
        let status: OrderStatus = parse_column("status", "paid").unwrap();
        assert_eq!(status, OrderStatus::Paid);

        let err = parse_column::<OrderStatus>("status", "lost").unwrap_err();
        assert!(err.to_string().contains("status"));
    }

}
