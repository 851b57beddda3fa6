use std::sync::Arc;
use tracing::warn;

use crate::domain::{HealthCheck, HealthResponse, HealthStatus, PaymentGateway};

pub struct HealthService {
    database: Arc<dyn HealthCheck>,
    gateway: Arc<dyn PaymentGateway>,
}

impl HealthService {
    #[must_use]
    pub fn new(database: Arc<dyn HealthCheck>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { database, gateway }
    }

    pub async fn check(&self) -> HealthResponse {
        let (db_result, gateway_result) =
            tokio::join!(self.database.health_check(), self.gateway.health_check());

        let database = match db_result {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = ?e, "Database health check failed");
                HealthStatus::Unhealthy
            }
        };
        let payment_gateway = match gateway_result {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = ?e, "Payment gateway health check failed");
                HealthStatus::Unhealthy
            }
        };
        HealthResponse::new(database, payment_gateway)
    }

    /// Readiness only depends on the database.
    pub async fn is_ready(&self) -> bool {
        self.database.health_check().await.is_ok()
    }
}
