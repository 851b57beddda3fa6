//! Payment gateway adapters.

pub mod stripe;

use async_trait::async_trait;

use crate::domain::{
    AppError, CreatePaymentIntent, ExternalServiceError, PaymentEvent, PaymentGateway,
    PaymentIntent,
};

pub use stripe::{StripeConfig, StripeGateway};

/// Stand-in used when no Stripe credentials are configured. Checkout still
/// works; paying for an order and receiving webhooks do not.
#[derive(Debug, Default)]
pub struct UnconfiguredPaymentGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredPaymentGateway {
    fn provider_name(&self) -> &'static str {
        "none"
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Err(AppError::ExternalService(ExternalServiceError::Unavailable(
            "payment gateway is not configured".to_string(),
        )))
    }

    async fn create_intent(&self, _request: &CreatePaymentIntent) -> Result<PaymentIntent, AppError> {
        Err(AppError::NotSupported(
            "payments are not configured on this deployment".to_string(),
        ))
    }

    fn parse_webhook(&self, _payload: &[u8], _signature: &str) -> Result<PaymentEvent, AppError> {
        Err(AppError::Authentication(
            "webhook secret is not configured".to_string(),
        ))
    }
}
