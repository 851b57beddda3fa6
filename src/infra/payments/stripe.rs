//! Stripe PaymentIntents client and webhook verification.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

use crate::domain::{
    AppError, CreatePaymentIntent, ExternalServiceError, PaymentEvent, PaymentGateway,
    PaymentIntent,
};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Maximum age of a webhook signature timestamp.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
    pub api_base: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl StripeConfig {
    pub fn new(secret_key: SecretString, webhook_secret: SecretString) -> Self {
        Self {
            secret_key,
            webhook_secret,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(15),
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

pub struct StripeGateway {
    http_client: Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: String,
    last_payment_error: Option<StripeError>,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ExternalService(ExternalServiceError::HttpError(e.to_string())))?;
        info!(api_base = %config.api_base, "Created Stripe gateway");
        Ok(Self {
            http_client,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn send_intent_request(
        &self,
        request: &CreatePaymentIntent,
    ) -> Result<PaymentIntent, AppError> {
        let order_id = request.order_id.to_string();
        let amount = request.amount_cents.to_string();
        let mut form = vec![
            ("amount", amount.as_str()),
            ("currency", request.currency.as_str()),
            ("metadata[order_id]", order_id.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
        ];
        if let Some(email) = request.customer_email.as_deref() {
            form.push(("receipt_email", email));
        }

        let response = self
            .http_client
            .post(self.url("/v1/payment_intents"))
            .bearer_auth(self.config.secret_key.expose_secret())
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ErrorEnvelope>().await.ok();
            return Err(map_status_error(status, body.map(|b| b.error)));
        }

        let intent: IntentResponse = response.json().await.map_err(|e| {
            AppError::ExternalService(ExternalServiceError::HttpError(e.to_string()))
        })?;

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
            amount_cents: intent.amount,
            currency: intent.currency,
        })
    }
}

fn map_transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::ExternalService(ExternalServiceError::Timeout(e.to_string()))
    } else {
        AppError::ExternalService(ExternalServiceError::Unavailable(e.to_string()))
    }
}

fn map_status_error(status: StatusCode, error: Option<StripeError>) -> AppError {
    let detail = error
        .map(|e| {
            let message = e.message.unwrap_or_else(|| status.to_string());
            match e.code {
                Some(code) => format!("{code}: {message}"),
                None => message,
            }
        })
        .unwrap_or_else(|| status.to_string());

    let err = if status == StatusCode::TOO_MANY_REQUESTS {
        ExternalServiceError::RateLimited(detail)
    } else if status.is_server_error() {
        ExternalServiceError::Unavailable(detail)
    } else {
        ExternalServiceError::Rejected(detail)
    };
    AppError::ExternalService(err)
}

fn is_retryable(err: &AppError) -> bool {
    matches!(
        err,
        AppError::ExternalService(
            ExternalServiceError::Unavailable(_) | ExternalServiceError::Timeout(_)
        )
    )
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against
/// the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), AppError> {
    let reject = |reason: &str| AppError::Authentication(format!("Invalid webhook signature: {reason}"));

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| reject("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(reject("missing v1 signature"));
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(reject("timestamp outside tolerance"));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| bool::from(bytes.as_slice().ct_eq(expected.as_slice())))
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(reject("signature mismatch"))
    }
}

/// Reduce a verified webhook body to the events the store acts on.
pub fn parse_event(payload: &[u8]) -> Result<PaymentEvent, AppError> {
    let event: WebhookEvent = serde_json::from_slice(payload).map_err(|e| {
        AppError::Validation(crate::domain::ValidationError::Payload(format!(
            "webhook payload: {e}"
        )))
    })?;

    let intent = event.data.object;
    Ok(match event.event_type.as_str() {
        "payment_intent.succeeded" => PaymentEvent::Succeeded {
            intent_id: intent.id,
        },
        "payment_intent.payment_failed" => PaymentEvent::Failed {
            intent_id: intent.id,
            reason: intent.last_payment_error.and_then(|e| e.message),
        },
        _ => PaymentEvent::Ignored {
            event_type: event.event_type,
        },
    })
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider_name(&self) -> &'static str {
        "stripe"
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let response = self
            .http_client
            .get(self.url("/v1/balance"))
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(map_status_error(status, None))
        }
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, amount = request.amount_cents))]
    async fn create_intent(&self, request: &CreatePaymentIntent) -> Result<PaymentIntent, AppError> {
        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self.send_intent_request(request).await {
                Ok(intent) => {
                    info!(intent_id = %intent.id, "Created payment intent");
                    return Ok(intent);
                }
                Err(e) if is_retryable(&e) => {
                    warn!(attempt = attempt, error = ?e, "Payment intent request failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            AppError::ExternalService(ExternalServiceError::Unavailable(
                "payment gateway".to_string(),
            ))
        }))
    }

    fn parse_webhook(&self, payload: &[u8], signature: &str) -> Result<PaymentEvent, AppError> {
        verify_signature(
            payload,
            signature,
            self.config.webhook_secret.expose_secret(),
            Utc::now().timestamp(),
        )?;
        parse_event(payload)
    }
}

/// Build a valid signature header for webhook tests.
#[cfg(any(test, feature = "test-utils"))]
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const PAYLOAD: &[u8] =
        br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#;

    #[test]
    fn test_valid_signature_is_accepted() {
        let now = 1_700_000_000;
        let header = sign_payload(PAYLOAD, SECRET, now);
        assert!(verify_signature(PAYLOAD, &header, SECRET, now + 10).is_ok());
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let now = 1_700_000_000;
        let valid = sign_payload(PAYLOAD, SECRET, now);
        let v1 = valid.split_once(",v1=").unwrap().1;
        let header = format!("t={now},v1=deadbeef,v1={v1}");
        assert!(verify_signature(PAYLOAD, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_rejects_wrong_secret_tampering_and_stale_timestamp() {
        let now = 1_700_000_000;
        let header = sign_payload(PAYLOAD, SECRET, now);

        assert!(verify_signature(PAYLOAD, &header, "other", now).is_err());
        assert!(verify_signature(b"{}", &header, SECRET, now).is_err());
        assert!(matches!(
            verify_signature(PAYLOAD, &header, SECRET, now + SIGNATURE_TOLERANCE_SECS + 1),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_header() {
        assert!(verify_signature(PAYLOAD, "", SECRET, 0).is_err());
        assert!(verify_signature(PAYLOAD, "t=abc,v1=00", SECRET, 0).is_err());
        assert!(verify_signature(PAYLOAD, "t=0", SECRET, 0).is_err());
        assert!(verify_signature(PAYLOAD, "t=0,v1=not-hex", SECRET, 0).is_err());
    }

    #[test]
    fn test_parse_event_kinds() {
        assert_eq!(
            parse_event(PAYLOAD).unwrap(),
            PaymentEvent::Succeeded {
                intent_id: "pi_123".to_string()
            }
        );

        let failed = br#"{"type":"payment_intent.payment_failed","data":{"object":{"id":"pi_9","last_payment_error":{"message":"card declined"}}}}"#;
        assert_eq!(
            parse_event(failed).unwrap(),
            PaymentEvent::Failed {
                intent_id: "pi_9".to_string(),
                reason: Some("card declined".to_string())
            }
        );

        let other = br#"{"type":"charge.refunded","data":{"object":{"id":"ch_1"}}}"#;
        assert!(matches!(
            parse_event(other).unwrap(),
            PaymentEvent::Ignored { event_type } if event_type == "charge.refunded"
        ));

        assert!(parse_event(b"not json").is_err());
    }

    #[test]
    fn test_status_error_mapping() {
        let err = map_status_error(StatusCode::TOO_MANY_REQUESTS, None);
        assert!(matches!(
            err,
            AppError::ExternalService(ExternalServiceError::RateLimited(_))
        ));

        let err = map_status_error(
            StatusCode::PAYMENT_REQUIRED,
            Some(StripeError {
                message: Some("Your card was declined.".to_string()),
                code: Some("card_declined".to_string()),
            }),
        );
        assert_eq!(
            err.to_string(),
            "Rejected by provider: card_declined: Your card was declined."
        );
        assert!(!is_retryable(&err));

        let err = map_status_error(StatusCode::BAD_GATEWAY, None);
        assert!(is_retryable(&err));
    }
}
