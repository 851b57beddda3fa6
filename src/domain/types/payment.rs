//! Payments collected through the external gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    RequiresPayment,
    Succeeded,
    Failed,
    RefundPending,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::RequiresPayment => "requires_payment",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::RefundPending => "refund_pending",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requires_payment" => Ok(PaymentStatus::RequiresPayment),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "refund_pending" => Ok(PaymentStatus::RefundPending),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub provider_intent_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn from_intent(order_id: Uuid, provider: &str, intent: &PaymentIntent) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            provider: provider.to_string(),
            provider_intent_id: intent.id.clone(),
            amount_cents: intent.amount_cents,
            currency: intent.currency.clone(),
            status: PaymentStatus::RequiresPayment,
            client_secret: intent.client_secret.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Parameters for creating a gateway payment intent.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePaymentIntent {
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub customer_email: Option<String>,
    /// Gateways answer a repeated key with the intent created the first time
    pub idempotency_key: String,
}

impl CreatePaymentIntent {
    /// Key for an order's payment attempt: the order id for the first one,
    /// suffixed with the failed payment being replaced for later ones.
    pub fn idempotency_key_for(order_id: Uuid, replacing: Option<&Payment>) -> String {
        match replacing {
            None => order_id.to_string(),
            Some(failed) => format!("{order_id}:{}", failed.id),
        }
    }
}

/// How a successful charge was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentSettlement {
    /// No payment carries the intent id
    UnknownIntent,
    /// The payment was already succeeded or flagged for refund
    AlreadySettled,
    /// The order moved from `pending` to `paid`
    OrderPaid { order_id: Uuid },
    /// The order had left `pending`; the charge awaits a refund
    RefundPending { order_id: Uuid },
}

/// Gateway-side payment intent.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount_cents: i64,
    pub currency: String,
}

/// A verified gateway notification reduced to what the store acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded { intent_id: String },
    Failed { intent_id: String, reason: Option<String> },
    Ignored { event_type: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PaymentIntentResponse {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub client_secret: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
}

impl From<&Payment> for PaymentIntentResponse {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            order_id: payment.order_id,
            client_secret: payment.client_secret.clone(),
            amount_cents: payment.amount_cents,
            currency: payment.currency.clone(),
            status: payment.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_strings() {
        for status in [
            PaymentStatus::RequiresPayment,
            PaymentStatus::Succeeded,
            PaymentStatus::Failed,
            PaymentStatus::RefundPending,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        let json = serde_json::to_string(&PaymentStatus::RefundPending).unwrap();
        assert_eq!(json, "\"refund_pending\"");
    }

    #[test]
    fn test_payment_from_intent() {
        let intent = PaymentIntent {
            id: "pi_123".to_string(),
            client_secret: "pi_123_secret".to_string(),
            amount_cents: 4200,
            currency: "usd".to_string(),
        };
        let order_id = Uuid::new_v4();
        let payment = Payment::from_intent(order_id, "stripe", &intent);

        assert_eq!(payment.order_id, order_id);
        assert_eq!(payment.status, PaymentStatus::RequiresPayment);
        assert_eq!(PaymentIntentResponse::from(&payment).client_secret, "pi_123_secret");
    }

    #[test]
    fn test_idempotency_key_changes_per_attempt() {
        let intent = PaymentIntent {
            id: "pi_1".to_string(),
            client_secret: "pi_1_secret".to_string(),
            amount_cents: 100,
            currency: "usd".to_string(),
        };
        let order_id = Uuid::new_v4();
        let failed = Payment::from_intent(order_id, "stripe", &intent);

        let first = CreatePaymentIntent::idempotency_key_for(order_id, None);
        let retry = CreatePaymentIntent::idempotency_key_for(order_id, Some(&failed));
        assert_eq!(first, order_id.to_string());
        assert_eq!(retry, format!("{order_id}:{}", failed.id));
    }
}
