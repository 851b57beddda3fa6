//! Card payments for pending orders and the gateway webhook.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::Caller;
use crate::domain::{
    AppError, CreatePaymentIntent, DatabaseError, Order, OrderRepository, OrderStatus, Payment,
    PaymentEvent, PaymentGateway, PaymentIntentResponse, PaymentRepository, PaymentSettlement,
    PaymentStatus, UserRepository,
};
use crate::infra::observability::record_payment;

pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    orders: Arc<dyn OrderRepository>,
    users: Arc<dyn UserRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    #[must_use]
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        orders: Arc<dyn OrderRepository>,
        users: Arc<dyn UserRepository>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            payments,
            orders,
            users,
            gateway,
        }
    }

    /// Starts (or resumes) payment of a pending order.
    ///
    /// An order has at most one live intent: retrying returns the existing
    /// one unless the previous attempt failed.
    #[instrument(skip(self, caller), fields(caller_id = %caller.id))]
    pub async fn create_intent(
        &self,
        caller: Caller,
        order_id: Uuid,
    ) -> Result<PaymentIntentResponse, AppError> {
        let order = self.owned_order(caller, order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(AppError::conflict(format!(
                "Order is {}, only pending orders can be paid",
                order.status
            )));
        }

        let previous = self.payments.find_payment_for_order(order.id).await?;
        if let Some(existing) = &previous {
            if existing.status != PaymentStatus::Failed {
                debug!(payment_id = %existing.id, "Reusing existing payment intent");
                return Ok(PaymentIntentResponse::from(existing));
            }
        }

        let customer_email = self.users.get_user(order.user_id).await?.map(|u| u.email);
        let intent = self
            .gateway
            .create_intent(&CreatePaymentIntent {
                order_id: order.id,
                amount_cents: order.total_cents,
                currency: order.currency.clone(),
                customer_email,
                idempotency_key: CreatePaymentIntent::idempotency_key_for(
                    order.id,
                    previous.as_ref(),
                ),
            })
            .await?;

        let payment = Payment::from_intent(order.id, self.gateway.provider_name(), &intent);
        match self.payments.insert_payment(&payment).await {
            Ok(()) => {}
            // A concurrent request with the same key stored the intent first
            Err(AppError::Database(DatabaseError::Duplicate(_))) => {
                let stored = self
                    .payments
                    .find_payment_by_intent(&intent.id)
                    .await?
                    .ok_or_else(|| AppError::conflict("Payment is being created"))?;
                return Ok(PaymentIntentResponse::from(&stored));
            }
            Err(e) => return Err(e),
        }
        record_payment("created");
        info!(
            payment_id = %payment.id,
            intent_id = %payment.provider_intent_id,
            amount_cents = payment.amount_cents,
            "Payment intent created"
        );
        Ok(PaymentIntentResponse::from(&payment))
    }

    /// Applies a signed gateway notification.
    ///
    /// Replays are harmless: a settled payment is left alone and the order
    /// only moves out of `pending` once. A charge for an order that was
    /// cancelled meanwhile is flagged for refund.
    #[instrument(skip(self, payload, signature), fields(payload_len = payload.len()))]
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> Result<(), AppError> {
        let event = self.gateway.parse_webhook(payload, signature).map_err(|e| {
            warn!(error = %e, "Rejected payment webhook");
            e
        })?;

        match event {
            PaymentEvent::Succeeded { intent_id } => self.mark_succeeded(&intent_id).await,
            PaymentEvent::Failed { intent_id, reason } => {
                self.mark_failed(&intent_id, reason.as_deref()).await
            }
            PaymentEvent::Ignored { event_type } => {
                debug!(event_type = %event_type, "Ignoring payment event");
                Ok(())
            }
        }
    }

    #[instrument(skip(self, caller), fields(caller_id = %caller.id))]
    pub async fn get_for_order(
        &self,
        caller: Caller,
        order_id: Uuid,
    ) -> Result<PaymentIntentResponse, AppError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .filter(|order| caller.can_access(order.user_id))
            .ok_or_else(|| AppError::not_found(format!("order {order_id}")))?;
        self.payments
            .find_payment_for_order(order.id)
            .await?
            .map(|p| PaymentIntentResponse::from(&p))
            .ok_or_else(|| AppError::not_found("payment"))
    }

    async fn mark_succeeded(&self, intent_id: &str) -> Result<(), AppError> {
        match self.payments.settle_payment(intent_id).await? {
            PaymentSettlement::UnknownIntent => {
                warn!(intent_id, "Payment event for unknown intent");
                return Ok(());
            }
            PaymentSettlement::AlreadySettled => {
                debug!(intent_id, "Duplicate success event");
                return Ok(());
            }
            PaymentSettlement::OrderPaid { order_id } => {
                info!(%order_id, "Order paid");
                record_payment("succeeded");
            }
            PaymentSettlement::RefundPending { order_id } => {
                warn!(
                    %order_id,
                    intent_id,
                    "Charge captured for an order that is no longer pending, refund pending"
                );
                record_payment("refund_pending");
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, intent_id: &str, reason: Option<&str>) -> Result<(), AppError> {
        let Some(payment) = self.payments.find_payment_by_intent(intent_id).await? else {
            warn!(intent_id, "Payment event for unknown intent");
            return Ok(());
        };
        if payment.status != PaymentStatus::RequiresPayment {
            debug!(payment_id = %payment.id, status = %payment.status, "Ignoring late failure event");
            return Ok(());
        }

        self.payments
            .update_payment_status(payment.id, PaymentStatus::Failed)
            .await?;
        warn!(
            payment_id = %payment.id,
            reason = reason.unwrap_or("unspecified"),
            "Payment failed"
        );
        record_payment("failed");
        Ok(())
    }

    async fn owned_order(&self, caller: Caller, order_id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get_order(order_id)
            .await?
            .filter(|order| order.user_id == caller.id)
            .ok_or_else(|| AppError::not_found(format!("order {order_id}")))
    }
}
