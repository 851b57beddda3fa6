use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use super::{PostgresClient, parse_column};
use crate::domain::{
    AppError, OrderStatus, Payment, PaymentRepository, PaymentSettlement, PaymentStatus,
};

const PAYMENT_COLUMNS: &str = "id, order_id, provider, provider_intent_id, amount_cents, \
     currency, status, client_secret, created_at, updated_at";

fn row_to_payment(row: &PgRow) -> Result<Payment, AppError> {
    let status: String = row.try_get("status")?;
    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        provider: row.try_get("provider")?,
        provider_intent_id: row.try_get("provider_intent_id")?,
        amount_cents: row.try_get("amount_cents")?,
        currency: row.try_get("currency")?,
        status: parse_column("status", &status)?,
        client_secret: row.try_get("client_secret")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl PaymentRepository for PostgresClient {
    #[instrument(skip(self, payment), fields(order_id = %payment.order_id))]
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, provider, provider_intent_id, amount_cents,
                                  currency, status, client_secret, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(&payment.provider)
        .bind(&payment.provider_intent_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.client_secret)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, AppError> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_payment).transpose()
    }

    #[instrument(skip(self))]
    async fn find_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, AppError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider_intent_id = $1");
        let row = sqlx::query(&sql)
            .bind(intent_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_payment).transpose()
    }

    #[instrument(skip(self))]
    async fn update_payment_status(
        &self,
        id: Uuid,
        status: PaymentStatus,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn settle_payment(&self, intent_id: &str) -> Result<PaymentSettlement, AppError> {
        let mut tx = self.pool.begin().await?;

        let order_id: Option<Uuid> =
            sqlx::query_scalar("SELECT order_id FROM payments WHERE provider_intent_id = $1")
                .bind(intent_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(order_id) = order_id else {
            tx.rollback().await?;
            return Ok(PaymentSettlement::UnknownIntent);
        };

        // Order before payment, the same lock order as cancellation
        let order_status: String =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order_id)
                .fetch_one(&mut *tx)
                .await?;
        let row = sqlx::query(
            "SELECT id, status FROM payments WHERE provider_intent_id = $1 FOR UPDATE",
        )
        .bind(intent_id)
        .fetch_one(&mut *tx)
        .await?;
        let payment_id: Uuid = row.try_get("id")?;
        let status: String = row.try_get("status")?;
        let status: PaymentStatus = parse_column("status", &status)?;
        if matches!(
            status,
            PaymentStatus::Succeeded | PaymentStatus::RefundPending
        ) {
            tx.rollback().await?;
            return Ok(PaymentSettlement::AlreadySettled);
        }

        let paid = parse_column::<OrderStatus>("status", &order_status)? == OrderStatus::Pending;
        if paid {
            sqlx::query("UPDATE orders SET status = 'paid', updated_at = NOW() WHERE id = $1")
                .bind(order_id)
                .execute(&mut *tx)
                .await?;
        }
        let next = if paid {
            PaymentStatus::Succeeded
        } else {
            PaymentStatus::RefundPending
        };
        sqlx::query("UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(payment_id)
            .bind(next.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(if paid {
            PaymentSettlement::OrderPaid { order_id }
        } else {
            PaymentSettlement::RefundPending { order_id }
        })
    }
}
