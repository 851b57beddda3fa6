use async_trait::async_trait;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use super::PostgresClient;
use crate::domain::{AppError, CartLine, CartRepository};

#[async_trait]
impl CartRepository for PostgresClient {
    #[instrument(skip(self))]
    async fn cart_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT c.product_id, p.name, p.price_cents, c.quantity, p.stock, p.is_active
            FROM cart_items c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = $1
            ORDER BY c.added_at, c.product_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<CartLine, AppError> {
                Ok(CartLine {
                    product_id: row.try_get("product_id")?,
                    name: row.try_get("name")?,
                    unit_price_cents: row.try_get("price_cents")?,
                    quantity: row.try_get("quantity")?,
                    stock: row.try_get("stock")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn cart_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<i32>, AppError> {
        let quantity =
            sqlx::query_scalar("SELECT quantity FROM cart_items WHERE user_id = $1 AND product_id = $2")
                .bind(user_id)
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(quantity)
    }

    #[instrument(skip(self))]
    async fn set_cart_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_cart_item(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn clear_cart(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
