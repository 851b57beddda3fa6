use async_trait::async_trait;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use super::PostgresClient;
use super::catalog::{PRODUCT_COLUMNS, row_to_product};
use crate::domain::{AppError, WishlistEntry, WishlistRepository};

#[async_trait]
impl WishlistRepository for PostgresClient {
    #[instrument(skip(self))]
    async fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>, AppError> {
        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS}, w.added_at
            FROM wishlist_items w
            JOIN products p ON p.id = w.product_id
            WHERE w.user_id = $1 AND p.is_active
            ORDER BY w.added_at DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<WishlistEntry, AppError> {
                Ok(WishlistEntry {
                    product: row_to_product(row)?,
                    added_at: row.try_get("added_at")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO wishlist_items (user_id, product_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, product_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn remove_from_wishlist(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
                .bind(user_id)
                .bind(product_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
