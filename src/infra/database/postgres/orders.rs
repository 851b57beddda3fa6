use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, postgres::PgRow, types::Json};
use std::collections::HashMap;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{PostgresClient, parse_column, to_count};
use crate::domain::{
    AddressSnapshot, AppError, Order, OrderItem, OrderRepository, OrderStatus, PaginationParams,
};

const ORDER_COLUMNS: &str = "id, user_id, status, subtotal_cents, shipping_cents, total_cents, \
     currency, shipping_address, notes, tracking_number, created_at, updated_at";

/// Order row without its items.
fn row_to_order(row: &PgRow) -> Result<Order, AppError> {
    let status: String = row.try_get("status")?;
    let Json(shipping_address): Json<AddressSnapshot> = row.try_get("shipping_address")?;
    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        status: parse_column("status", &status)?,
        items: Vec::new(),
        subtotal_cents: row.try_get("subtotal_cents")?,
        shipping_cents: row.try_get("shipping_cents")?,
        total_cents: row.try_get("total_cents")?,
        currency: row.try_get("currency")?,
        shipping_address,
        notes: row.try_get("notes")?,
        tracking_number: row.try_get("tracking_number")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PostgresClient {
    /// Load items for the given orders, keyed by order id, in checkout order.
    async fn order_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, product_name, unit_price_cents, quantity, line_total_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let order_id: Uuid = row.try_get("order_id")?;
            items.entry(order_id).or_default().push(OrderItem {
                product_id: row.try_get("product_id")?,
                product_name: row.try_get("product_name")?,
                unit_price_cents: row.try_get("unit_price_cents")?,
                quantity: row.try_get("quantity")?,
                line_total_cents: row.try_get("line_total_cents")?,
            });
        }
        Ok(items)
    }

    async fn with_items(&self, mut orders: Vec<Order>) -> Result<Vec<Order>, AppError> {
        if orders.is_empty() {
            return Ok(orders);
        }
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items = self.order_items(&ids).await?;
        for order in &mut orders {
            order.items = items.remove(&order.id).unwrap_or_default();
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderRepository for PostgresClient {
    #[instrument(skip(self, order), fields(order_id = %order.id, user_id = %order.user_id))]
    async fn place_order(&self, order: &Order) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, subtotal_cents, shipping_cents, total_cents,
                                currency, shipping_address, notes, tracking_number,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.status.as_str())
        .bind(order.subtotal_cents)
        .bind(order.shipping_cents)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(Json(&order.shipping_address))
        .bind(&order.notes)
        .bind(&order.tracking_number)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, product_name,
                                         unit_price_cents, quantity, line_total_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .bind(item.line_total_cents)
            .execute(&mut *tx)
            .await?;

            let reserved = sqlx::query(
                r#"
                UPDATE products
                SET stock = stock - $2, updated_at = NOW()
                WHERE id = $1 AND is_active AND stock >= $2
                "#,
            )
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if reserved == 0 {
                tx.rollback().await?;
                warn!(product_id = %item.product_id, "Checkout aborted: insufficient stock");
                return Err(AppError::conflict(format!(
                    "Insufficient stock for '{}'",
                    item.product_name
                )));
            }
        }

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(order.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let order = row_to_order(&row)?;
        Ok(self.with_items(vec![order]).await?.pop())
    }

    #[instrument(skip(self))]
    async fn list_orders(
        &self,
        user_id: Option<Uuid>,
        status: Option<OrderStatus>,
        page: &PaginationParams,
    ) -> Result<(Vec<Order>, u64), AppError> {
        let status = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(status)
            .bind(i64::from(page.limit()))
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let orders = rows.iter().map(row_to_order).collect::<Result<Vec<_>, _>>()?;
        Ok((self.with_items(orders).await?, to_count(total)))
    }

    #[instrument(skip(self, from))]
    async fn transition_order(
        &self,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        tracking_number: Option<&str>,
        restore_stock: bool,
    ) -> Result<Option<Order>, AppError> {
        let allowed: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, tracking_number = COALESCE($3, tracking_number), updated_at = NOW()
            WHERE id = $1 AND status = ANY($4)
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(tracking_number)
        .bind(&allowed)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        if restore_stock {
            sqlx::query(
                r#"
                UPDATE products p
                SET stock = p.stock + i.quantity, updated_at = NOW()
                FROM order_items i
                WHERE i.order_id = $1 AND p.id = i.product_id
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        if to == OrderStatus::Cancelled {
            let flagged = sqlx::query(
                r#"
                UPDATE payments SET status = 'refund_pending', updated_at = NOW()
                WHERE order_id = $1 AND status = 'succeeded'
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if flagged > 0 {
                warn!(order_id = %id, "Cancelled order had a captured payment, refund pending");
            }
        }

        tx.commit().await?;
        self.get_order(id).await
    }

    #[instrument(skip(self))]
    async fn stale_pending_orders(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT id FROM orders
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(created_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn has_purchased(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, AppError> {
        let purchased = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM orders o
                JOIN order_items i ON i.order_id = o.id
                WHERE o.user_id = $1 AND i.product_id = $2
                  AND o.status IN ('paid', 'shipped', 'delivered')
            )
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(purchased)
    }
}
