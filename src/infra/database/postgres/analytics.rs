use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::instrument;

use super::{PostgresClient, parse_column};
use crate::domain::{
    AnalyticsRepository, AnalyticsSummary, AppError, DailySales, StatusCount, TopProduct,
};

const REVENUE_STATUSES: &str = "('paid', 'shipped', 'delivered')";

#[async_trait]
impl AnalyticsRepository for PostgresClient {
    #[instrument(skip(self))]
    async fn summary(&self) -> Result<AnalyticsSummary, AppError> {
        let sql = format!(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COUNT(*) FROM products WHERE is_active) AS active_products,
                (SELECT COUNT(*) FROM orders) AS total_orders,
                (SELECT COALESCE(SUM(total_cents), 0)::bigint FROM orders
                  WHERE status IN {REVENUE_STATUSES}) AS revenue_cents
            "#
        );
        let totals = sqlx::query(&sql).fetch_one(&self.pool).await?;

        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM orders GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        let orders_by_status = rows
            .iter()
            .map(|row| -> Result<StatusCount, AppError> {
                let status: String = row.try_get("status")?;
                Ok(StatusCount {
                    status: parse_column("status", &status)?,
                    count: row.try_get("count")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AnalyticsSummary {
            total_users: totals.try_get("total_users")?,
            active_products: totals.try_get("active_products")?,
            total_orders: totals.try_get("total_orders")?,
            orders_by_status,
            revenue_cents: totals.try_get("revenue_cents")?,
        })
    }

    #[instrument(skip(self))]
    async fn top_products(&self, limit: i64) -> Result<Vec<TopProduct>, AppError> {
        let sql = format!(
            r#"
            SELECT i.product_id, MAX(i.product_name) AS name,
                   SUM(i.quantity)::bigint AS quantity_sold,
                   SUM(i.line_total_cents)::bigint AS revenue_cents
            FROM order_items i
            JOIN orders o ON o.id = i.order_id
            WHERE o.status IN {REVENUE_STATUSES}
            GROUP BY i.product_id
            ORDER BY quantity_sold DESC, revenue_cents DESC
            LIMIT $1
            "#
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<TopProduct, AppError> {
                Ok(TopProduct {
                    product_id: row.try_get("product_id")?,
                    name: row.try_get("name")?,
                    quantity_sold: row.try_get("quantity_sold")?,
                    revenue_cents: row.try_get("revenue_cents")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn sales_by_day(&self, since: DateTime<Utc>) -> Result<Vec<DailySales>, AppError> {
        let sql = format!(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::date AS day,
                   COUNT(*) AS order_count,
                   COALESCE(SUM(total_cents), 0)::bigint AS revenue_cents
            FROM orders
            WHERE status IN {REVENUE_STATUSES} AND created_at >= $1
            GROUP BY day
            ORDER BY day
            "#
        );
        let rows = sqlx::query(&sql).bind(since).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<DailySales, AppError> {
                Ok(DailySales {
                    day: row.try_get("day")?,
                    order_count: row.try_get("order_count")?,
                    revenue_cents: row.try_get("revenue_cents")?,
                })
            })
            .collect()
    }
}
