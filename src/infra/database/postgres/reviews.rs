use async_trait::async_trait;
use sqlx::{PgConnection, Row, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use super::{PostgresClient, to_count};
use crate::domain::{AppError, PaginationParams, Review, ReviewRepository};

const REVIEW_COLUMNS: &str = "id, product_id, user_id, author_name, rating, title, body, \
     verified_purchase, created_at, updated_at";

fn row_to_review(row: &PgRow) -> Result<Review, AppError> {
    Ok(Review {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        user_id: row.try_get("user_id")?,
        author_name: row.try_get("author_name")?,
        rating: row.try_get("rating")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        verified_purchase: row.try_get("verified_purchase")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Recompute the product's average rating and review count.
async fn refresh_rating(conn: &mut PgConnection, product_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE products p
        SET average_rating = COALESCE(agg.avg, 0), review_count = agg.cnt
        FROM (
            SELECT ROUND(AVG(rating)::numeric, 2)::float8 AS avg, COUNT(*)::int AS cnt
            FROM reviews WHERE product_id = $1
        ) agg
        WHERE p.id = $1
        "#,
    )
    .bind(product_id)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl ReviewRepository for PostgresClient {
    #[instrument(skip(self, review), fields(product_id = %review.product_id))]
    async fn create_review(&self, review: &Review) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO reviews (id, product_id, user_id, author_name, rating, title, body,
                                 verified_purchase, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(review.id)
        .bind(review.product_id)
        .bind(review.user_id)
        .bind(&review.author_name)
        .bind(review.rating)
        .bind(&review.title)
        .bind(&review.body)
        .bind(review.verified_purchase)
        .bind(review.created_at)
        .bind(review.updated_at)
        .execute(&mut *tx)
        .await?;
        refresh_rating(&mut tx, review.product_id).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, AppError> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_review).transpose()
    }

    #[instrument(skip(self, review), fields(review_id = %review.id))]
    async fn update_review(&self, review: &Review) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE reviews SET rating = $2, title = $3, body = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(review.id)
        .bind(review.rating)
        .bind(&review.title)
        .bind(&review.body)
        .bind(review.updated_at)
        .execute(&mut *tx)
        .await?;
        refresh_rating(&mut tx, review.product_id).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_review(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        let product_id: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM reviews WHERE id = $1 RETURNING product_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(product_id) = product_id else {
            tx.rollback().await?;
            return Ok(false);
        };
        refresh_rating(&mut tx, product_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn list_reviews(
        &self,
        product_id: Uuid,
        page: &PaginationParams,
    ) -> Result<(Vec<Review>, u64), AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE product_id = $1 \
             ORDER BY created_at DESC, id LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(product_id)
            .bind(i64::from(page.limit()))
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        let reviews = rows.iter().map(row_to_review).collect::<Result<Vec<_>, _>>()?;
        Ok((reviews, to_count(total)))
    }
}
