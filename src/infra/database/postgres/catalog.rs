use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use super::{PostgresClient, like_pattern, to_count};
use crate::domain::{
    AppError, Product, ProductQuery, ProductRepository, ProductSort, ValidationError,
};

pub(super) const PRODUCT_COLUMNS: &str = "p.id, p.sku, p.name, p.description, p.category, \
     p.price_cents, p.currency, p.stock, p.image_url, p.is_active, p.average_rating, \
     p.review_count, p.created_at, p.updated_at";

pub(super) fn row_to_product(row: &PgRow) -> Result<Product, AppError> {
    Ok(Product {
        id: row.try_get("id")?,
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        price_cents: row.try_get("price_cents")?,
        currency: row.try_get("currency")?,
        stock: row.try_get("stock")?,
        image_url: row.try_get("image_url")?,
        is_active: row.try_get("is_active")?,
        average_rating: row.try_get("average_rating")?,
        review_count: row.try_get("review_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a ProductQuery) {
    builder.push(" WHERE p.is_active");
    if let Some(term) = query.search_term() {
        let pattern = like_pattern(term);
        builder
            .push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = query.category_filter() {
        builder.push(" AND LOWER(p.category) = LOWER(").push_bind(category).push(")");
    }
    if let Some(min) = query.min_price {
        builder.push(" AND p.price_cents >= ").push_bind(min);
    }
    if let Some(max) = query.max_price {
        builder.push(" AND p.price_cents <= ").push_bind(max);
    }
}

fn order_clause(sort: ProductSort) -> &'static str {
    match sort {
        ProductSort::Newest => " ORDER BY p.created_at DESC, p.id",
        ProductSort::PriceAsc => " ORDER BY p.price_cents ASC, p.id",
        ProductSort::PriceDesc => " ORDER BY p.price_cents DESC, p.id",
        ProductSort::Rating => " ORDER BY p.average_rating DESC, p.review_count DESC, p.id",
        ProductSort::Name => " ORDER BY p.name ASC, p.id",
    }
}

#[async_trait]
impl ProductRepository for PostgresClient {
    #[instrument(skip(self, product), fields(sku = %product.sku))]
    async fn create_product(&self, product: &Product) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, description, category, price_cents, currency,
                                  stock, image_url, is_active, average_rating, review_count,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.price_cents)
        .bind(&product.currency)
        .bind(product.stock)
        .bind(&product.image_url)
        .bind(product.is_active)
        .bind(product.average_rating)
        .bind(product.review_count)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, AppError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    #[instrument(skip(self, product), fields(product_id = %product.id))]
    async fn update_product(&self, product: &Product) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, category = $4, price_cents = $5,
                image_url = $6, is_active = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.price_cents)
        .bind(&product.image_url)
        .bind(product.is_active)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn list_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64), AppError> {
        let page = query.pagination();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
        push_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products p"));
        push_filters(&mut select, query);
        select
            .push(order_clause(query.sort))
            .push(" LIMIT ")
            .push_bind(i64::from(page.limit()))
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = select.build().fetch_all(&self.pool).await?;
        let products = rows
            .iter()
            .map(row_to_product)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((products, to_count(total)))
    }

    #[instrument(skip(self))]
    async fn list_categories(&self) -> Result<Vec<String>, AppError> {
        let categories = sqlx::query_scalar(
            "SELECT DISTINCT category FROM products WHERE is_active ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    #[instrument(skip(self))]
    async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<i32, AppError> {
        let updated: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1 AND stock + $2 >= 0
            RETURNING stock
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(stock) = updated {
            return Ok(stock);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Err(AppError::Validation(ValidationError::field(
                "delta",
                "stock cannot become negative",
            )))
        } else {
            Err(AppError::not_found(format!("Product {id}")))
        }
    }
}
