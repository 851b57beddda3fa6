use async_trait::async_trait;
use sqlx::{Postgres, Row, Transaction, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use super::{PostgresClient, to_count};
use crate::domain::{Address, AddressRepository, AppError};

const ADDRESS_COLUMNS: &str = "id, user_id, recipient, line1, line2, city, state, postal_code, \
     country, phone, is_default, created_at, updated_at";

fn row_to_address(row: &PgRow) -> Result<Address, AppError> {
    Ok(Address {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        recipient: row.try_get("recipient")?,
        line1: row.try_get("line1")?,
        line2: row.try_get("line2")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        postal_code: row.try_get("postal_code")?,
        country: row.try_get("country")?,
        phone: row.try_get("phone")?,
        is_default: row.try_get("is_default")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Clear the default flag on every other address of the user.
async fn demote_others(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    keep: Uuid,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE addresses SET is_default = FALSE WHERE user_id = $1 AND id <> $2 AND is_default",
    )
    .bind(user_id)
    .bind(keep)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl AddressRepository for PostgresClient {
    #[instrument(skip(self))]
    async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<Address>, AppError> {
        let sql = format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE user_id = $1 \
             ORDER BY is_default DESC, created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_address).collect()
    }

    #[instrument(skip(self))]
    async fn get_address(&self, user_id: Uuid, id: Uuid) -> Result<Option<Address>, AppError> {
        let sql = format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1 AND user_id = $2");
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_address).transpose()
    }

    #[instrument(skip(self, address), fields(address_id = %address.id))]
    async fn insert_address(&self, address: &Address, limit: usize) -> Result<Address, AppError> {
        let mut tx = self.pool.begin().await?;

        // Concurrent inserts for one user queue behind this lock
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(address.user_id)
            .execute(&mut *tx)
            .await?;
        let held: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM addresses WHERE user_id = $1")
            .bind(address.user_id)
            .fetch_one(&mut *tx)
            .await?;
        let held = to_count(held);
        if held >= limit as u64 {
            tx.rollback().await?;
            return Err(AppError::conflict(format!(
                "An account can hold at most {limit} addresses"
            )));
        }

        let mut address = address.clone();
        if held == 0 {
            address.is_default = true;
        }
        if address.is_default {
            demote_others(&mut tx, address.user_id, address.id).await?;
        }
        sqlx::query(
            r#"
            INSERT INTO addresses (id, user_id, recipient, line1, line2, city, state, postal_code,
                                   country, phone, is_default, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(address.id)
        .bind(address.user_id)
        .bind(&address.recipient)
        .bind(&address.line1)
        .bind(&address.line2)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(&address.phone)
        .bind(address.is_default)
        .bind(address.created_at)
        .bind(address.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(address)
    }

    #[instrument(skip(self, address), fields(address_id = %address.id))]
    async fn update_address(&self, address: &Address) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        if address.is_default {
            demote_others(&mut tx, address.user_id, address.id).await?;
        }
        let result = sqlx::query(
            r#"
            UPDATE addresses
            SET recipient = $3, line1 = $4, line2 = $5, city = $6, state = $7,
                postal_code = $8, country = $9, phone = $10, is_default = $11, updated_at = $12
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(address.id)
        .bind(address.user_id)
        .bind(&address.recipient)
        .bind(&address.line1)
        .bind(&address.line2)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(&address.phone)
        .bind(address.is_default)
        .bind(address.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        let was_default: Option<bool> = sqlx::query_scalar(
            "DELETE FROM addresses WHERE id = $1 AND user_id = $2 RETURNING is_default",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(was_default) = was_default else {
            tx.rollback().await?;
            return Ok(false);
        };

        if was_default {
            sqlx::query(
                r#"
                UPDATE addresses SET is_default = TRUE, updated_at = NOW()
                WHERE id = (
                    SELECT id FROM addresses WHERE user_id = $1
                    ORDER BY created_at DESC LIMIT 1
                )
                "#,
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn set_default_address(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        demote_others(&mut tx, user_id, id).await?;
        let result = sqlx::query(
            "UPDATE addresses SET is_default = TRUE, updated_at = NOW() WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }
}
