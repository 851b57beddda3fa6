use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Row, Transaction, postgres::PgRow};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{PostgresClient, like_pattern, parse_column, to_count};
use crate::domain::{
    AppError, ExternalIdentity, ExternalLoginOutcome, PaginationParams, RefreshToken, User,
    UserRepository,
};

const USER_COLUMNS: &str = "u.id, u.email, u.password_hash, u.display_name, u.phone, \
     u.avatar_url, u.role, u.is_active, u.created_at, u.updated_at, u.last_login_at";

fn row_to_user(row: &PgRow) -> Result<User, AppError> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        display_name: row.try_get("display_name")?,
        phone: row.try_get("phone")?,
        avatar_url: row.try_get("avatar_url")?,
        role: parse_column("role", &role)?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_login_at: row.try_get("last_login_at")?,
    })
}

fn row_to_refresh_token(row: &PgRow) -> Result<RefreshToken, AppError> {
    Ok(RefreshToken {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token_hash: row.try_get("token_hash")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        revoked_at: row.try_get("revoked_at")?,
        replaced_by: row.try_get("replaced_by")?,
    })
}

async fn insert_user(tx: &mut Transaction<'_, Postgres>, user: &User) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, display_name, phone, avatar_url,
                           role, is_active, created_at, updated_at, last_login_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.display_name)
    .bind(&user.phone)
    .bind(&user.avatar_url)
    .bind(user.role.as_str())
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.updated_at)
    .bind(user.last_login_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_token(
    tx: &mut Transaction<'_, Postgres>,
    token: &RefreshToken,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(token.id)
    .bind(token.user_id)
    .bind(&token.token_hash)
    .bind(token.expires_at)
    .bind(token.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl UserRepository for PostgresClient {
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        insert_user(&mut tx, user).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    #[instrument(skip(self))]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn update_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, display_name = $4, phone = $5,
                avatar_url = $6, role = $7, is_active = $8, updated_at = $9,
                last_login_at = $10
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.phone)
        .bind(&user.avatar_url)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.updated_at)
        .bind(user.last_login_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_users(
        &self,
        search: Option<&str>,
        page: &PaginationParams,
    ) -> Result<(Vec<User>, u64), AppError> {
        let pattern = search.map(like_pattern);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users
            WHERE $1::text IS NULL OR email ILIKE $1 OR display_name ILIKE $1
            "#,
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users u
            WHERE $1::text IS NULL OR u.email ILIKE $1 OR u.display_name ILIKE $1
            ORDER BY u.created_at DESC, u.id
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(&pattern)
            .bind(i64::from(page.limit()))
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()?;
        Ok((users, to_count(total)))
    }

    #[instrument(skip(self, token), fields(user_id = %token.user_id))]
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        insert_token(&mut tx, token).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, token_hash))]
    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at, revoked_at, replaced_by
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_refresh_token).transpose()
    }

    #[instrument(skip(self, replacement))]
    async fn rotate_refresh_token(
        &self,
        current_id: Uuid,
        replacement: &RefreshToken,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW(), replaced_by = $2
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(current_id)
        .bind(replacement.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if revoked == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_token(&mut tx, replacement).await?;
        tx.commit().await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn revoke_refresh_token(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn purge_refresh_tokens(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE expires_at < $1 OR revoked_at < $1",
        )
        .bind(before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, identity, candidate, token_hash), fields(provider = %identity.provider))]
    async fn upsert_external_login(
        &self,
        identity: &ExternalIdentity,
        candidate: &User,
        token_hash: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<ExternalLoginOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let linked_sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users u
            JOIN external_logins l ON l.user_id = u.id
            WHERE l.provider = $1 AND l.subject = $2
            FOR UPDATE OF u
            "#
        );
        let linked = sqlx::query(&linked_sql)
            .bind(&identity.provider)
            .bind(&identity.subject)
            .fetch_optional(&mut *tx)
            .await?;

        let mut created_user = false;
        let mut user = match linked {
            Some(row) => row_to_user(&row)?,
            None => {
                let by_email_sql =
                    format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1 FOR UPDATE");
                let existing = sqlx::query(&by_email_sql)
                    .bind(&candidate.email)
                    .fetch_optional(&mut *tx)
                    .await?;
                match existing {
                    Some(row) => row_to_user(&row)?,
                    None => {
                        insert_user(&mut tx, candidate).await?;
                        created_user = true;
                        candidate.clone()
                    }
                }
            }
        };

        if !user.is_active {
            tx.rollback().await?;
            return Ok(ExternalLoginOutcome {
                user,
                refresh_token: None,
                created_user: false,
                linked_login: false,
            });
        }

        let linked_login = sqlx::query(
            r#"
            INSERT INTO external_logins (provider, subject, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (provider, subject) DO NOTHING
            "#,
        )
        .bind(&identity.provider)
        .bind(&identity.subject)
        .bind(user.id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        let now = Utc::now();
        sqlx::query("UPDATE users SET last_login_at = $2, updated_at = $2 WHERE id = $1")
            .bind(user.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        user.last_login_at = Some(now);

        let token = RefreshToken::new(user.id, token_hash.to_string(), token_expires_at);
        insert_token(&mut tx, &token).await?;

        tx.commit().await?;

        if created_user || linked_login {
            info!(
                user_id = %user.id,
                created_user,
                linked_login,
                "External login linked"
            );
        }

        Ok(ExternalLoginOutcome {
            user,
            refresh_token: Some(token),
            created_user,
            linked_login,
        })
    }
}
