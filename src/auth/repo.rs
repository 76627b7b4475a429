use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};
use crate::error::StoreError;

/// Persistence for user credentials. Lookups only ever return live
/// (non-soft-deleted) users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when a live user already has the email.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    /// Replaces the active password-reset token. Touches only the reset columns.
    async fn set_password_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Swaps in `password_hash` and clears the reset token, but only while
    /// `token` is still the active one. Fails with [`StoreError::NotFound`]
    /// once the token has been consumed or replaced.
    async fn consume_password_reset(
        &self,
        id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> Result<(), StoreError>;

    /// Flips an unverified user to verified and retires its verification token.
    /// Returns `None` when the user was already verified (or is gone).
    async fn mark_verified(&self, id: Uuid, token: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Matches both pending tokens and tokens already redeemed by a verification,
    /// so a repeated click can be told apart from an unknown token.
    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_password_reset_token(&self, token: &str)
        -> Result<Option<User>, StoreError>;

    /// Soft-deletes unverified users created before `cutoff`. Returns rows affected.
    async fn soft_delete_unverified_before(&self, cutoff: OffsetDateTime)
        -> Result<u64, StoreError>;

    /// Removes users soft-deleted before `cutoff`. Returns rows affected.
    async fn permanently_delete_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError>;
}

const USER_COLUMNS: &str = r#"
    id, email, password_hash, is_verified,
    verification_token, verification_expires_at, redeemed_verification_token,
    password_reset_token, password_reset_expires_at,
    first_name, last_name, school_name, skills,
    created_at, updated_at, deleted_at
"#;

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_live_by(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {column} = $1 AND deleted_at IS NULL LIMIT 1"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (email, password_hash, is_verified,
                               verification_token, verification_expires_at,
                               first_name, last_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.is_verified)
            .bind(&user.verification_token)
            .bind(user.verification_expires_at)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .fetch_one(&self.db)
            .await?;
        Ok(created)
    }

    async fn set_password_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET password_reset_token = $2,
                   password_reset_expires_at = $3,
                   updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn consume_password_reset(
        &self,
        id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $3,
                   password_reset_token = NULL,
                   password_reset_expires_at = NULL,
                   updated_at = now()
             WHERE id = $1
               AND password_reset_token = $2
               AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(password_hash)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid, token: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET is_verified = TRUE,
                   verification_token = NULL,
                   verification_expires_at = NULL,
                   redeemed_verification_token = $2,
                   updated_at = now()
             WHERE id = $1 AND is_verified = FALSE AND deleted_at IS NULL
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(token)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_live_by("email", email).await
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE (verification_token = $1 OR redeemed_verification_token = $1)
               AND deleted_at IS NULL
             LIMIT 1
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_password_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, StoreError> {
        self.find_live_by("password_reset_token", token).await
    }

    async fn soft_delete_unverified_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET deleted_at = now()
             WHERE is_verified = FALSE
               AND created_at < $1
               AND deleted_at IS NULL
            "#,
        )
        .bind(cutoff)
        .execute(&self.db)
        .await?;
        debug!(count = result.rows_affected(), "soft-deleted unverified users");
        Ok(result.rows_affected())
    }

    async fn permanently_delete_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
             WHERE deleted_at IS NOT NULL
               AND deleted_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.db)
        .await?;
        debug!(count = result.rows_affected(), "permanently deleted users");
        Ok(result.rows_affected())
    }
}
