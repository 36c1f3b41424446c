//! Database repository for password reset codes.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::password,
    db::{errors::Result, models::password_reset_tokens::PasswordResetToken},
    types::{UserId, abbrev_uuid},
};

pub struct PasswordResetTokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> PasswordResetTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// The user's reset code, if one exists and has not expired.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_active_for_user(&mut self, user_id: UserId) -> Result<Option<PasswordResetToken>> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT id, user_id, token, expires_at, created_at
            FROM password_reset_tokens
            WHERE user_id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(token)
    }

    /// Issue a reset code for a user, valid until `expires_at`.
    ///
    /// An unexpired code is reused so repeated requests mail the same code; its expiry is pushed out
    /// either way. Returns the code to send.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn issue_for_user(&mut self, user_id: UserId, expires_at: DateTime<Utc>) -> Result<PasswordResetToken> {
        let code = match self.get_active_for_user(user_id).await? {
            Some(existing) => existing.token,
            None => password::generate_reset_code(),
        };

        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (id, user_id, token, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
                SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
            RETURNING id, user_id, token, expires_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&code)
        .bind(expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    /// Look up an unexpired reset code.
    #[instrument(skip(self, token), err)]
    pub async fn find_valid(&mut self, token: &str) -> Result<Option<PasswordResetToken>> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT id, user_id, token, expires_at, created_at
            FROM password_reset_tokens
            WHERE token = $1 AND expires_at > NOW()
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(token)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn delete_for_user(&mut self, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
