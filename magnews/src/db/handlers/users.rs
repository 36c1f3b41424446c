//! Database repository for users.

use std::collections::HashMap;

use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::users::{UserCreateDBRequest, UserDBResponse, UserRow, UserUpdateDBRequest},
};
use crate::types::{SubscriptionStatus, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, name, password_hash, google_id, billing_name, subscription_status, \
     subscription_end_date, email_verified, email_verification_token, created_at, updated_at";

/// Filter for listing users
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, name, password_hash, google_id, subscription_status,
                               email_verified, email_verification_token)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&request.email)
        .bind(&request.name)
        .bind(&request.password_hash)
        .bind(&request.google_id)
        .bind(SubscriptionStatus::Free.as_str())
        .bind(request.email_verified)
        .bind(&request.email_verification_token)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user.into())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let users = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(|u| (u.id, UserDBResponse::from(u))).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let users = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(users.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Atomic update with COALESCE: None leaves the column as it was
        let user = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                billing_name = COALESCE($3, billing_name),
                password_hash = COALESCE($4, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.name)
        .bind(&request.billing_name)
        .bind(&request.password_hash)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user.into())
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(Into::into))
    }

    /// Find the account a Google identity belongs to, matching on email first, then Google ID.
    #[instrument(skip(self, email, google_id), err)]
    pub async fn get_by_email_or_google_id(&mut self, email: &str, google_id: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE email = $1 OR google_id = $2
            ORDER BY (email = $1) DESC
            LIMIT 1
            "#
        ))
        .bind(email)
        .bind(google_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(user.map(Into::into))
    }

    #[instrument(skip(self, token), err)]
    pub async fn get_by_verification_token(&mut self, token: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email_verification_token = $1"
        ))
        .bind(token)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(user.map(Into::into))
    }

    /// Mark the email verified and consume the verification token.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_email_verified(&mut self, id: UserId) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET email_verified = TRUE, email_verification_token = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user.into())
    }

    #[instrument(skip(self, token), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn set_verification_token(&mut self, id: UserId, token: &str) -> Result<()> {
        sqlx::query("UPDATE users SET email_verification_token = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    /// Attach a Google identity to an existing account. Google has verified the address, so the
    /// account is marked verified as well.
    #[instrument(skip(self, google_id), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn link_google_account(&mut self, id: UserId, google_id: &str) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET google_id = $2, email_verified = TRUE, email_verification_token = NULL,
                             updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(google_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user.into())
    }

    /// Write the subscription state the billing reconciler settled on.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id), status = %status), err)]
    pub async fn set_subscription(
        &mut self,
        id: UserId,
        status: SubscriptionStatus,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET subscription_status = $2, subscription_end_date = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(end_date)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::DbError;
    use sqlx::PgPool;

    fn create_request(email: &str) -> UserCreateDBRequest {
        UserCreateDBRequest {
            email: email.to_string(),
            name: "Test Reader".to_string(),
            password_hash: Some("hash".to_string()),
            google_id: None,
            email_verified: false,
            email_verification_token: Some("a".repeat(64)),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("reader@example.com")).await.unwrap();
        assert_eq!(user.email, "reader@example.com");
        assert_eq!(user.name, "Test Reader");
        assert_eq!(user.subscription_status, SubscriptionStatus::Free);
        assert!(!user.email_verified);
        assert!(user.subscription_end_date.is_none());

        let fetched = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, user.email);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_email_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&create_request("dup@example.com")).await.unwrap();
        let err = repo.create(&create_request("dup@example.com")).await.unwrap_err();
        assert!(err.is_unique_violation_on("users_email_unique"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_verification_flow(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("verify@example.com")).await.unwrap();
        let token = user.email_verification_token.clone().unwrap();

        let found = repo.get_by_verification_token(&token).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        let verified = repo.mark_email_verified(user.id).await.unwrap();
        assert!(verified.email_verified);
        assert!(verified.email_verification_token.is_none());
        assert!(repo.get_by_verification_token(&token).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_keeps_unset_fields(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("update@example.com")).await.unwrap();
        let updated = repo
            .update(
                user.id,
                &UserUpdateDBRequest {
                    name: Some("New Name".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.password_hash.as_deref(), Some("hash"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_missing_user_is_not_found(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let result = repo.update(Uuid::new_v4(), &UserUpdateDBRequest::default()).await;
        assert!(matches!(result, Err(DbError::NotFound)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_google_lookup_and_link(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("google@example.com")).await.unwrap();

        let by_email = repo.get_by_email_or_google_id("google@example.com", "sub-1").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        let linked = repo.link_google_account(user.id, "sub-1").await.unwrap();
        assert_eq!(linked.google_id.as_deref(), Some("sub-1"));
        assert!(linked.email_verified);

        let by_sub = repo.get_by_email_or_google_id("other@example.com", "sub-1").await.unwrap().unwrap();
        assert_eq!(by_sub.id, user.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_set_subscription(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("sub@example.com")).await.unwrap();
        let end = Utc::now() + chrono::Duration::days(30);

        assert!(repo.set_subscription(user.id, SubscriptionStatus::Active, Some(end)).await.unwrap());
        let fetched = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.subscription_status, SubscriptionStatus::Active);
        assert_eq!(fetched.subscription_end_date.unwrap().timestamp(), end.timestamp());

        assert!(!repo.set_subscription(Uuid::new_v4(), SubscriptionStatus::Active, None).await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_and_bulk(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let a = repo.create(&create_request("a@example.com")).await.unwrap();
        let b = repo.create(&create_request("b@example.com")).await.unwrap();

        let all = repo.list(&UserFilter::new(0, 10)).await.unwrap();
        assert_eq!(all.len(), 2);

        let bulk = repo.get_bulk(vec![a.id, b.id]).await.unwrap();
        assert_eq!(bulk.len(), 2);
        assert_eq!(bulk[&a.id].email, "a@example.com");

        assert!(repo.delete(a.id).await.unwrap());
        assert!(repo.get_by_id(a.id).await.unwrap().is_none());
    }
}
