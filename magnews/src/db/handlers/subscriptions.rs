//! Database repository for the local mirror of Stripe subscriptions.

use sqlx::PgConnection;
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::subscriptions::{SubscriptionRecord, SubscriptionUpsertDBRequest},
};
use crate::types::{UserId, abbrev_uuid};
use chrono::{DateTime, Utc};

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, stripe_subscription_id, status, current_period_end, created_at, updated_at";

pub struct Subscriptions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Subscriptions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert or replace the user's subscription row. A user has at most one.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn upsert_for_user(&mut self, request: &SubscriptionUpsertDBRequest) -> Result<SubscriptionRecord> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(&format!(
            r#"
            INSERT INTO subscriptions (user_id, stripe_subscription_id, status, current_period_end)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                status = EXCLUDED.status,
                current_period_end = EXCLUDED.current_period_end,
                updated_at = NOW()
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(request.user_id)
        .bind(&request.stripe_subscription_id)
        .bind(&request.status)
        .bind(request.current_period_end)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(record)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_stripe_id(&mut self, stripe_subscription_id: &str) -> Result<Option<SubscriptionRecord>> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE stripe_subscription_id = $1"
        ))
        .bind(stripe_subscription_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(record)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_for_user(&mut self, user_id: UserId) -> Result<Option<SubscriptionRecord>> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(record)
    }

    /// Record Stripe's latest status for a known subscription. Returns the row, or None if the
    /// subscription has never been seen.
    #[instrument(skip(self), err)]
    pub async fn update_status(
        &mut self,
        stripe_subscription_id: &str,
        status: &str,
        current_period_end: Option<DateTime<Utc>>,
    ) -> Result<Option<SubscriptionRecord>> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(&format!(
            r#"
            UPDATE subscriptions
            SET status = $2, current_period_end = COALESCE($3, current_period_end), updated_at = NOW()
            WHERE stripe_subscription_id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(stripe_subscription_id)
        .bind(status)
        .bind(current_period_end)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(record)
    }
}
