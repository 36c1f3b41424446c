//! Database models for the local mirror of Stripe subscriptions.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRecord {
    pub id: i64,
    pub user_id: UserId,
    pub stripe_subscription_id: String,
    /// Stripe's own status string (`active`, `past_due`, `canceled`, ...)
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionUpsertDBRequest {
    pub user_id: UserId,
    pub stripe_subscription_id: String,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
}
