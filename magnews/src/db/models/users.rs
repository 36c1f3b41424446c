//! Database models for users.

use crate::types::{SubscriptionStatus, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Raw `users` row. `subscription_status` is parsed in the conversion to [`UserDBResponse`].
#[derive(Debug, Clone, FromRow)]
pub(crate) struct UserRow {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub billing_name: Option<String>,
    pub subscription_status: String,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub email: String,
    pub name: String,
    /// None for accounts created through Google sign-in
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
}

/// Database request for updating a user. `None` leaves a column unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub name: Option<String>,
    pub billing_name: Option<String>,
    pub password_hash: Option<String>,
}

/// Database response for a user
#[derive(Debug, Clone)]
pub struct UserDBResponse {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub billing_name: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for UserDBResponse {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            google_id: row.google_id,
            billing_name: row.billing_name,
            // The users_subscription_status_check constraint keeps this parse total
            subscription_status: row.subscription_status.parse().unwrap_or(SubscriptionStatus::Free),
            subscription_end_date: row.subscription_end_date,
            email_verified: row.email_verified,
            email_verification_token: row.email_verification_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
