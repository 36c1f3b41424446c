//! API request/response models for readers and their profiles.

use crate::db::models::users::UserDBResponse;
use crate::types::{SubscriptionStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The authenticated reader, resolved from a Bearer token by the [`FromRequestParts`] impl in
/// [`crate::auth::current_user`].
///
/// [`FromRequestParts`]: axum::extract::FromRequestParts
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub subscription_status: SubscriptionStatus,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserDBResponse> for CurrentUser {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            name: db.name,
            subscription_status: db.subscription_status,
            subscription_end_date: db.subscription_end_date,
            email_verified: db.email_verified,
            created_at: db.created_at,
        }
    }
}

/// Public view of a user account
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub subscription_status: SubscriptionStatus,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            name: db.name,
            subscription_status: db.subscription_status,
            subscription_end_date: db.subscription_end_date,
            email_verified: db.email_verified,
            created_at: db.created_at,
        }
    }
}

impl From<CurrentUser> for UserResponse {
    fn from(user: CurrentUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            subscription_status: user.subscription_status,
            subscription_end_date: user.subscription_end_date,
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

/// Profile as shown on the account page
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub billing_name: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<UserDBResponse> for ProfileResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            name: db.name,
            billing_name: db.billing_name,
            subscription_status: db.subscription_status,
            subscription_end_date: db.subscription_end_date,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    /// Name printed on invoices. Left unchanged when omitted.
    #[serde(default)]
    pub billing_name: Option<String>,
}
