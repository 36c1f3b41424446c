//! Database models for newsletter subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, FromRow)]
pub struct NewsletterSubscriber {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub source: String,
    /// `subscribed` or `unsubscribed`
    pub status: String,
    pub unsubscribe_token: String,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

impl NewsletterSubscriber {
    pub fn is_subscribed(&self) -> bool {
        self.status == "subscribed"
    }
}

#[derive(Debug, Clone)]
pub struct SubscriberCreateDBRequest {
    pub email: String,
    pub name: Option<String>,
    pub source: String,
    pub unsubscribe_token: String,
}

/// Row shape returned by the export endpoint.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct SubscriberExportRow {
    pub email: String,
    pub name: Option<String>,
    pub source: String,
    pub subscribed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct SourceCount {
    pub source: String,
    pub count: i64,
}
