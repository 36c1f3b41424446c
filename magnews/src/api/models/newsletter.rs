//! API request/response models for the newsletter list.

use crate::db::models::newsletter::{SourceCount, SubscriberExportRow};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_SOURCE: &str = "homepage";

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Where on the site the signup came from
    #[serde(default = "default_source")]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnsubscribeRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UnsubscribeTokenQuery {
    /// Token from the unsubscribe link in a newsletter email
    pub token: Option<String>,
}

/// Outcome of a subscribe or unsubscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionOutcome {
    Subscribed,
    Resubscribed,
    AlreadySubscribed,
    Unsubscribed,
}

impl SubscriptionOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            SubscriptionOutcome::Subscribed => "Thank you for subscribing!",
            SubscriptionOutcome::Resubscribed => "Welcome back! You've been resubscribed.",
            SubscriptionOutcome::AlreadySubscribed => "You're already on the list!",
            SubscriptionOutcome::Unsubscribed => "You've been unsubscribed.",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewsletterResult {
    pub email: String,
    pub status: SubscriptionOutcome,
    pub message: String,
}

impl NewsletterResult {
    pub fn new(email: impl Into<String>, status: SubscriptionOutcome) -> Self {
        Self {
            email: email.into(),
            status,
            message: status.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NewsletterStats {
    pub total_subscribers: i64,
    pub new_last_30_days: i64,
    pub new_last_7_days: i64,
    pub by_source: Vec<SourceCount>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// Maximum rows to return (default 100)
    pub limit: Option<i64>,
    /// Rows to skip (default 0)
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NewsletterExport {
    pub subscribers: Vec<SubscriberExportRow>,
    pub count: usize,
}
