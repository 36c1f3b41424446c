//! Dummy payment provider implementation
//!
//! Checkout completes instantly: the returned URL is the success URL itself. Subscriptions are
//! always active for the configured period. Webhook deliveries are verified and parsed exactly as
//! Stripe's are, using the dummy signing secret, so the whole reconciliation path can run without
//! network access.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};

use crate::{
    api::models::users::CurrentUser,
    config::DummyConfig,
    payment_providers::{PaymentProvider, Result, SubscriptionInfo, WebhookEvent, webhook},
};

pub struct DummyProvider {
    config: DummyConfig,
}

impl From<DummyConfig> for DummyProvider {
    fn from(config: DummyConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PaymentProvider for DummyProvider {
    async fn create_checkout_session(&self, user: &CurrentUser, success_url: &str, _cancel_url: &str) -> Result<String> {
        let session_id = format!("dummy_session_{}_{}", user.id, uuid::Uuid::new_v4());
        tracing::info!("Dummy provider created checkout session {} for user {}", session_id, user.id);
        Ok(success_url.replace("{CHECKOUT_SESSION_ID}", &session_id))
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionInfo> {
        let period = Duration::from_std(self.config.period).unwrap_or_else(|_| Duration::days(30));
        Ok(SubscriptionInfo {
            id: subscription_id.to_string(),
            status: "active".to_string(),
            current_period_end: Some(Utc::now() + period),
        })
    }

    fn parse_webhook(&self, headers: &HeaderMap, body: &str) -> Result<WebhookEvent> {
        webhook::verify_and_parse(&self.config.webhook_secret, headers, body)
    }
}
