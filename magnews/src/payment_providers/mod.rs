//! Payment provider abstraction layer
//!
//! This module defines the `PaymentProvider` trait which abstracts the subscription billing calls
//! the API makes: opening a checkout session, reading a subscription back, and turning a signed
//! webhook delivery into a [`WebhookEvent`]. Reconciling those events with local state lives in
//! [`crate::subscriptions`].

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::{api::models::users::CurrentUser, billingo::BillingCustomer, config::PaymentConfig, errors::Error, types::UserId};

pub mod dummy;
pub mod stripe;
pub mod webhook;

/// Create a payment provider from configuration
///
/// This is the single point where we convert config into provider instances.
/// Adding a new provider requires adding a match arm here.
pub fn create_provider(config: PaymentConfig) -> std::result::Result<Arc<dyn PaymentProvider>, Error> {
    let provider: Arc<dyn PaymentProvider> = match config {
        PaymentConfig::Stripe(stripe_config) => Arc::new(stripe::StripeProvider::new(stripe_config)?),
        PaymentConfig::Dummy(dummy_config) => Arc::new(dummy::DummyProvider::from(dummy_config)),
    };
    Ok(provider)
}

/// Result type for payment provider operations
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors that can occur during payment processing
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider API error: {0}")]
    ProviderApi(String),

    #[error("Payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid payment data: {0}")]
    InvalidData(String),
}

impl From<PaymentError> for Error {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidSignature(_) | PaymentError::InvalidData(_) => Error::BadRequest { message: err.to_string() },
            PaymentError::ProviderApi(_) | PaymentError::Http(_) => Error::Upstream {
                service: "Stripe".to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// A subscription as the provider currently sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: String,
    /// Provider status, e.g. `active`, `past_due`, `canceled`
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl SubscriptionInfo {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// A paid invoice, amounts in major currency units
#[derive(Debug, Clone)]
pub struct PaidInvoice {
    pub invoice_id: String,
    pub subscription_id: Option<String>,
    pub amount_paid: Decimal,
    pub tax: Decimal,
    /// Uppercase ISO 4217 code
    pub currency: String,
    pub customer: BillingCustomer,
}

/// What a verified webhook delivery asks us to do
#[derive(Debug, Clone)]
pub enum WebhookEventKind {
    CheckoutCompleted {
        user_id: Option<UserId>,
        subscription_id: Option<String>,
    },
    /// `customer.subscription.created` or `customer.subscription.updated`
    SubscriptionChanged(SubscriptionInfo),
    SubscriptionDeleted { subscription_id: String },
    PaymentSucceeded(PaidInvoice),
    PaymentFailed { subscription_id: Option<String> },
    /// Event types we do not act on
    Ignored,
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    /// Provider event type, e.g. `checkout.session.completed`
    pub event_type: String,
    pub kind: WebhookEventKind,
}

/// Abstract payment provider interface
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a subscription checkout session for `user`.
    ///
    /// Returns a URL that the user should be redirected to for payment. `success_url` may contain
    /// the `{CHECKOUT_SESSION_ID}` placeholder.
    async fn create_checkout_session(&self, user: &CurrentUser, success_url: &str, cancel_url: &str) -> Result<String>;

    /// Fetch the current state of a subscription
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionInfo>;

    /// Verify the signature of a raw webhook delivery and parse it
    ///
    /// Returns Err if validation fails (invalid signature, malformed data, etc.)
    fn parse_webhook(&self, headers: &HeaderMap, body: &str) -> Result<WebhookEvent>;
}
