//! Stripe payment provider implementation

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::{Client, Response};
use serde::Deserialize;
use url::Url;

use crate::{
    api::models::users::CurrentUser,
    config::StripeConfig,
    errors::Error,
    payment_providers::{
        PaymentError, PaymentProvider, Result, SubscriptionInfo, WebhookEvent,
        webhook::{self, SubscriptionObject},
    },
};

/// Stripe payment provider
pub struct StripeProvider {
    client: Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> std::result::Result<Self, Error> {
        let client = Client::builder().build().map_err(|e| Error::Internal {
            operation: format!("create Stripe HTTP client: {e}"),
        })?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.config
            .api_base
            .join(path)
            .map_err(|e| PaymentError::ProviderApi(format!("invalid Stripe URL: {e}")))
    }

    /// Turn a non-2xx response into a ProviderApi error carrying Stripe's message.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or(body);
        Err(PaymentError::ProviderApi(format!("Stripe returned {status}: {message}")))
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_checkout_session(&self, user: &CurrentUser, success_url: &str, cancel_url: &str) -> Result<String> {
        let user_id = user.id.to_string();
        let params = [
            ("mode", "subscription"),
            ("line_items[0][price]", self.config.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("customer_email", user.email.as_str()),
            ("client_reference_id", user_id.as_str()),
            ("metadata[user_id]", user_id.as_str()),
            ("subscription_data[metadata][user_id]", user_id.as_str()),
        ];

        let response = self
            .client
            .post(self.endpoint("v1/checkout/sessions")?)
            .basic_auth(&self.config.api_key, None::<&str>)
            .form(&params)
            .send()
            .await?;

        let session: CheckoutSessionResponse = Self::check(response).await?.json().await?;
        tracing::info!("Created checkout session {} for user {}", session.id, user.id);

        session.url.ok_or_else(|| {
            tracing::error!("Checkout session {} missing URL", session.id);
            PaymentError::ProviderApi("Checkout session missing URL".to_string())
        })
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionInfo> {
        let mut url = self.endpoint("v1/subscriptions/")?;
        url.path_segments_mut()
            .map_err(|_| PaymentError::ProviderApi("invalid Stripe URL".to_string()))?
            .pop_if_empty()
            .push(subscription_id);

        let response = self
            .client
            .get(url)
            .basic_auth(&self.config.api_key, None::<&str>)
            .send()
            .await?;

        let subscription: SubscriptionObject = Self::check(response).await?.json().await?;
        Ok(subscription.into())
    }

    fn parse_webhook(&self, headers: &HeaderMap, body: &str) -> Result<WebhookEvent> {
        webhook::verify_and_parse(&self.config.webhook_secret, headers, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment_providers::WebhookEventKind;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, header_exists, method, path},
    };

    fn provider_for(server: &MockServer) -> StripeProvider {
        crate::test_utils::install_crypto_provider();
        StripeProvider::new(StripeConfig {
            api_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test".to_string(),
            price_id: "price_monthly".to_string(),
            api_base: Url::parse(&format!("{}/", server.uri())).unwrap(),
        })
        .unwrap()
    }

    fn test_user() -> CurrentUser {
        CurrentUser {
            id: uuid::Uuid::new_v4(),
            email: "reader@example.com".to_string(),
            name: "Reader".to_string(),
            subscription_status: crate::types::SubscriptionStatus::Free,
            subscription_end_date: None,
            email_verified: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_checkout_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header_exists("authorization"))
            .and(body_string_contains("mode=subscription"))
            .and(body_string_contains("price_monthly"))
            .and(body_string_contains("client_reference_id"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "cs_1", "url": "https://checkout.stripe.com/c/cs_1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = provider_for(&server)
            .create_checkout_session(&test_user(), "https://site/success", "https://site/cancel")
            .await
            .unwrap();
        assert_eq!(url, "https://checkout.stripe.com/c/cs_1");
    }

    #[tokio::test]
    async fn test_checkout_error_surfaces_stripe_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "No such price"}})))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .create_checkout_session(&test_user(), "https://site/success", "https://site/cancel")
            .await
            .unwrap_err();
        assert!(matches!(&err, PaymentError::ProviderApi(msg) if msg.contains("No such price")));
    }

    #[tokio::test]
    async fn test_retrieve_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/subscriptions/sub_42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "sub_42",
                "status": "active",
                "current_period_end": 1_900_000_000
            })))
            .mount(&server)
            .await;

        let info = provider_for(&server).retrieve_subscription("sub_42").await.unwrap();
        assert!(info.is_active());
        assert_eq!(info.current_period_end.unwrap().timestamp(), 1_900_000_000);
    }

    #[tokio::test]
    async fn test_parse_webhook_uses_signing_secret() {
        let server = MockServer::start().await;
        let provider = provider_for(&server);
        let body = json!({"id": "evt_1", "type": "invoice.payment_failed", "data": {"object": {"subscription": "sub_1"}}}).to_string();

        let mut headers = HeaderMap::new();
        let signature = webhook::sign_payload("whsec_test", Utc::now().timestamp(), &body).unwrap();
        headers.insert(webhook::SIGNATURE_HEADER, signature.parse().unwrap());
        let event = provider.parse_webhook(&headers, &body).unwrap();
        assert!(matches!(event.kind, WebhookEventKind::PaymentFailed { .. }));

        let forged = webhook::sign_payload("whsec_other", Utc::now().timestamp(), &body).unwrap();
        headers.insert(webhook::SIGNATURE_HEADER, forged.parse().unwrap());
        assert!(provider.parse_webhook(&headers, &body).is_err());
    }
}
