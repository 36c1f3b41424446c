//! Google OAuth2 authorization-code client.

use rand::prelude::RngExt;
use rand::rng;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::{
    config::{Config, GoogleOAuthConfig},
    errors::Error,
};

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Google request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Google returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },

    #[error("Google account has no email address")]
    MissingEmail,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// The subset of the OpenID userinfo document used to find or create an account.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
}

impl GoogleUserInfo {
    /// Display name for a new account: full name, then given name, then "User".
    pub fn display_name(&self) -> String {
        [&self.name, &self.given_name]
            .into_iter()
            .flatten()
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
            .unwrap_or("User")
            .to_string()
    }
}

pub struct GoogleOAuthClient {
    client: Client,
    config: GoogleOAuthConfig,
    redirect_uri: String,
}

impl GoogleOAuthClient {
    pub fn new(config: &GoogleOAuthConfig, app_config: &Config) -> Result<Self, Error> {
        let redirect_uri = config
            .redirect_uri
            .clone()
            .unwrap_or_else(|| format!("{}/api/oauth/google/callback", app_config.backend_base()));
        let client = Client::builder().build().map_err(|e| Error::Internal {
            operation: format!("build Google OAuth client: {e}"),
        })?;

        Ok(Self {
            client,
            config: config.clone(),
            redirect_uri,
        })
    }

    /// Consent screen URL asking for the `email` and `profile` scopes.
    pub fn authorization_url(&self) -> Url {
        let mut state_bytes = [0u8; 16];
        rng().fill(&mut state_bytes);
        let state = hex::encode(state_bytes);
        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", "email profile")
            .append_pair("state", &state)
            .append_pair("access_type", "online");
        url
    }

    /// Exchange an authorization code for the signed-in Google account.
    #[instrument(skip_all, err)]
    pub async fn fetch_user(&self, code: &str) -> Result<GoogleUserInfo, OAuthError> {
        let response = self
            .client
            .post(self.config.token_url.clone())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = Self::check(response).await?.json().await?;

        let response = self
            .client
            .get(self.config.userinfo_url.clone())
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        let user: GoogleUserInfo = Self::check(response).await?.json().await?;

        if user.email.as_deref().is_none_or(str::is_empty) {
            return Err(OAuthError::MissingEmail);
        }
        Ok(user)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, OAuthError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(OAuthError::Status { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, header, method, path},
    };

    fn client_for(server: &MockServer) -> GoogleOAuthClient {
        let config = GoogleOAuthConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: None,
            auth_url: Url::parse("https://accounts.example.com/auth").unwrap(),
            token_url: Url::parse(&format!("{}/token", server.uri())).unwrap(),
            userinfo_url: Url::parse(&format!("{}/userinfo", server.uri())).unwrap(),
        };
        let app_config = Config {
            backend_url: "https://api.example.com/".to_string(),
            ..Default::default()
        };
        crate::test_utils::install_crypto_provider();
        GoogleOAuthClient::new(&config, &app_config).unwrap()
    }

    #[tokio::test]
    async fn test_authorization_url() {
        let server = MockServer::start().await;
        let url = client_for(&server).authorization_url();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["client_id"], "client-id");
        assert_eq!(pairs["scope"], "email profile");
        assert_eq!(pairs["redirect_uri"], "https://api.example.com/api/oauth/google/callback");
        assert_eq!(pairs["state"].len(), 32);
    }

    #[tokio::test]
    async fn test_fetch_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at-1", "token_type": "Bearer"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "google-123",
                "email": "magician@example.com",
                "given_name": "Harry"
            })))
            .mount(&server)
            .await;

        let user = client_for(&server).fetch_user("auth-code").await.unwrap();
        assert_eq!(user.sub, "google-123");
        assert_eq!(user.display_name(), "Harry");
    }

    #[tokio::test]
    async fn test_fetch_user_rejected_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_user("bad").await.unwrap_err();
        assert!(matches!(err, OAuthError::Status { .. }));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut info = GoogleUserInfo {
            sub: "1".to_string(),
            email: None,
            name: Some("  ".to_string()),
            given_name: None,
        };
        assert_eq!(info.display_name(), "User");
        info.name = Some("Dai Vernon".to_string());
        assert_eq!(info.display_name(), "Dai Vernon");
    }
}
