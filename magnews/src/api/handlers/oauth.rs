//! Google sign-in. Every outcome is a redirect back to the frontend.

use axum::{
    extract::{Query, State},
    response::Redirect,
};

use crate::{
    AppState,
    api::models::auth::OAuthCallbackQuery,
    auth::{
        google::{GoogleOAuthClient, GoogleUserInfo},
        session,
    },
    db::{
        handlers::{Repository, Users},
        models::users::UserCreateDBRequest,
    },
    email::{is_valid_address, normalize_address},
    errors::Error,
};

/// Find the account for a Google identity, linking or creating it as needed.
async fn sign_in(state: &AppState, google: &GoogleOAuthClient, code: &str) -> Result<String, Error> {
    let info: GoogleUserInfo = google.fetch_user(code).await.map_err(|e| Error::Upstream {
        service: "Google".to_string(),
        message: e.to_string(),
    })?;
    let email = normalize_address(info.email.as_deref().unwrap_or_default());
    if !is_valid_address(&email) {
        return Err(Error::Upstream {
            service: "Google".to_string(),
            message: "Google account has no usable email address".to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut tx);

    let user = match users.get_by_email_or_google_id(&email, &info.sub).await? {
        Some(user) if user.google_id.is_some() => user,
        Some(user) => {
            tracing::info!("Linking Google account to existing user {}", user.id);
            users.link_google_account(user.id, &info.sub).await?
        }
        None => {
            let user = users
                .create(&UserCreateDBRequest {
                    email,
                    name: info.display_name(),
                    password_hash: None,
                    google_id: Some(info.sub.clone()),
                    email_verified: true,
                    email_verification_token: None,
                })
                .await?;
            tracing::info!("Created user {} from Google sign-in", user.id);
            user
        }
    };
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    session::create_session_token(user.id, &user.email, true, &state.config)
}

/// Google OAuth callback
///
/// Without a `code` the reader is sent to Google's consent screen. With one, the code is exchanged
/// for the Google profile, the matching account is found, linked, or created, and the reader is
/// redirected to `{frontend}/oauth/callback?token=<jwt>`. Failures redirect to
/// `{frontend}/login?error=oauth_failed`.
#[utoipa::path(
    get,
    path = "/oauth/google/callback",
    params(OAuthCallbackQuery),
    tag = "auth",
    responses(
        (status = 303, description = "Redirect to Google or back to the frontend"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn google_callback(State(state): State<AppState>, Query(query): Query<OAuthCallbackQuery>) -> Redirect {
    let frontend = state.config.frontend_base();

    let Some(google) = state.google.as_deref() else {
        tracing::warn!("Google sign-in attempted but OAuth is not configured");
        return Redirect::to(&format!("{frontend}/login?error=oauth_not_configured"));
    };

    if let Some(error) = query.error {
        tracing::info!("Google consent was not granted: {error}");
        return Redirect::to(&format!("{frontend}/login?error=oauth_failed"));
    }

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return Redirect::to(google.authorization_url().as_str());
    };

    match sign_in(&state, google, &code).await {
        Ok(token) => Redirect::to(&format!("{frontend}/oauth/callback?token={token}")),
        Err(e) => {
            tracing::error!("Google sign-in failed: {e}");
            Redirect::to(&format!("{frontend}/login?error=oauth_failed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        auth::session::verify_session_token,
        config::GoogleOAuthConfig,
        test_utils::{create_test_app, create_test_app_with_config, create_test_config, create_test_user},
    };
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;
    use url::Url;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    async fn mock_google(sub: &str, email: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sub": sub, "email": email, "name": "Dai Vernon"})))
            .mount(&server)
            .await;
        server
    }

    fn google_config(server: &MockServer) -> crate::config::Config {
        let mut config = create_test_config();
        config.google_oauth = Some(GoogleOAuthConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: None,
            auth_url: Url::parse("https://accounts.example.com/auth").unwrap(),
            token_url: Url::parse(&format!("{}/token", server.uri())).unwrap(),
            userinfo_url: Url::parse(&format!("{}/userinfo", server.uri())).unwrap(),
        });
        config
    }

    fn location(response: &axum_test::TestResponse) -> String {
        response.header("location").to_str().unwrap().to_string()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_not_configured_redirects_to_login(pool: PgPool) {
        let server = create_test_app(pool).await;
        let response = server.get("/api/oauth/google/callback").add_query_param("code", "c").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert!(location(&response).ends_with("/login?error=oauth_not_configured"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_without_code_redirects_to_google(pool: PgPool) {
        let google = mock_google("g-1", "vernon@example.com").await;
        let server = create_test_app_with_config(pool, google_config(&google)).await;

        let response = server.get("/api/oauth/google/callback").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert!(location(&response).starts_with("https://accounts.example.com/auth?"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_creates_verified_user(pool: PgPool) {
        let google = mock_google("g-1", "Vernon@Example.com").await;
        let config = google_config(&google);
        let server = create_test_app_with_config(pool.clone(), config.clone()).await;

        let response = server.get("/api/oauth/google/callback").add_query_param("code", "c").await;
        response.assert_status(StatusCode::SEE_OTHER);
        let location = location(&response);
        let (_, token) = location.split_once("/oauth/callback?token=").unwrap();
        let claims = verify_session_token(token, &config).unwrap();
        assert_eq!(claims.email, "vernon@example.com");
        assert_eq!(claims.exp - claims.iat, config.auth.remember_me_expiry.as_secs() as i64);

        let (name, verified, google_id): (String, bool, Option<String>) =
            sqlx::query_as("SELECT name, email_verified, google_id FROM users WHERE email = $1")
                .bind("vernon@example.com")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(name, "Dai Vernon");
        assert!(verified);
        assert_eq!(google_id.as_deref(), Some("g-1"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_links_existing_account(pool: PgPool) {
        let existing = create_test_user(&pool, "vernon@example.com").await;
        let google = mock_google("g-2", "vernon@example.com").await;
        let server = create_test_app_with_config(pool.clone(), google_config(&google)).await;

        let response = server.get("/api/oauth/google/callback").add_query_param("code", "c").await;
        assert!(location(&response).contains("/oauth/callback?token="));

        let google_id: Option<String> = sqlx::query_scalar("SELECT google_id FROM users WHERE id = $1")
            .bind(existing.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(google_id.as_deref(), Some("g-2"));
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&pool).await.unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_exchange_failure_redirects_with_error(pool: PgPool) {
        let google = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&google)
            .await;
        let server = create_test_app_with_config(pool, google_config(&google)).await;

        let response = server.get("/api/oauth/google/callback").add_query_param("code", "bad").await;
        assert!(location(&response).ends_with("/login?error=oauth_failed"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_google_account_with_blank_email_is_rejected(pool: PgPool) {
        sqlx::query("INSERT INTO users (id, email, name, google_id, email_verified) VALUES ($1, '', 'Earlier', 'g-old', true)")
            .bind(uuid::Uuid::new_v4())
            .execute(&pool)
            .await
            .unwrap();

        let google = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at"})))
            .mount(&google)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sub": "g-new", "email": "   ", "name": "No Mail"})))
            .mount(&google)
            .await;
        let server = create_test_app_with_config(pool.clone(), google_config(&google)).await;

        let response = server.get("/api/oauth/google/callback").add_query_param("code", "c").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert!(location(&response).ends_with("/login?error=oauth_failed"));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&pool).await.unwrap();
        assert_eq!(count, 1);
    }
}
