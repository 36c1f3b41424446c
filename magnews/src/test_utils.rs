//! Test utilities shared by handler, extractor and reconciler tests.

use crate::{
    AppState, build_router,
    auth::{
        password::{self, Argon2Params},
        session,
    },
    config::{Config, DummyConfig, EmailTransportConfig, PasswordConfig, PaymentConfig, StatsConfig},
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
};
use axum_test::TestServer;
use sqlx::PgPool;

/// Password every [`create_test_user`] account is created with.
pub const TEST_PASSWORD: &str = "correct-horse-battery";
pub const TEST_STATS_TOKEN: &str = "test-stats-token";
/// Signing secret of the dummy payment provider in [`create_test_config`].
pub const TEST_WEBHOOK_SECRET: &str = "whsec_dummy";

/// Cheap Argon2 parameters so tests do not spend seconds hashing.
fn test_password_config() -> PasswordConfig {
    PasswordConfig {
        min_length: 8,
        max_length: 128,
        argon2_memory_kib: 128,
        argon2_iterations: 1,
        argon2_parallelism: 1,
    }
}

/// Tests never run `main`, so the rustls provider reqwest needs is installed here.
pub fn install_crypto_provider() {
    // Err means another test in this process already installed it
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

pub fn create_test_config() -> Config {
    install_crypto_provider();
    // Use temp directory for test emails; delivery is disabled unless a test turns it on
    let temp_dir = std::env::temp_dir().join(format!("magnews-test-emails-{}", std::process::id()));

    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        frontend_url: "http://localhost:3000".to_string(),
        backend_url: "http://localhost:3001".to_string(),
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        payment: Some(PaymentConfig::Dummy(DummyConfig {
            webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
            period: std::time::Duration::from_secs(30 * 24 * 60 * 60),
        })),
        stats: StatsConfig {
            secret_token: Some(TEST_STATS_TOKEN.to_string()),
        },
        phase: 3,
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    };
    config.auth.password = test_password_config();
    config.email.enabled = false;
    config.email.transport = EmailTransportConfig::File {
        path: temp_dir.to_string_lossy().to_string(),
    };
    config
}

pub fn create_test_state(pool: PgPool) -> AppState {
    AppState::from_config(pool, create_test_config()).expect("Failed to create test state")
}

pub async fn create_test_app(pool: PgPool) -> TestServer {
    create_test_app_with_config(pool, create_test_config()).await
}

pub async fn create_test_app_with_config(pool: PgPool, config: Config) -> TestServer {
    let state = AppState::from_config(pool, config).expect("Failed to create test state");
    let router = build_router(&state).expect("Failed to build router");
    TestServer::new(router.into_make_service()).expect("Failed to create test server")
}

/// A verified reader on the free plan, named after their email, with password [`TEST_PASSWORD`].
pub async fn create_test_user(pool: &PgPool, email: &str) -> UserDBResponse {
    let params = Argon2Params::from(&test_password_config());
    let password_hash = password::hash_string_with_params(TEST_PASSWORD, Some(params)).expect("Failed to hash test password");

    let mut conn = pool.acquire().await.expect("Failed to acquire database connection");
    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            email: email.to_string(),
            name: email.to_string(),
            password_hash: Some(password_hash),
            google_id: None,
            email_verified: true,
            email_verification_token: None,
        })
        .await
        .expect("Failed to create test user")
}

/// A session token for `user` signed with the test secret.
pub fn bearer_token(user: &UserDBResponse) -> String {
    session::create_session_token(user.id, &user.email, false, &create_test_config()).expect("Failed to create session token")
}
