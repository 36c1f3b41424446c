//! # magnews: Magicians News API
//!
//! `magnews` is the backend of a subscription news site for magicians. It manages reader
//! accounts, article comment threads, the newsletter mailing list, and paid subscriptions, and it
//! proxies article content from a headless CMS.
//!
//! ## Overview
//!
//! Readers register with email and password or sign in with Google, verify their address, and
//! receive a JWT used as a bearer token on every authenticated request. Signed-in readers can
//! comment on articles, edit a comment for 30 minutes after posting it, and delete it, leaving a
//! placeholder so replies keep their place in the thread.
//!
//! Subscriptions are sold through a hosted Stripe Checkout. Stripe then reports what happened
//! through signed webhooks, which [`subscriptions::Reconciler`] turns into local subscription state
//! and, for paid invoices, into Billingo invoices for the reader.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! uses PostgreSQL for all persistence.
//!
//! ### Core Components
//!
//! The **API layer** ([`api`]) exposes a JSON API under `/api`. Every response uses the
//! `{"success", "message", "data"}` envelope, and every error the `{"success": false, "error"}`
//! one.
//!
//! The **authentication layer** ([`auth`]) issues and verifies session JWTs, hashes passwords
//! with Argon2, drives Google OAuth, and guards the operator endpoints with a shared token.
//!
//! The **database layer** ([`db`]) uses the repository pattern to abstract data access. Each
//! table has a repository that owns its SQL.
//!
//! **External collaborators** are wrapped in their own modules: [`cms`] for articles,
//! [`payment_providers`] for checkout and webhooks, [`billingo`] for invoicing, and [`email`] for
//! transactional mail.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use magnews::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = magnews::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     magnews::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod billingo;
pub mod cms;
pub mod config;
pub mod db;
pub mod email;
pub mod errors;
mod openapi;
pub mod payment_providers;
pub mod phase;
pub mod subscriptions;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    auth::google::GoogleOAuthClient, billingo::BillingoClient, cms::CmsClient, config::CorsOrigin, email::EmailService,
    openapi::ApiDoc, payment_providers::PaymentProvider,
};
use axum::{
    Json, Router,
    http::{self, HeaderValue},
    routing::{get, post, put},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::UserId;

/// Application state shared across all request handlers.
///
/// # Fields
///
/// - `db`: PostgreSQL connection pool
/// - `config`: Application configuration loaded from file and environment
/// - `email`: Transactional mail sender (logs instead of sending when disabled)
/// - `cms`: Client for the headless CMS
/// - `payments`: Checkout and webhook provider, absent when payments are not configured
/// - `billingo`: Invoicing client, absent when Billingo is not configured
/// - `google`: Google OAuth client, absent when Google sign-in is not configured
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .email(Arc::new(email))
///     .cms(Arc::new(cms))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub email: Arc<EmailService>,
    pub cms: Arc<CmsClient>,
    pub payments: Option<Arc<dyn PaymentProvider>>,
    pub billingo: Option<Arc<BillingoClient>>,
    pub google: Option<Arc<GoogleOAuthClient>>,
}

impl AppState {
    /// Construct every collaborator the configuration asks for.
    pub fn from_config(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let email = Arc::new(EmailService::new(&config)?);
        let cms = Arc::new(CmsClient::new(&config.cms)?);
        let payments = config.payment.clone().map(payment_providers::create_provider).transpose()?;
        let billingo = config.billingo.as_ref().map(BillingoClient::new).transpose()?.map(Arc::new);
        let google = config
            .google_oauth
            .as_ref()
            .map(|google| GoogleOAuthClient::new(google, &config))
            .transpose()?
            .map(Arc::new);

        if payments.is_none() {
            info!("No payment provider configured, checkout and webhooks are disabled");
        }

        Ok(Self::builder()
            .db(db)
            .email(email)
            .cms(cms)
            .maybe_payments(payments)
            .maybe_billingo(billingo)
            .maybe_google(google)
            .config(config)
            .build())
    }
}

/// Get the magnews database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect to Postgres with the configured pool settings and run migrations.
#[instrument(skip_all)]
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("database_url is not configured"))?;
    let settings = &config.database;

    let optional = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(optional(settings.idle_timeout_secs))
        .max_lifetime(optional(settings.max_lifetime_secs))
        .connect(database_url)
        .await?;

    migrator().run(&pool).await?;
    info!("Database migrations applied");

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.cors;
    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(cors_config.allow_credentials)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::PUT, http::Method::DELETE, http::Method::OPTIONS])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// This function constructs the complete Axum router with:
/// - The JSON API under `/api`
/// - OpenAPI JSON and the Scalar documentation UI
/// - Optional Prometheus metrics at `/internal/metrics`
/// - CORS configuration
/// - Tracing middleware
///
/// # Errors
///
/// Returns an error if CORS configuration is invalid.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers;

    let api_routes = Router::new()
        .route("/config", get(handlers::config::get_config))
        // Accounts
        .route("/auth", get(handlers::auth::get_current_user))
        .route("/auth/me", get(handlers::auth::get_current_user))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/verify-email", post(handlers::auth::verify_email))
        .route("/auth/resend-verification", post(handlers::auth::resend_verification))
        .route("/auth/password-reset", post(handlers::auth::request_password_reset))
        .route("/auth/password-reset/confirm", post(handlers::auth::confirm_password_reset))
        .route("/oauth/google/callback", get(handlers::oauth::google_callback))
        .route("/profile", get(handlers::profile::get_profile).put(handlers::profile::update_profile))
        // Comments
        .route("/comments", get(handlers::comments::list_comments).post(handlers::comments::create_comment))
        .route(
            "/comments/{id}",
            put(handlers::comments::update_comment).delete(handlers::comments::delete_comment),
        )
        // Newsletter
        .route("/newsletter/subscribe", post(handlers::newsletter::subscribe))
        .route(
            "/newsletter/unsubscribe",
            post(handlers::newsletter::unsubscribe).get(handlers::newsletter::unsubscribe_by_token),
        )
        .route("/newsletter/stats", get(handlers::newsletter::newsletter_stats))
        .route("/newsletter/export", get(handlers::newsletter::export_subscribers))
        // Billing
        .route("/subscription/status", get(handlers::subscription::get_status))
        .route("/subscription/checkout", post(handlers::subscription::create_checkout))
        .route("/webhook", post(handlers::webhook::handle_webhook))
        // Content
        .route("/content", get(handlers::content::get_content))
        .route("/content/{id}", get(handlers::content::get_article))
        // Operator statistics
        .route("/stats", get(handlers::stats::get_all_stats))
        .route("/stats/growth", get(handlers::stats::get_growth_stats))
        .route("/stats/summary", get(handlers::stats::get_summary_stats))
        .with_state(state.clone());

    let router = Router::new()
        .route("/", get(handlers::index::get_index))
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    // Create CORS layer from config
    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    // Add Prometheus metrics if enabled
    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    // Add tracing layer
    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The assembled service: database pool, shared state and router.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] connects to Postgres, runs migrations, and builds the
///    collaborators the configuration enables
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, in-flight requests finish, the pool is
///    closed, and pending spans are flushed
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting magnews with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let app_state = AppState::from_config(pool.clone(), config.clone())?;
        let router = build_router(&app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "magnews listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        // Run the server with graceful shutdown
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Close database connections
        info!("Closing database connections...");
        self.pool.close().await;

        // Shutdown telemetry
        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
