use std::collections::BTreeMap;

use axum::Json;
use serde::Serialize;

const ENDPOINTS: &[(&str, &str)] = &[
    ("POST /api/auth/register", "Register new user"),
    ("POST /api/auth/login", "Login user"),
    ("GET /api/auth/me", "Get current user"),
    ("POST /api/auth/verify-email", "Verify email address"),
    ("POST /api/auth/password-reset", "Request password reset code"),
    ("GET /api/oauth/google/callback", "Sign in with Google"),
    ("GET /api/profile", "Get profile"),
    ("GET /api/comments?article_id={id}", "Get article comments"),
    ("POST /api/newsletter/subscribe", "Join the newsletter"),
    ("GET /api/subscription/status", "Check subscription status"),
    ("POST /api/subscription/checkout", "Create checkout session"),
    ("GET /api/content", "Get articles"),
    ("GET /api/content/{id}", "Get single article"),
    ("GET /api/config", "Get launch phase"),
    ("POST /api/webhook", "Payment webhook handler"),
];

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub status: String,
    pub endpoints: BTreeMap<String, String>,
}

/// Service name, version and a map of the main endpoints. Served at `/`, outside the API docs.
pub async fn get_index() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "Magicians News API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        endpoints: ENDPOINTS
            .iter()
            .map(|(route, description)| (route.to_string(), description.to_string()))
            .collect(),
    })
}
