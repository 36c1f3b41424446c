//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] covers every route mounted under `/api`. It is served as JSON at
//! `/api-docs/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, auth::stats_token::STATS_TOKEN_HEADER, errors::ErrorBody};

/// Security schemes: reader JWTs and the operator stats token.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "bearer_token".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token returned by register, login, verify-email or Google sign-in:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "stats_token".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    STATS_TOKEN_HEADER,
                    "Operator token for statistics and newsletter export. May also be passed as `?token=`.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Magicians News API",
        description = "Accounts, comments, newsletter, subscription billing and CMS content for Magicians News."
    ),
    servers((url = "/api")),
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::get_current_user,
        api::handlers::auth::verify_email,
        api::handlers::auth::resend_verification,
        api::handlers::auth::request_password_reset,
        api::handlers::auth::confirm_password_reset,
        api::handlers::oauth::google_callback,
        api::handlers::profile::get_profile,
        api::handlers::profile::update_profile,
        api::handlers::comments::list_comments,
        api::handlers::comments::create_comment,
        api::handlers::comments::update_comment,
        api::handlers::comments::delete_comment,
        api::handlers::newsletter::subscribe,
        api::handlers::newsletter::unsubscribe,
        api::handlers::newsletter::unsubscribe_by_token,
        api::handlers::newsletter::newsletter_stats,
        api::handlers::newsletter::export_subscribers,
        api::handlers::subscription::get_status,
        api::handlers::subscription::create_checkout,
        api::handlers::webhook::handle_webhook,
        api::handlers::content::get_content,
        api::handlers::content::get_article,
        api::handlers::stats::get_all_stats,
        api::handlers::stats::get_growth_stats,
        api::handlers::stats::get_summary_stats,
        api::handlers::config::get_config,
    ),
    components(schemas(ErrorBody)),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login, email verification, password reset and Google sign-in"),
        (name = "profile", description = "The signed-in reader's profile"),
        (name = "comments", description = "Article comment threads"),
        (name = "newsletter", description = "Newsletter membership"),
        (name = "subscription", description = "Paid subscription status, checkout and payment webhooks"),
        (name = "content", description = "Articles served from the CMS"),
        (name = "stats", description = "Operator statistics"),
        (name = "config", description = "Launch phase"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/comments/{id}"));
        assert!(doc.paths.paths.contains_key("/webhook"));

        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("bearer_token"));
        assert!(schemes.contains_key("stats_token"));
    }
}
