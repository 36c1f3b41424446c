use axum::{Json, extract::State, http::HeaderMap};

use crate::{AppState, api::models::ApiResponse, errors::Error, subscriptions::Reconciler};

const WEBHOOK_FAILED: &str = "Webhook failed";

/// Receive a payment provider webhook
///
/// The body must carry a valid `Stripe-Signature`. Any verification or processing failure answers
/// 400 so the provider retries the delivery.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body(content = String, description = "Raw event payload", content_type = "application/json"),
    tag = "subscription",
    responses(
        (status = 200, description = "Webhook handled"),
        (status = 400, description = "Webhook failed", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn handle_webhook(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<Json<ApiResponse<()>>, Error> {
    let Some(provider) = state.payments.as_deref() else {
        tracing::warn!("Webhook received but no payment provider is configured");
        return Err(Error::bad_request(WEBHOOK_FAILED));
    };

    let event = provider.parse_webhook(&headers, &body).map_err(|e| {
        tracing::warn!("Rejected webhook: {e}");
        Error::bad_request(WEBHOOK_FAILED)
    })?;

    let reconciler = Reconciler {
        db: &state.db,
        provider,
        billingo: state.billingo.as_deref(),
    };
    reconciler.apply(&event).await.map_err(|e| {
        tracing::error!("Failed to process webhook {}: {e:#}", event.id);
        Error::bad_request(WEBHOOK_FAILED)
    })?;

    Ok(Json(ApiResponse::message_only("Webhook handled")))
}

#[cfg(test)]
mod tests {
    use crate::{
        payment_providers::webhook::{SIGNATURE_HEADER, sign_payload},
        test_utils::{TEST_WEBHOOK_SECRET, create_test_app, create_test_user},
    };
    use axum::http::StatusCode;
    use chrono::Utc;
    use serde_json::{Value, json};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_checkout_webhook_activates_user(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, "reader@example.com").await;

        let body = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_1", "client_reference_id": user.id.to_string(), "subscription": "sub_1"}}
        })
        .to_string();
        let signature = sign_payload(TEST_WEBHOOK_SECRET, Utc::now().timestamp(), &body).unwrap();

        let response = server
            .post("/api/webhook")
            .add_header(SIGNATURE_HEADER, signature)
            .text(body)
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["message"], "Webhook handled");

        let status: String = sqlx::query_scalar("SELECT subscription_status FROM users WHERE id = $1")
            .bind(user.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "active");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_bad_signature_is_rejected(pool: PgPool) {
        let server = create_test_app(pool).await;
        let body = json!({"id": "evt_1", "type": "invoice.payment_failed", "data": {"object": {}}}).to_string();
        let signature = sign_payload("whsec_other", Utc::now().timestamp(), &body).unwrap();

        let response = server
            .post("/api/webhook")
            .add_header(SIGNATURE_HEADER, signature)
            .text(body.clone())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], "Webhook failed");

        server.post("/api/webhook").text(body).await.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unknown_event_type_is_acknowledged(pool: PgPool) {
        let server = create_test_app(pool).await;
        let body = json!({"id": "evt_2", "type": "customer.created", "data": {"object": {"id": "cus_1"}}}).to_string();
        let signature = sign_payload(TEST_WEBHOOK_SECRET, Utc::now().timestamp(), &body).unwrap();

        server
            .post("/api/webhook")
            .add_header(SIGNATURE_HEADER, signature)
            .text(body)
            .await
            .assert_status_ok();
    }
}
