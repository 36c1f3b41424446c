use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::{
        ApiResponse,
        subscription::{CheckoutResponse, SubscriptionStatusResponse},
        users::CurrentUser,
    },
    errors::Error,
    subscriptions,
};

/// Whether the signed-in reader has a paid subscription
#[utoipa::path(
    get,
    path = "/subscription/status",
    tag = "subscription",
    responses(
        (status = 200, description = "Subscription status", body = ApiResponse<SubscriptionStatusResponse>),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorBody),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn get_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ApiResponse<SubscriptionStatusResponse>>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let is_subscribed = subscriptions::is_subscribed(
        &mut conn,
        current_user.id,
        current_user.subscription_status,
        current_user.subscription_end_date,
    )
    .await?;

    Ok(Json(ApiResponse::ok(SubscriptionStatusResponse { is_subscribed })))
}

/// Start a hosted checkout for the monthly subscription
#[utoipa::path(
    post,
    path = "/subscription/checkout",
    tag = "subscription",
    responses(
        (status = 200, description = "Checkout URL to redirect the reader to", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Payments are not configured", body = crate::errors::ErrorBody),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorBody),
        (status = 500, description = "Payment provider error", body = crate::errors::ErrorBody),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn create_checkout(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ApiResponse<CheckoutResponse>>, Error> {
    let provider = state
        .payments
        .as_ref()
        .ok_or_else(|| Error::bad_request("Payments are not configured"))?;

    let frontend = state.config.frontend_base();
    let success_url = format!("{frontend}/subscription/success?session_id={{CHECKOUT_SESSION_ID}}");
    let cancel_url = format!("{frontend}/subscription/cancel");

    let checkout_url = provider.create_checkout_session(&current_user, &success_url, &cancel_url).await?;
    tracing::info!("Created checkout session for user {}", current_user.id);

    Ok(Json(ApiResponse::ok(CheckoutResponse { checkout_url })))
}
