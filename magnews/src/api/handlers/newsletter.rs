use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    api::models::{
        ApiResponse,
        newsletter::{
            ExportQuery, NewsletterExport, NewsletterResult, NewsletterStats, SubscribeRequest, SubscriptionOutcome, UnsubscribeRequest,
            UnsubscribeTokenQuery,
        },
    },
    auth::{password::generate_unsubscribe_token, stats_token::StatsAccess},
    db::{
        handlers::NewsletterSubscribers,
        models::newsletter::{NewsletterSubscriber, SubscriberCreateDBRequest},
    },
    email::{is_valid_address, normalize_address},
    errors::Error,
};

const DEFAULT_EXPORT_LIMIT: i64 = 100;
const MAX_EXPORT_LIMIT: i64 = 1000;

fn required_email(raw: &str) -> Result<String, Error> {
    let email = normalize_address(raw);
    if email.is_empty() {
        return Err(Error::bad_request("Email is required"));
    }
    Ok(email)
}

fn outcome_response(subscriber: &NewsletterSubscriber, outcome: SubscriptionOutcome) -> Json<ApiResponse<NewsletterResult>> {
    let result = NewsletterResult::new(&subscriber.email, outcome);
    let message = result.message.clone();
    Json(ApiResponse::with_message(result, message))
}

async fn unsubscribe_subscriber(state: &AppState, subscriber: Option<NewsletterSubscriber>) -> Result<Json<ApiResponse<NewsletterResult>>, Error> {
    let subscriber = subscriber.ok_or_else(|| Error::bad_request("Email not found"))?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let subscriber = NewsletterSubscribers::new(&mut conn).unsubscribe(subscriber.id).await?;
    tracing::info!("Newsletter subscriber {} unsubscribed", subscriber.id);

    Ok(outcome_response(&subscriber, SubscriptionOutcome::Unsubscribed))
}

/// Join the newsletter
#[utoipa::path(
    post,
    path = "/newsletter/subscribe",
    request_body = SubscribeRequest,
    tag = "newsletter",
    responses(
        (status = 200, description = "Subscribed, resubscribed, or already on the list", body = ApiResponse<NewsletterResult>),
        (status = 400, description = "Missing or invalid email", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all, fields(source = %request.source))]
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<ApiResponse<NewsletterResult>>, Error> {
    let email = required_email(&request.email)?;
    if !is_valid_address(&email) {
        return Err(Error::bad_request("Invalid email address"));
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut subscribers = NewsletterSubscribers::new(&mut conn);

    if let Some(existing) = subscribers.get_by_email(&email).await? {
        if existing.is_subscribed() {
            return Ok(outcome_response(&existing, SubscriptionOutcome::AlreadySubscribed));
        }
        let subscriber = subscribers.resubscribe(existing.id).await?;
        return Ok(outcome_response(&subscriber, SubscriptionOutcome::Resubscribed));
    }

    let name = request.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    let subscriber = subscribers
        .create(&SubscriberCreateDBRequest {
            email,
            name,
            source: request.source,
            unsubscribe_token: generate_unsubscribe_token(),
        })
        .await?;

    if let Err(e) = state
        .email
        .send_newsletter_confirmation(&subscriber.email, subscriber.name.as_deref(), &subscriber.unsubscribe_token)
        .await
    {
        tracing::warn!("Failed to send newsletter confirmation: {e}");
    }

    Ok(outcome_response(&subscriber, SubscriptionOutcome::Subscribed))
}

/// Leave the newsletter
#[utoipa::path(
    post,
    path = "/newsletter/unsubscribe",
    request_body = UnsubscribeRequest,
    tag = "newsletter",
    responses(
        (status = 200, description = "Unsubscribed", body = ApiResponse<NewsletterResult>),
        (status = 400, description = "Missing or unknown email", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<ApiResponse<NewsletterResult>>, Error> {
    let email = required_email(&request.email)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let subscriber = NewsletterSubscribers::new(&mut conn).get_by_email(&email).await?;
    drop(conn);

    unsubscribe_subscriber(&state, subscriber).await
}

/// One-click unsubscribe from the link in newsletter emails
#[utoipa::path(
    get,
    path = "/newsletter/unsubscribe",
    params(UnsubscribeTokenQuery),
    tag = "newsletter",
    responses(
        (status = 200, description = "Unsubscribed", body = ApiResponse<NewsletterResult>),
        (status = 400, description = "Unknown token", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn unsubscribe_by_token(
    State(state): State<AppState>,
    Query(query): Query<UnsubscribeTokenQuery>,
) -> Result<Json<ApiResponse<NewsletterResult>>, Error> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::bad_request("Unsubscribe token is required"))?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let subscriber = NewsletterSubscribers::new(&mut conn).get_by_token(&token).await?;
    drop(conn);

    unsubscribe_subscriber(&state, subscriber).await
}

/// Subscriber counts, overall and per signup source
#[utoipa::path(
    get,
    path = "/newsletter/stats",
    tag = "newsletter",
    responses(
        (status = 200, description = "Subscriber statistics", body = ApiResponse<NewsletterStats>),
        (status = 401, description = "Missing secret token", body = crate::errors::ErrorBody),
        (status = 403, description = "Invalid secret token", body = crate::errors::ErrorBody),
    ),
    security(("stats_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn newsletter_stats(State(state): State<AppState>, _: StatsAccess) -> Result<Json<ApiResponse<NewsletterStats>>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut subscribers = NewsletterSubscribers::new(&mut conn);
    let counts = subscribers.counts().await?;
    let by_source = subscribers.counts_by_source().await?;

    Ok(Json(ApiResponse::ok(NewsletterStats {
        total_subscribers: counts.total,
        new_last_30_days: counts.new_last_30_days,
        new_last_7_days: counts.new_last_7_days,
        by_source,
    })))
}

/// Page through active subscribers, newest first
#[utoipa::path(
    get,
    path = "/newsletter/export",
    params(ExportQuery),
    tag = "newsletter",
    responses(
        (status = 200, description = "A page of subscribers", body = ApiResponse<NewsletterExport>),
        (status = 401, description = "Missing secret token", body = crate::errors::ErrorBody),
        (status = 403, description = "Invalid secret token", body = crate::errors::ErrorBody),
    ),
    security(("stats_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn export_subscribers(
    State(state): State<AppState>,
    _: StatsAccess,
    Query(query): Query<ExportQuery>,
) -> Result<Json<ApiResponse<NewsletterExport>>, Error> {
    let limit = query.limit.unwrap_or(DEFAULT_EXPORT_LIMIT).clamp(1, MAX_EXPORT_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let subscribers = NewsletterSubscribers::new(&mut conn).export(limit, offset).await?;

    Ok(Json(ApiResponse::ok(NewsletterExport {
        count: subscribers.len(),
        subscribers,
    })))
}
