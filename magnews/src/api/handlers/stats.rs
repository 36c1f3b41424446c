//! Operator statistics. Every endpoint here requires the stats token.

use axum::{Json, extract::State};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::{
    AppState,
    api::models::{
        ApiResponse,
        stats::{
            AllStats, AuthMethodCounts, ContentStats, EngagementStats, GrowthStats, RevenueStats, StatsTokenQuery, SubscriptionStats,
            SummaryStats, UserGrowth, UserStats, growth_percentage, percentage,
        },
    },
    auth::stats_token::StatsAccess,
    cms::{CONTENT_COLLECTIONS, CmsClient},
    db::handlers::Stats,
    errors::Error,
};

const TOP_ARTICLES: i64 = 5;
const REVENUE_CURRENCY: &str = "EUR";
/// Monthly price used for the MRR estimate, in euros.
const MRR_PER_SUBSCRIBER: Decimal = Decimal::ONE;
/// 2026-01-01T00:00:00Z as seconds since the epoch.
const EARLY_ADOPTER_CUTOFF_SECS: i64 = 1_767_225_600;

fn early_adopter_cutoff() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + Duration::seconds(EARLY_ADOPTER_CUTOFF_SECS)
}

fn estimated_mrr(active_subscribers: i64) -> Decimal {
    Decimal::from(active_subscribers) * MRR_PER_SUBSCRIBER
}

/// Collection sizes from the CMS. A CMS failure yields zeros and the error message.
async fn content_stats(cms: &CmsClient) -> ContentStats {
    let [articles, videos, daily_facts, app_reviews] = CONTENT_COLLECTIONS;
    let totals = futures::try_join!(
        cms.collection_total(articles),
        cms.collection_total(videos),
        cms.collection_total(daily_facts),
        cms.collection_total(app_reviews),
    );

    match totals {
        Ok((articles, videos, daily_facts, app_reviews)) => {
            ContentStats {
                articles,
                videos,
                daily_facts,
                app_reviews,
                total_content_pieces: articles + videos + daily_facts + app_reviews,
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!("Content stats unavailable: {e}");
            ContentStats {
                error: Some(e.to_string()),
                ..Default::default()
            }
        }
    }
}

/// Everything: users, subscriptions, content, engagement and revenue
#[utoipa::path(
    get,
    path = "/stats",
    params(StatsTokenQuery),
    tag = "stats",
    responses(
        (status = 200, description = "Full statistics", body = ApiResponse<AllStats>),
        (status = 401, description = "Missing secret token", body = crate::errors::ErrorBody),
        (status = 403, description = "Invalid secret token", body = crate::errors::ErrorBody),
    ),
    security(("stats_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_all_stats(State(state): State<AppState>, _: StatsAccess) -> Result<Json<ApiResponse<AllStats>>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut stats = Stats::new(&mut conn);

    let users = stats.user_counts().await?;
    let subscriptions = stats.subscription_counts(early_adopter_cutoff()).await?;
    let comments = stats.comment_counts().await?;
    let top_articles = stats.top_articles_by_comments(TOP_ARTICLES).await?;
    let revenue = stats.revenue_totals().await?;
    drop(conn);

    let content = content_stats(&state.cms).await;

    Ok(Json(ApiResponse::ok(AllStats {
        generated_at: Utc::now(),
        users: UserStats {
            total: users.total,
            new_last_30_days: users.new_last_30_days,
            new_last_7_days: users.new_last_7_days,
            by_auth_method: AuthMethodCounts {
                email: users.email_auth,
                google_oauth: users.google_auth,
            },
        },
        subscriptions: SubscriptionStats {
            active_subscribers: subscriptions.active,
            free_users: subscriptions.free,
            early_adopters: subscriptions.early_adopters,
            conversion_rate: percentage(subscriptions.active, users.total),
        },
        content,
        engagement: EngagementStats {
            total_comments: comments.total,
            comments_last_30_days: comments.last_30_days,
            comments_last_7_days: comments.last_7_days,
            active_commenters_30d: comments.active_commenters_30d,
            top_articles_by_comments: top_articles,
        },
        revenue: RevenueStats {
            total_invoices: revenue.total_invoices,
            total_revenue: revenue.total_revenue,
            revenue_last_30_days: revenue.revenue_last_30_days,
            currency: REVENUE_CURRENCY.to_string(),
            estimated_mrr: estimated_mrr(subscriptions.active),
            active_subscribers: subscriptions.active,
        },
    })))
}

/// Signups this calendar month against last month
#[utoipa::path(
    get,
    path = "/stats/growth",
    params(StatsTokenQuery),
    tag = "stats",
    responses(
        (status = 200, description = "Month over month growth", body = ApiResponse<GrowthStats>),
        (status = 401, description = "Missing secret token", body = crate::errors::ErrorBody),
        (status = 403, description = "Invalid secret token", body = crate::errors::ErrorBody),
    ),
    security(("stats_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_growth_stats(State(state): State<AppState>, _: StatsAccess) -> Result<Json<ApiResponse<GrowthStats>>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let signups = Stats::new(&mut conn).monthly_signups().await?;

    Ok(Json(ApiResponse::ok(GrowthStats {
        user_growth: UserGrowth {
            this_month: signups.this_month,
            last_month: signups.last_month,
            growth_percentage: growth_percentage(signups.this_month, signups.last_month),
        },
    })))
}

/// Headline numbers for a dashboard tile
#[utoipa::path(
    get,
    path = "/stats/summary",
    params(StatsTokenQuery),
    tag = "stats",
    responses(
        (status = 200, description = "Summary statistics", body = ApiResponse<SummaryStats>),
        (status = 401, description = "Missing secret token", body = crate::errors::ErrorBody),
        (status = 403, description = "Invalid secret token", body = crate::errors::ErrorBody),
    ),
    security(("stats_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_summary_stats(State(state): State<AppState>, _: StatsAccess) -> Result<Json<ApiResponse<SummaryStats>>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut stats = Stats::new(&mut conn);
    let users = stats.user_counts().await?;
    let subscriptions = stats.subscription_counts(early_adopter_cutoff()).await?;
    let comments = stats.comment_counts().await?;
    drop(conn);

    let content = content_stats(&state.cms).await;

    Ok(Json(ApiResponse::ok(SummaryStats {
        total_users: users.total,
        active_subscribers: subscriptions.active,
        total_content: content.total_content_pieces,
        total_comments: comments.total,
        estimated_mrr: estimated_mrr(subscriptions.active),
        generated_at: Utc::now(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_STATS_TOKEN, bearer_token, create_test_app, create_test_app_with_config, create_test_config, create_test_user};
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use sqlx::PgPool;
    use url::Url;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path_regex},
    };

    #[test]
    fn test_early_adopter_cutoff() {
        assert_eq!(early_adopter_cutoff().to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_token_checks(pool: PgPool) {
        let server = create_test_app(pool).await;

        let response = server.get("/api/stats/summary").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["error"], "Missing secret token");

        let response = server.get("/api/stats/summary").add_query_param("token", "nope").await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json::<Value>()["error"], "Invalid secret token");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unconfigured_token_rejects_everything(pool: PgPool) {
        let mut config = create_test_config();
        config.stats.secret_token = None;
        let server = create_test_app_with_config(pool, config).await;

        server
            .get("/api/stats/growth")
            .add_header("x-stats-token", "anything")
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_all_stats(pool: PgPool) {
        let cms = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/(articles|videos|daily-facts|apps)$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"docs": [], "totalDocs": 3})))
            .mount(&cms)
            .await;
        let mut config = create_test_config();
        config.cms.url = Url::parse(&cms.uri()).unwrap();
        let server = create_test_app_with_config(pool.clone(), config).await;

        let subscriber = create_test_user(&pool, "paid@example.com").await;
        let reader = create_test_user(&pool, "free@example.com").await;
        sqlx::query("UPDATE users SET subscription_status = 'active' WHERE id = $1")
            .bind(subscriber.id)
            .execute(&pool)
            .await
            .unwrap();
        server
            .post("/api/comments")
            .authorization_bearer(bearer_token(&reader))
            .json(&json!({"article_id": "a1", "content": "First!"}))
            .await
            .assert_status_ok();

        let response = server.get("/api/stats").add_query_param("token", TEST_STATS_TOKEN).await;
        response.assert_status_ok();
        let data = response.json::<Value>()["data"].clone();

        assert_eq!(data["users"]["total"], 2);
        assert_eq!(data["users"]["by_auth_method"]["email"], 2);
        assert_eq!(data["subscriptions"]["active_subscribers"], 1);
        assert_eq!(data["subscriptions"]["free_users"], 1);
        assert_eq!(data["subscriptions"]["conversion_rate"], 50.0);
        assert_eq!(data["content"]["total_content_pieces"], 12);
        assert!(data["content"].get("error").is_none());
        assert_eq!(data["engagement"]["total_comments"], 1);
        assert_eq!(data["engagement"]["top_articles_by_comments"][0]["article_id"], "a1");
        assert_eq!(data["revenue"]["currency"], "EUR");
        assert_eq!(data["revenue"]["estimated_mrr"], "1");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_summary_survives_cms_outage(pool: PgPool) {
        let cms = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&cms)
            .await;
        let mut config = create_test_config();
        config.cms.url = Url::parse(&cms.uri()).unwrap();
        let server = create_test_app_with_config(pool.clone(), config).await;
        create_test_user(&pool, "reader@example.com").await;

        let response = server.get("/api/stats/summary").add_header("x-stats-token", TEST_STATS_TOKEN).await;
        response.assert_status_ok();
        let data = response.json::<Value>()["data"].clone();
        assert_eq!(data["total_users"], 1);
        assert_eq!(data["total_content"], 0);

        let response = server.get("/api/stats/growth").add_header("x-stats-token", TEST_STATS_TOKEN).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["user_growth"]["this_month"], 1);
    }
}
