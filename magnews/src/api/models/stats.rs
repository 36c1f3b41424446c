//! Response shapes for the operator stats endpoints.

use crate::db::models::stats::ArticleCommentCount;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsTokenQuery {
    /// Operator secret; may also be sent as `X-Stats-Token`
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthMethodCounts {
    pub email: i64,
    pub google_oauth: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserStats {
    pub total: i64,
    pub new_last_30_days: i64,
    pub new_last_7_days: i64,
    pub by_auth_method: AuthMethodCounts,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionStats {
    pub active_subscribers: i64,
    pub free_users: i64,
    pub early_adopters: i64,
    /// Percentage of users with an active subscription
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ContentStats {
    pub articles: i64,
    pub videos: i64,
    pub daily_facts: i64,
    pub app_reviews: i64,
    pub total_content_pieces: i64,
    /// Set when the CMS could not be reached; all counts are zero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EngagementStats {
    pub total_comments: i64,
    pub comments_last_30_days: i64,
    pub comments_last_7_days: i64,
    pub active_commenters_30d: i64,
    pub top_articles_by_comments: Vec<ArticleCommentCount>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RevenueStats {
    pub total_invoices: i64,
    pub total_revenue: Decimal,
    pub revenue_last_30_days: Decimal,
    pub currency: String,
    pub estimated_mrr: Decimal,
    pub active_subscribers: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AllStats {
    pub generated_at: DateTime<Utc>,
    pub users: UserStats,
    pub subscriptions: SubscriptionStats,
    pub content: ContentStats,
    pub engagement: EngagementStats,
    pub revenue: RevenueStats,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserGrowth {
    pub this_month: i64,
    pub last_month: i64,
    /// Month-over-month change in signups, in percent
    pub growth_percentage: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GrowthStats {
    pub user_growth: UserGrowth,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SummaryStats {
    pub total_users: i64,
    pub active_subscribers: i64,
    pub total_content: i64,
    pub total_comments: i64,
    pub estimated_mrr: Decimal,
    pub generated_at: DateTime<Utc>,
}

/// Percentage `part / whole * 100` rounded to two decimals; zero when `whole` is zero.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

/// Change from `previous` to `current` in percent, rounded to two decimals; zero when there is no
/// previous value to compare against.
pub fn growth_percentage(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        return 0.0;
    }
    round2((current - previous) as f64 / previous as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(5, 5), 100.0);
    }

    #[test]
    fn test_growth_percentage() {
        assert_eq!(growth_percentage(10, 0), 0.0);
        assert_eq!(growth_percentage(15, 10), 50.0);
        assert_eq!(growth_percentage(5, 10), -50.0);
    }

    #[test]
    fn test_content_error_omitted_when_absent() {
        let json = serde_json::to_value(ContentStats::default()).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["daily_facts"], 0);
    }
}
