//! Aggregates read by the operator stats endpoints.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, FromRow)]
pub struct UserCounts {
    pub total: i64,
    pub new_last_30_days: i64,
    pub new_last_7_days: i64,
    pub email_auth: i64,
    pub google_auth: i64,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct SubscriptionCounts {
    pub active: i64,
    pub free: i64,
    pub early_adopters: i64,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct CommentCounts {
    pub total: i64,
    pub last_30_days: i64,
    pub last_7_days: i64,
    pub active_commenters_30d: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ArticleCommentCount {
    pub article_id: String,
    pub comment_count: i64,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct RevenueTotals {
    pub total_invoices: i64,
    pub total_revenue: Decimal,
    pub revenue_last_30_days: Decimal,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct MonthlySignups {
    pub this_month: i64,
    pub last_month: i64,
}
