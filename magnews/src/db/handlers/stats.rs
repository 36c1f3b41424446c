//! Read-only aggregate queries behind the operator stats endpoints.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::stats::{ArticleCommentCount, CommentCounts, MonthlySignups, RevenueTotals, SubscriptionCounts, UserCounts},
};

pub struct Stats<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Stats<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn user_counts(&mut self) -> Result<UserCounts> {
        let counts = sqlx::query_as::<_, UserCounts>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '30 days') AS new_last_30_days,
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '7 days') AS new_last_7_days,
                COUNT(*) FILTER (WHERE google_id IS NULL) AS email_auth,
                COUNT(*) FILTER (WHERE google_id IS NOT NULL) AS google_auth
            FROM users
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;

        Ok(counts)
    }

    /// Active and non-active user counts. Early adopters are active users who signed up before
    /// `early_adopter_cutoff`.
    #[instrument(skip(self), err)]
    pub async fn subscription_counts(&mut self, early_adopter_cutoff: DateTime<Utc>) -> Result<SubscriptionCounts> {
        let counts = sqlx::query_as::<_, SubscriptionCounts>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE subscription_status = 'active') AS active,
                COUNT(*) FILTER (WHERE subscription_status <> 'active') AS free,
                COUNT(*) FILTER (WHERE subscription_status = 'active' AND created_at < $1) AS early_adopters
            FROM users
            "#,
        )
        .bind(early_adopter_cutoff)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(counts)
    }

    #[instrument(skip(self), err)]
    pub async fn comment_counts(&mut self) -> Result<CommentCounts> {
        let counts = sqlx::query_as::<_, CommentCounts>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '30 days') AS last_30_days,
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '7 days') AS last_7_days,
                COUNT(DISTINCT user_id) FILTER (WHERE created_at >= NOW() - INTERVAL '30 days') AS active_commenters_30d
            FROM comments
            WHERE NOT is_deleted
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;

        Ok(counts)
    }

    #[instrument(skip(self), err)]
    pub async fn top_articles_by_comments(&mut self, limit: i64) -> Result<Vec<ArticleCommentCount>> {
        let rows = sqlx::query_as::<_, ArticleCommentCount>(
            r#"
            SELECT article_id, COUNT(*) AS comment_count
            FROM comments
            WHERE NOT is_deleted
            GROUP BY article_id
            ORDER BY comment_count DESC, article_id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }

    #[instrument(skip(self), err)]
    pub async fn revenue_totals(&mut self) -> Result<RevenueTotals> {
        let totals = sqlx::query_as::<_, RevenueTotals>(
            r#"
            SELECT
                COUNT(*) AS total_invoices,
                COALESCE(SUM(amount) FILTER (WHERE status = 'paid'), 0) AS total_revenue,
                COALESCE(SUM(amount) FILTER (WHERE status = 'paid' AND created_at >= NOW() - INTERVAL '30 days'), 0)
                    AS revenue_last_30_days
            FROM invoices
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;

        Ok(totals)
    }

    /// Signups in the current calendar month and in the previous one.
    #[instrument(skip(self), err)]
    pub async fn monthly_signups(&mut self) -> Result<MonthlySignups> {
        let counts = sqlx::query_as::<_, MonthlySignups>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE created_at >= date_trunc('month', NOW())) AS this_month,
                COUNT(*) FILTER (
                    WHERE created_at >= date_trunc('month', NOW()) - INTERVAL '1 month'
                      AND created_at < date_trunc('month', NOW())
                ) AS last_month
            FROM users
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;

        Ok(counts)
    }
}
