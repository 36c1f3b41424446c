//! Database repository for newsletter subscribers.

use sqlx::PgConnection;
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::newsletter::{NewsletterSubscriber, SourceCount, SubscriberCreateDBRequest, SubscriberExportRow},
};

const SUBSCRIBER_COLUMNS: &str = "id, email, name, source, status, unsubscribe_token, subscribed_at, unsubscribed_at";

/// Subscribed-row counts for the newsletter stats endpoint.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct SubscriberCounts {
    pub total: i64,
    pub new_last_30_days: i64,
    pub new_last_7_days: i64,
}

pub struct NewsletterSubscribers<'c> {
    db: &'c mut PgConnection,
}

impl<'c> NewsletterSubscribers<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(source = %request.source), err)]
    pub async fn create(&mut self, request: &SubscriberCreateDBRequest) -> Result<NewsletterSubscriber> {
        let subscriber = sqlx::query_as::<_, NewsletterSubscriber>(&format!(
            r#"
            INSERT INTO newsletter_subscribers (email, name, source, unsubscribe_token)
            VALUES ($1, $2, $3, $4)
            RETURNING {SUBSCRIBER_COLUMNS}
            "#
        ))
        .bind(&request.email)
        .bind(&request.name)
        .bind(&request.source)
        .bind(&request.unsubscribe_token)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(subscriber)
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<NewsletterSubscriber>> {
        let subscriber = sqlx::query_as::<_, NewsletterSubscriber>(&format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM newsletter_subscribers WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(subscriber)
    }

    #[instrument(skip(self, token), err)]
    pub async fn get_by_token(&mut self, token: &str) -> Result<Option<NewsletterSubscriber>> {
        let subscriber = sqlx::query_as::<_, NewsletterSubscriber>(&format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM newsletter_subscribers WHERE unsubscribe_token = $1"
        ))
        .bind(token)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(subscriber)
    }

    /// Flip an unsubscribed row back to subscribed, restarting its `subscribed_at`.
    #[instrument(skip(self), err)]
    pub async fn resubscribe(&mut self, id: i64) -> Result<NewsletterSubscriber> {
        let subscriber = sqlx::query_as::<_, NewsletterSubscriber>(&format!(
            r#"
            UPDATE newsletter_subscribers
            SET status = 'subscribed', subscribed_at = NOW(), unsubscribed_at = NULL
            WHERE id = $1
            RETURNING {SUBSCRIBER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(subscriber)
    }

    #[instrument(skip(self), err)]
    pub async fn unsubscribe(&mut self, id: i64) -> Result<NewsletterSubscriber> {
        let subscriber = sqlx::query_as::<_, NewsletterSubscriber>(&format!(
            r#"
            UPDATE newsletter_subscribers
            SET status = 'unsubscribed', unsubscribed_at = COALESCE(unsubscribed_at, NOW())
            WHERE id = $1
            RETURNING {SUBSCRIBER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(subscriber)
    }

    #[instrument(skip(self), err)]
    pub async fn counts(&mut self) -> Result<SubscriberCounts> {
        let counts = sqlx::query_as::<_, SubscriberCounts>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE subscribed_at >= NOW() - INTERVAL '30 days') AS new_last_30_days,
                COUNT(*) FILTER (WHERE subscribed_at >= NOW() - INTERVAL '7 days') AS new_last_7_days
            FROM newsletter_subscribers
            WHERE status = 'subscribed'
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;

        Ok(counts)
    }

    #[instrument(skip(self), err)]
    pub async fn counts_by_source(&mut self) -> Result<Vec<SourceCount>> {
        let rows = sqlx::query_as::<_, SourceCount>(
            r#"
            SELECT source, COUNT(*) AS count
            FROM newsletter_subscribers
            WHERE status = 'subscribed'
            GROUP BY source
            ORDER BY count DESC, source ASC
            "#,
        )
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }

    /// Subscribed rows, newest first.
    #[instrument(skip(self), err)]
    pub async fn export(&mut self, limit: i64, offset: i64) -> Result<Vec<SubscriberExportRow>> {
        let rows = sqlx::query_as::<_, SubscriberExportRow>(
            r#"
            SELECT email, name, source, subscribed_at
            FROM newsletter_subscribers
            WHERE status = 'subscribed'
            ORDER BY subscribed_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn request(email: &str, source: &str) -> SubscriberCreateDBRequest {
        SubscriberCreateDBRequest {
            email: email.to_string(),
            name: None,
            source: source.to_string(),
            unsubscribe_token: format!("token-{email}"),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_subscribe_unsubscribe_resubscribe(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = NewsletterSubscribers::new(&mut conn);

        let created = repo.create(&request("fan@example.com", "homepage")).await.unwrap();
        assert!(created.is_subscribed());

        let by_token = repo.get_by_token("token-fan@example.com").await.unwrap().unwrap();
        assert_eq!(by_token.id, created.id);

        let gone = repo.unsubscribe(created.id).await.unwrap();
        assert!(!gone.is_subscribed());
        assert!(gone.unsubscribed_at.is_some());

        let back = repo.resubscribe(created.id).await.unwrap();
        assert!(back.is_subscribed());
        assert!(back.unsubscribed_at.is_none());
        assert!(back.subscribed_at >= created.subscribed_at);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_email_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = NewsletterSubscribers::new(&mut conn);

        repo.create(&request("dup@example.com", "homepage")).await.unwrap();
        let mut second = request("dup@example.com", "footer");
        second.unsubscribe_token = "other-token".to_string();
        let err = repo.create(&second).await.unwrap_err();
        assert!(err.is_unique_violation_on("newsletter_subscribers_email_unique"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_counts_and_export_skip_unsubscribed(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = NewsletterSubscribers::new(&mut conn);

        repo.create(&request("a@example.com", "homepage")).await.unwrap();
        repo.create(&request("b@example.com", "homepage")).await.unwrap();
        let c = repo.create(&request("c@example.com", "article")).await.unwrap();
        repo.unsubscribe(c.id).await.unwrap();

        let counts = repo.counts().await.unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.new_last_7_days, 2);
        assert_eq!(counts.new_last_30_days, 2);

        let by_source = repo.counts_by_source().await.unwrap();
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].source, "homepage");
        assert_eq!(by_source[0].count, 2);

        let exported = repo.export(100, 0).await.unwrap();
        assert_eq!(exported.len(), 2);
        assert!(exported.iter().all(|row| row.email != "c@example.com"));

        let page = repo.export(1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
    }
}
