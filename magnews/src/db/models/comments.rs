//! Database models for article comments.

use crate::types::{CommentId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A comment joined with its author's email.
#[derive(Debug, Clone, FromRow)]
pub struct CommentDBResponse {
    pub id: CommentId,
    pub article_id: String,
    pub user_id: UserId,
    pub user_email: String,
    pub parent_id: Option<CommentId>,
    pub content: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CommentCreateDBRequest {
    pub article_id: String,
    pub user_id: UserId,
    pub parent_id: Option<CommentId>,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CommentUpdateDBRequest {
    pub content: String,
}

/// Filter for listing comments
#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    pub article_id: Option<String>,
    pub user_id: Option<UserId>,
    pub include_deleted: bool,
    pub skip: i64,
    pub limit: Option<i64>,
}

impl CommentFilter {
    /// Every comment on an article, deleted ones included so threads keep their shape.
    pub fn for_article(article_id: impl Into<String>) -> Self {
        Self {
            article_id: Some(article_id.into()),
            include_deleted: true,
            ..Default::default()
        }
    }
}
