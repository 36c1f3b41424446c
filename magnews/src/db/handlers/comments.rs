//! Database repository for article comments.

use std::collections::HashMap;

use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::comments::{CommentCreateDBRequest, CommentDBResponse, CommentFilter, CommentUpdateDBRequest},
};
use crate::types::CommentId;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.article_id, c.user_id, u.email AS user_email, c.parent_id, c.content,
           c.is_deleted, c.created_at, c.updated_at
    FROM comments c
    JOIN users u ON u.id = c.user_id
"#;

pub struct Comments<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Comments<'c> {
    type CreateRequest = CommentCreateDBRequest;
    type UpdateRequest = CommentUpdateDBRequest;
    type Response = CommentDBResponse;
    type Id = CommentId;
    type Filter = CommentFilter;

    #[instrument(skip(self, request), fields(article_id = %request.article_id), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let comment = sqlx::query_as::<_, CommentDBResponse>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (article_id, user_id, parent_id, content)
                VALUES ($1, $2, $3, $4)
                RETURNING *
            )
            SELECT c.id, c.article_id, c.user_id, u.email AS user_email, c.parent_id, c.content,
                   c.is_deleted, c.created_at, c.updated_at
            FROM inserted c
            JOIN users u ON u.id = c.user_id
            "#,
        )
        .bind(&request.article_id)
        .bind(request.user_id)
        .bind(request.parent_id)
        .bind(&request.content)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(comment)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let comment = sqlx::query_as::<_, CommentDBResponse>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(comment)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let comments = sqlx::query_as::<_, CommentDBResponse>(&format!("{COMMENT_SELECT} WHERE c.id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(comments.into_iter().map(|c| (c.id, c)).collect())
    }

    /// Oldest first, so replies always follow their parent.
    #[instrument(skip(self, filter), fields(article_id = ?filter.article_id), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(COMMENT_SELECT);
        query.push(" WHERE TRUE");

        if let Some(article_id) = &filter.article_id {
            query.push(" AND c.article_id = ").push_bind(article_id);
        }
        if let Some(user_id) = filter.user_id {
            query.push(" AND c.user_id = ").push_bind(user_id);
        }
        if !filter.include_deleted {
            query.push(" AND NOT c.is_deleted");
        }

        query.push(" ORDER BY c.created_at ASC, c.id ASC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }
        query.push(" OFFSET ").push_bind(filter.skip);

        let comments = query
            .build_query_as::<CommentDBResponse>()
            .fetch_all(&mut *self.db)
            .await?;

        Ok(comments)
    }

    /// Soft delete: the row stays so replies keep their parent.
    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("UPDATE comments SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1 AND NOT is_deleted")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let comment = sqlx::query_as::<_, CommentDBResponse>(
            r#"
            WITH updated AS (
                UPDATE comments SET content = $2, updated_at = NOW()
                WHERE id = $1
                RETURNING *
            )
            SELECT c.id, c.article_id, c.user_id, u.email AS user_email, c.parent_id, c.content,
                   c.is_deleted, c.created_at, c.updated_at
            FROM updated c
            JOIN users u ON u.id = c.user_id
            "#,
        )
        .bind(id)
        .bind(&request.content)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(comment)
    }
}

impl<'c> Comments<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// True if `parent_id` is a comment on the same article.
    #[instrument(skip(self), err)]
    pub async fn exists_in_article(&mut self, parent_id: CommentId, article_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM comments WHERE id = $1 AND article_id = $2)")
            .bind(parent_id)
            .bind(article_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(exists)
    }
}
