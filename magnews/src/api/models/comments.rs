//! API request/response models for comment threads.

use std::collections::HashMap;

use crate::db::models::comments::CommentDBResponse;
use crate::types::{CommentId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Authors may edit a comment for this long after posting it.
pub const EDIT_WINDOW_MINUTES: i64 = 30;
pub const MAX_COMMENT_CHARS: usize = 2000;
pub const DELETED_PLACEHOLDER: &str = "[Comment deleted by user]";

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CommentsQuery {
    /// Article to load the thread for
    pub article_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentCreate {
    #[serde(default)]
    pub article_id: String,
    #[serde(default)]
    pub content: String,
    /// Reply target; must be a comment on the same article
    #[serde(default)]
    pub parent_id: Option<CommentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentUpdate {
    #[serde(default)]
    pub content: String,
}

/// A comment as rendered to readers, with its replies nested underneath.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentResponse {
    pub id: CommentId,
    pub article_id: String,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// The author's email address
    pub user_name: String,
    pub parent_id: Option<CommentId>,
    pub content: String,
    pub is_deleted: bool,
    pub can_edit: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[schema(no_recursion)]
    pub replies: Vec<CommentResponse>,
}

impl CommentResponse {
    pub fn from_db(db: CommentDBResponse, now: DateTime<Utc>) -> Self {
        let can_edit = !db.is_deleted && within_edit_window(db.created_at, now);
        let content = if db.is_deleted {
            DELETED_PLACEHOLDER.to_string()
        } else {
            db.content
        };

        Self {
            id: db.id,
            article_id: db.article_id,
            user_id: db.user_id,
            user_name: db.user_email,
            parent_id: db.parent_id,
            content,
            is_deleted: db.is_deleted,
            can_edit,
            created_at: db.created_at,
            updated_at: db.updated_at,
            replies: Vec::new(),
        }
    }
}

pub fn within_edit_window(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - created_at < Duration::minutes(EDIT_WINDOW_MINUTES)
}

/// Trim and check comment text, returning what should be stored.
pub fn normalize_content(content: &str) -> Result<String, &'static str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err("Comment content cannot be empty");
    }
    if trimmed.chars().count() > MAX_COMMENT_CHARS {
        return Err("Comment too long (max 2000 characters)");
    }
    Ok(trimmed.to_string())
}

/// Nest a flat, oldest-first list of comments by `parent_id`.
///
/// Roots keep their input order and so do replies within each parent. Comments whose parent is not
/// in the list are dropped along with their descendants.
pub fn build_tree(comments: Vec<CommentDBResponse>, now: DateTime<Utc>) -> Vec<CommentResponse> {
    let mut roots = Vec::new();
    let mut children: HashMap<CommentId, Vec<CommentResponse>> = HashMap::new();

    for comment in comments {
        let formatted = CommentResponse::from_db(comment, now);
        match formatted.parent_id {
            Some(parent_id) => children.entry(parent_id).or_default().push(formatted),
            None => roots.push(formatted),
        }
    }

    fn attach(node: &mut CommentResponse, children: &mut HashMap<CommentId, Vec<CommentResponse>>) {
        if let Some(mut replies) = children.remove(&node.id) {
            for reply in &mut replies {
                attach(reply, children);
            }
            node.replies = replies;
        }
    }

    for root in &mut roots {
        attach(root, &mut children);
    }

    roots
}
