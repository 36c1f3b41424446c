use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;

use crate::{
    AppState,
    api::models::{
        ApiResponse,
        comments::{CommentCreate, CommentResponse, CommentUpdate, CommentsQuery, build_tree, normalize_content, within_edit_window},
        users::CurrentUser,
    },
    db::{
        handlers::{Comments, Repository},
        models::comments::{CommentCreateDBRequest, CommentDBResponse, CommentFilter, CommentUpdateDBRequest},
    },
    errors::Error,
    types::CommentId,
};

const NOT_FOUND_OR_FORBIDDEN: &str = "Comment not found or you don't have permission";

/// Load a comment the current user authored. Missing and foreign comments look the same.
async fn get_own_comment(comments: &mut Comments<'_>, id: CommentId, current_user: &CurrentUser) -> Result<CommentDBResponse, Error> {
    comments
        .get_by_id(id)
        .await?
        .filter(|comment| comment.user_id == current_user.id)
        .ok_or_else(|| Error::bad_request(NOT_FOUND_OR_FORBIDDEN))
}

/// List the comment thread of an article
#[utoipa::path(
    get,
    path = "/comments",
    params(CommentsQuery),
    tag = "comments",
    responses(
        (status = 200, description = "Nested comment thread", body = ApiResponse<Vec<CommentResponse>>),
        (status = 400, description = "Article ID is required", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentsQuery>,
) -> Result<Json<ApiResponse<Vec<CommentResponse>>>, Error> {
    let article_id = query
        .article_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| Error::bad_request("Article ID is required"))?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let comments = Comments::new(&mut conn).list(&CommentFilter::for_article(article_id)).await?;

    Ok(Json(ApiResponse::ok(build_tree(comments, Utc::now()))))
}

/// Post a comment or a reply
#[utoipa::path(
    post,
    path = "/comments",
    request_body = CommentCreate,
    tag = "comments",
    responses(
        (status = 200, description = "Comment created", body = ApiResponse<CommentResponse>),
        (status = 400, description = "Invalid content or parent", body = crate::errors::ErrorBody),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorBody),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn create_comment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<CommentCreate>,
) -> Result<Json<ApiResponse<CommentResponse>>, Error> {
    let article_id = request.article_id.trim();
    if article_id.is_empty() {
        return Err(Error::bad_request("Article ID and content are required"));
    }
    let content = normalize_content(&request.content).map_err(Error::bad_request)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut comments = Comments::new(&mut conn);

    if let Some(parent_id) = request.parent_id
        && !comments.exists_in_article(parent_id, article_id).await?
    {
        return Err(Error::bad_request("Parent comment not found"));
    }

    let comment = comments
        .create(&CommentCreateDBRequest {
            article_id: article_id.to_string(),
            user_id: current_user.id,
            parent_id: request.parent_id,
            content,
        })
        .await?;

    Ok(Json(ApiResponse::with_message(
        CommentResponse::from_db(comment, Utc::now()),
        "Comment created",
    )))
}

/// Edit one of your comments within 30 minutes of posting it
#[utoipa::path(
    put,
    path = "/comments/{id}",
    request_body = CommentUpdate,
    params(("id" = i64, Path, description = "Comment ID")),
    tag = "comments",
    responses(
        (status = 200, description = "Comment updated", body = ApiResponse<CommentResponse>),
        (status = 400, description = "Not editable", body = crate::errors::ErrorBody),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorBody),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id, comment_id = id))]
pub async fn update_comment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<CommentId>,
    Json(request): Json<CommentUpdate>,
) -> Result<Json<ApiResponse<CommentResponse>>, Error> {
    let content = normalize_content(&request.content).map_err(Error::bad_request)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut comments = Comments::new(&mut conn);
    let existing = get_own_comment(&mut comments, id, &current_user).await?;

    if existing.is_deleted {
        return Err(Error::bad_request("Cannot edit deleted comment"));
    }
    let now = Utc::now();
    if !within_edit_window(existing.created_at, now) {
        return Err(Error::bad_request("Edit window expired (30 minutes)"));
    }

    let comment = comments.update(id, &CommentUpdateDBRequest { content }).await?;
    Ok(Json(ApiResponse::with_message(CommentResponse::from_db(comment, now), "Comment updated")))
}

/// Delete one of your comments
///
/// The comment stays in the thread as a placeholder so replies keep their place.
#[utoipa::path(
    delete,
    path = "/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    tag = "comments",
    responses(
        (status = 200, description = "Comment deleted"),
        (status = 400, description = "Not deletable", body = crate::errors::ErrorBody),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorBody),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id, comment_id = id))]
pub async fn delete_comment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<CommentId>,
) -> Result<Json<ApiResponse<()>>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut comments = Comments::new(&mut conn);
    let existing = get_own_comment(&mut comments, id, &current_user).await?;

    if existing.is_deleted || !comments.delete(id).await? {
        return Err(Error::bad_request("Comment already deleted"));
    }

    Ok(Json(ApiResponse::message_only("Comment deleted")))
}
