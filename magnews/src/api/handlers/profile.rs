use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::{
        ApiResponse,
        users::{CurrentUser, ProfileResponse, ProfileUpdate},
    },
    db::{
        handlers::{Repository, Users},
        models::users::UserUpdateDBRequest,
    },
    errors::Error,
};

/// Get the reader's profile
#[utoipa::path(
    get,
    path = "/profile",
    tag = "profile",
    responses(
        (status = 200, description = "Profile", body = ApiResponse<ProfileResponse>),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorBody),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_profile(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<ApiResponse<ProfileResponse>>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .get_by_id(current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: current_user.id.to_string(),
        })?;

    Ok(Json(ApiResponse::ok(user.into())))
}

/// Update the reader's display name and billing name
#[utoipa::path(
    put,
    path = "/profile",
    request_body = ProfileUpdate,
    tag = "profile",
    responses(
        (status = 200, description = "Updated profile", body = ApiResponse<ProfileResponse>),
        (status = 400, description = "Name is required", body = crate::errors::ErrorBody),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorBody),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ProfileUpdate>,
) -> Result<Json<ApiResponse<ProfileResponse>>, Error> {
    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::bad_request("Name is required"))?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .update(
            current_user.id,
            &UserUpdateDBRequest {
                name: Some(name.to_string()),
                billing_name: request.billing_name.map(|billing_name| billing_name.trim().to_string()),
                password_hash: None,
            },
        )
        .await?;

    Ok(Json(ApiResponse::with_message(user.into(), "Profile updated")))
}
