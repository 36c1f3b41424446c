use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session::{self, INVALID_TOKEN_MESSAGE},
    db::{
        errors::DbError,
        handlers::{Repository, Users},
    },
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, instrument, trace};

/// Pull the token out of an `Authorization: Bearer <token>` header.
/// Returns None when the header is absent, not valid UTF-8, or uses another scheme.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Some(token) = bearer_token(parts) else {
            trace!("No bearer token in request");
            return Err(Error::Unauthenticated { message: None });
        };

        let claims = session::verify_session_token(token, &state.config)?;

        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        let user = Users::new(&mut conn).get_by_id(claims.user_id).await?;

        match user {
            Some(user) => {
                debug!("Authenticated user: {}", user.id);
                Ok(user.into())
            }
            None => {
                // Token was valid but the account is gone
                trace!("Token subject {} no longer exists", claims.user_id);
                Err(Error::Unauthenticated {
                    message: Some(INVALID_TOKEN_MESSAGE.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_state, create_test_user};
    use axum::extract::FromRequestParts as _;
    use sqlx::PgPool;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder().uri("http://localhost/api/auth/me");
        if let Some(value) = value {
            builder = builder.header("authorization", value);
        }
        let (parts, _body) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with_auth(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with_auth(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with_auth(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with_auth(None)), None);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_valid_token_resolves_user(pool: PgPool) {
        let state = create_test_state(pool.clone());
        let user = create_test_user(&pool, "reader@example.com").await;
        let token = session::create_session_token(user.id, &user.email, false, &state.config).unwrap();

        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let current = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(current.id, user.id);
        assert_eq!(current.email, "reader@example.com");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_token_is_unauthorized(pool: PgPool) {
        let state = create_test_state(pool);
        let mut parts = parts_with_auth(None);
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(err.user_message(), "Unauthorized");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_garbage_token_rejected(pool: PgPool) {
        let state = create_test_state(pool);
        let mut parts = parts_with_auth(Some("Bearer not-a-jwt"));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(err.user_message(), INVALID_TOKEN_MESSAGE);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_token_for_deleted_user_rejected(pool: PgPool) {
        let state = create_test_state(pool.clone());
        let user = create_test_user(&pool, "gone@example.com").await;
        let token = session::create_session_token(user.id, &user.email, true, &state.config).unwrap();

        let mut conn = pool.acquire().await.unwrap();
        Users::new(&mut conn).delete(user.id).await.unwrap();

        let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.user_message(), INVALID_TOKEN_MESSAGE);
    }
}
