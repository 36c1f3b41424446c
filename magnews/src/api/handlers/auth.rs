use axum::{Json, extract::State};
use chrono::Utc;

use crate::{
    AppState,
    api::models::{
        ApiResponse,
        auth::{AuthResponse, EmailRequest, LoginRequest, PasswordResetConfirmRequest, RegisterRequest, VerifyEmailRequest},
        users::{CurrentUser, UserResponse},
    },
    auth::{
        password::{self, Argon2Params},
        session,
    },
    db::{
        handlers::{PasswordResetTokens, Repository, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    email::{is_valid_address, normalize_address},
    errors::Error,
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Hash on a blocking thread so Argon2 does not stall the runtime.
async fn hash_password(password: &str, params: Argon2Params) -> Result<String, Error> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || password::hash_string_with_params(&password, Some(params)))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })?
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Registration successful", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Invalid input or email already registered", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<Json<ApiResponse<AuthResponse>>, Error> {
    let email = normalize_address(&request.email);
    if !is_valid_address(&email) {
        return Err(Error::bad_request("Invalid email address"));
    }
    let name = request.name.trim();
    if name.is_empty() {
        return Err(Error::bad_request("Name is required"));
    }
    password::validate_password(&request.password, &state.config.auth.password)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);
    if users.get_user_by_email(&email).await?.is_some() {
        return Err(Error::bad_request("Email already registered"));
    }

    let password_hash = hash_password(&request.password, (&state.config.auth.password).into()).await?;
    let verification_token = password::generate_verification_token();

    let user = users
        .create(&UserCreateDBRequest {
            email,
            name: name.to_string(),
            password_hash: Some(password_hash),
            google_id: None,
            email_verified: false,
            email_verification_token: Some(verification_token.clone()),
        })
        .await?;

    if let Err(e) = state
        .email
        .send_verification_email(&user.email, &user.name, &verification_token)
        .await
    {
        tracing::warn!("Failed to send verification email: {e}");
    }

    let token = session::create_session_token(user.id, &user.email, true, &state.config)?;
    Ok(Json(ApiResponse::with_message(
        AuthResponse {
            user: UserResponse::from(user),
            token,
        },
        "Registration successful",
    )))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Login successful", body = ApiResponse<AuthResponse>),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<Json<ApiResponse<AuthResponse>>, Error> {
    let invalid = || Error::Unauthenticated {
        message: Some(INVALID_CREDENTIALS.to_string()),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .get_user_by_email(&normalize_address(&request.email))
        .await?
        .ok_or_else(invalid)?;

    // Accounts created through Google sign-in have no password
    let hash = user.password_hash.clone().ok_or_else(invalid)?;
    let candidate = request.password.clone();
    let is_valid = tokio::task::spawn_blocking(move || password::verify_string(&candidate, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;

    if !is_valid {
        return Err(invalid());
    }

    let token = session::create_session_token(user.id, &user.email, request.remember_me, &state.config)?;
    Ok(Json(ApiResponse::with_message(
        AuthResponse {
            user: UserResponse::from(user),
            token,
        },
        "Login successful",
    )))
}

/// Get the authenticated user
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<UserResponse>),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorBody),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_current_user(current_user: CurrentUser) -> Json<ApiResponse<UserResponse>> {
    Json(ApiResponse::ok(current_user.into()))
}

/// Confirm an email address with the token from the verification email
#[utoipa::path(
    post,
    path = "/auth/verify-email",
    request_body = VerifyEmailRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Email verified", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Invalid verification token", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, Error> {
    let token = request.token.trim();
    if token.is_empty() {
        return Err(Error::bad_request("Invalid verification token"));
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);
    let user = users
        .get_by_verification_token(token)
        .await?
        .ok_or_else(|| Error::bad_request("Invalid verification token"))?;
    let user = users.mark_email_verified(user.id).await?;

    let token = session::create_session_token(user.id, &user.email, true, &state.config)?;
    Ok(Json(ApiResponse::with_message(
        AuthResponse {
            user: UserResponse::from(user),
            token,
        },
        "Email verified successfully",
    )))
}

/// Send a fresh verification email
#[utoipa::path(
    post,
    path = "/auth/resend-verification",
    request_body = EmailRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Verification email sent"),
        (status = 400, description = "Unknown or already verified email", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<ApiResponse<()>>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);
    let user = users
        .get_user_by_email(&normalize_address(&request.email))
        .await?
        .ok_or_else(|| Error::bad_request("User not found"))?;

    if user.email_verified {
        return Err(Error::bad_request("Email already verified"));
    }

    let token = password::generate_verification_token();
    users.set_verification_token(user.id, &token).await?;
    state.email.send_verification_email(&user.email, &user.name, &token).await?;

    Ok(Json(ApiResponse::message_only("Verification email sent")))
}

/// Request a password reset code by email
///
/// Always succeeds, whether or not the address belongs to an account.
#[utoipa::path(
    post,
    path = "/auth/password-reset",
    request_body = EmailRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Reset email sent if the account exists"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<ApiResponse<()>>, Error> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let user = Users::new(&mut tx).get_user_by_email(&normalize_address(&request.email)).await?;
    if let Some(user) = user {
        let lifetime = chrono::Duration::from_std(state.config.auth.password_reset_token_duration).map_err(|e| Error::Internal {
            operation: format!("convert reset token lifetime: {e}"),
        })?;
        let token = PasswordResetTokens::new(&mut tx)
            .issue_for_user(user.id, Utc::now() + lifetime)
            .await?;
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        if let Err(e) = state.email.send_password_reset_email(&user.email, &user.name, &token.token).await {
            tracing::warn!("Failed to send password reset email: {e}");
        }
    }

    Ok(Json(ApiResponse::message_only(
        "If an account exists with that email, a reset link has been sent.",
    )))
}

/// Set a new password using a reset code
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Password reset"),
        (status = 400, description = "Invalid or expired reset token", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<ApiResponse<()>>, Error> {
    password::validate_password(&request.new_password, &state.config.auth.password)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let token = PasswordResetTokens::new(&mut tx)
        .find_valid(request.token.trim())
        .await?
        .ok_or_else(|| Error::bad_request("Invalid or expired reset token"))?;

    let password_hash = hash_password(&request.new_password, (&state.config.auth.password).into()).await?;
    Users::new(&mut tx)
        .update(
            token.user_id,
            &UserUpdateDBRequest {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;
    PasswordResetTokens::new(&mut tx).delete_for_user(token.user_id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(ApiResponse::message_only("Password has been reset successfully")))
}
