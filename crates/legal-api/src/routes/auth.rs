//! # Session API
//!
//! Login issues a bearer token; the rest operate on the caller's own
//! account and session.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{
    digest_token, hash_password, issue_token, verify_password, CallerIdentity, Role,
    SessionDigest,
};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;
use crate::store::{bounded, Session, User};

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 8;

const INVALID_CREDENTIALS: &str = "invalid credentials";

// ── DTOs ────────────────────────────────────────────────────────────────────

/// An account as returned by the API. Never carries the password hash.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    /// Account id.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Contact address, if any.
    pub email: Option<String>,
    /// Access level.
    pub role: Role,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.0,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Login request.
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Login name. Surrounding whitespace is ignored.
    pub username: String,
    /// Plaintext password.
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err("username and password are required".into());
        }
        Ok(())
    }
}

/// Login response. The token is shown exactly once.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// Bearer token for the `Authorization` header.
    pub token: String,
    /// When the session stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// The account that logged in.
    pub user: UserResponse,
}

/// Password change request.
#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    /// Current password.
    pub old_password: String,
    /// Replacement, at least eight characters.
    pub new_password: String,
}

impl std::fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChangePasswordRequest([REDACTED])")
    }
}

/// Check password length.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    Ok(())
}

impl Validate for ChangePasswordRequest {
    fn validate(&self) -> Result<(), String> {
        if self.old_password.is_empty() {
            return Err("old_password is required".into());
        }
        validate_password(&self.new_password)
    }
}

/// Expiry of a session started at `now`.
fn session_expiry(
    now: DateTime<Utc>,
    ttl: std::time::Duration,
) -> Result<DateTime<Utc>, AppError> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AppError::Internal("session ttl out of range".into()))
}

// ── Routers ─────────────────────────────────────────────────────────────────

/// Routes reachable without a token.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/api/auth/login", post(login))
}

/// Routes behind the auth middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/auth/change-password", post(change_password))
        .route("/api/auth/logout", post(logout))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// POST /api/auth/login: Exchange username and password for a bearer token.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorBody),
    ),
    security(()),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let timeout = state.storage_timeout();

    let creds = bounded(
        timeout,
        state.stores.users.find_by_username(req.username.trim()),
    )
    .await?;
    let Some(creds) = creds else {
        tracing::warn!(username = %req.username, "login failed: unknown user");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    };
    if !verify_password(req.password, creds.password_hash).await? {
        tracing::warn!(username = %creds.user.username, "login failed: wrong password");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let token = issue_token();
    let now = Utc::now();
    let session = Session {
        token_digest: digest_token(&token),
        user_id: creds.user.id,
        created_at: now,
        expires_at: session_expiry(now, state.config.session_ttl)?,
    };
    let expires_at = session.expires_at;
    bounded(timeout, state.stores.sessions.create_session(session)).await?;

    tracing::info!(user_id = %creds.user.id, username = %creds.user.username, "login succeeded");
    Ok(Json(LoginResponse {
        token,
        expires_at,
        user: creds.user.into(),
    }))
}

/// GET /api/auth/me: The authenticated account.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current account", body = UserResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<UserResponse>, AppError> {
    let user = bounded(state.storage_timeout(), state.stores.users.get(caller.user_id))
        .await?
        .ok_or_else(|| AppError::Unauthorized("account no longer exists".into()))?;
    Ok(Json(user.into()))
}

/// POST /api/auth/change-password: Replace the caller's password and end all sessions.
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed; all sessions revoked"),
        (status = 401, description = "Old password is wrong", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let req = extract_validated_json(body)?;
    let timeout = state.storage_timeout();

    let creds = bounded(timeout, state.stores.users.get_credentials(caller.user_id))
        .await?
        .ok_or_else(|| AppError::Unauthorized("account no longer exists".into()))?;
    if !verify_password(req.old_password, creds.password_hash).await? {
        tracing::warn!(user_id = %caller.user_id, "password change rejected: wrong old password");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let hash = hash_password(req.new_password).await?;
    bounded(timeout, state.stores.users.set_password(caller.user_id, hash)).await?;
    let revoked = bounded(
        timeout,
        state.stores.sessions.delete_user_sessions(caller.user_id),
    )
    .await?;
    tracing::info!(user_id = %caller.user_id, revoked, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/logout: End the session that authenticated this request.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 204, description = "Session ended"),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    caller: CallerIdentity,
    digest: SessionDigest,
) -> Result<StatusCode, AppError> {
    bounded(
        state.storage_timeout(),
        state.stores.sessions.delete_session(&digest.0),
    )
    .await?;
    tracing::info!(user_id = %caller.user_id, "logged out");
    Ok(StatusCode::NO_CONTENT)
}
