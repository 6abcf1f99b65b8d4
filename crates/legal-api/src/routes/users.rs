//! # User Administration API
//!
//! Account management, restricted to admins. An admin cannot delete their
//! own account or change their own role, so the last admin cannot lock
//! everyone out.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use legal_core::UserId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{hash_password, require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::middleware::metrics::ApiMetrics;
use crate::routes::auth::{validate_password, UserResponse};
use crate::state::AppState;
use crate::store::{bounded, NewUser, UserPatch};

// ── DTOs ────────────────────────────────────────────────────────────────────

/// Create-account request.
#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    /// Login name, unique.
    pub username: String,
    /// Initial password, at least eight characters.
    pub password: String,
    /// Contact address.
    #[serde(default)]
    pub email: Option<String>,
    /// Defaults to `user`.
    #[serde(default)]
    pub role: Option<Role>,
}

impl std::fmt::Debug for CreateUserRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUserRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

fn validate_username(username: &str) -> Result<(), String> {
    let username = username.trim();
    if username.is_empty() {
        return Err("username must not be empty".into());
    }
    if username.chars().count() > 64 {
        return Err("username must be at most 64 characters".into());
    }
    Ok(())
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<(), String> {
        validate_username(&self.username)?;
        validate_password(&self.password)
    }
}

/// Partial account update. An empty `email` clears the address.
#[derive(Default, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    /// New login name.
    pub username: Option<String>,
    /// New contact address; empty clears it.
    pub email: Option<String>,
    /// New access level. Admins cannot change their own.
    pub role: Option<Role>,
    /// New password. Revokes every session of the account.
    pub password: Option<String>,
}

impl std::fmt::Debug for UpdateUserRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateUserRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<(), String> {
        if self.username.is_none()
            && self.email.is_none()
            && self.role.is_none()
            && self.password.is_none()
        {
            return Err("no fields to update".into());
        }
        if let Some(username) = &self.username {
            validate_username(username)?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(())
    }
}

/// Admin dashboard counters.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    /// Number of accounts.
    pub total_users: u64,
    /// Number of live records.
    pub total_records: u64,
    /// Requests served since start.
    pub requests: u64,
    /// Responses with a 4xx or 5xx status since start.
    pub errors: u64,
}

fn normalize_email(email: Option<String>) -> Option<String> {
    email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty())
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the user administration router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/stats", get(stats))
        .route("/api/users/:id", put(update_user).delete(delete_user))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// GET /api/users: List all accounts.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All accounts", body = Vec<UserResponse>),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    require_role(&caller, Role::Admin)?;
    let users = bounded(state.storage_timeout(), state.stores.users.list()).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// POST /api/users: Create an account.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 409, description = "Username taken", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let password_hash = hash_password(req.password).await?;
    let user = bounded(
        state.storage_timeout(),
        state.stores.users.create(NewUser {
            username: req.username.trim().to_string(),
            email: normalize_email(req.email),
            role: req.role.unwrap_or(Role::User),
            password_hash,
        }),
    )
    .await?;
    tracing::info!(
        user_id = %user.id,
        username = %user.username,
        role = user.role.as_str(),
        by = %caller.username,
        "user created"
    );
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// PUT /api/users/:id: Update an account.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Account updated", body = UserResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Username taken or own role change", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<i64>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let id = UserId(id);
    let timeout = state.storage_timeout();

    if id == caller.user_id && req.role.is_some_and(|r| r != caller.role) {
        return Err(AppError::Conflict("cannot change your own role".into()));
    }

    let patch = UserPatch {
        username: req.username.map(|u| u.trim().to_string()),
        email: req.email.map(|e| normalize_email(Some(e))),
        role: req.role,
    };
    let user = if patch.username.is_some() || patch.email.is_some() || patch.role.is_some() {
        bounded(timeout, state.stores.users.update(id, patch)).await?
    } else {
        bounded(timeout, state.stores.users.get(id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?
    };

    if let Some(password) = req.password {
        let hash = hash_password(password).await?;
        bounded(timeout, state.stores.users.set_password(id, hash)).await?;
        let revoked = bounded(timeout, state.stores.sessions.delete_user_sessions(id)).await?;
        tracing::info!(user_id = %id, revoked, by = %caller.username, "user password reset");
    }

    tracing::info!(user_id = %id, by = %caller.username, "user updated");
    Ok(Json(user.into()))
}

/// DELETE /api/users/:id: Delete an account. Its records are kept.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Cannot delete yourself", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Admin)?;
    let id = UserId(id);
    if id == caller.user_id {
        return Err(AppError::Conflict("cannot delete your own account".into()));
    }
    bounded(state.storage_timeout(), state.stores.users.delete(id)).await?;
    tracing::info!(user_id = %id, by = %caller.username, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/users/stats: Account and record totals plus request counters.
#[utoipa::path(
    get,
    path = "/api/users/stats",
    responses(
        (status = 200, description = "Counters", body = StatsResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
pub async fn stats(
    State(state): State<AppState>,
    caller: CallerIdentity,
    metrics: Option<Extension<ApiMetrics>>,
) -> Result<Json<StatsResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let total_users = bounded(state.storage_timeout(), state.stores.users.count()).await?;
    let total_records = state.registry.count().await?;
    let (requests, errors) = metrics
        .map(|Extension(m)| (m.requests(), m.errors()))
        .unwrap_or_default();
    Ok(Json(StatsResponse {
        total_users,
        total_records,
        requests,
        errors,
    }))
}
