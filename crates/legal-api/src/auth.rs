//! # Authentication & Authorization
//!
//! Password login issuing opaque bearer tokens, with role-based access
//! control on top.
//!
//! ## Tokens
//!
//! A session token is 32 random bytes from the OS RNG, hex encoded, handed to
//! the client once at login. The server keeps only its SHA-256 digest, so a
//! leaked `sessions` table cannot be replayed.
//!
//! ```text
//! Authorization: Bearer 9f86d081884c7d65...
//! ```
//!
//! ## Passwords
//!
//! Argon2id PHC strings. Hashing and verification run on the blocking pool.
//!
//! ## CallerIdentity
//!
//! [`auth_middleware`] resolves the bearer token into a [`CallerIdentity`]
//! and injects it into the request extensions. Handlers extract it via the
//! `FromRequestParts` impl.

use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use legal_core::UserId;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::error::{AppError, ErrorBody, ErrorDetail};
use crate::store::{bounded, SessionStore, UserStore};

const TOKEN_BYTES: usize = 32;

// ── Role ────────────────────────────────────────────────────────────────────

/// Account roles, ordered by privilege level.
///
/// `User < Admin`, so `>=` answers "at least this role".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Manages records.
    User,
    /// Manages records and accounts.
    Admin,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Account id.
    pub user_id: UserId,
    /// Login name at the time the request was authenticated.
    pub username: String,
    /// Account role.
    pub role: Role,
}

impl CallerIdentity {
    /// Check if the caller has at least the given role.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }
}

/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if none is present.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Digest of the bearer token that authenticated the current request.
/// Injected next to [`CallerIdentity`] so logout can drop its own session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionDigest(pub String);

impl std::fmt::Debug for SessionDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionDigest([REDACTED])")
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for SessionDigest {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionDigest>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no session in request context".into()))
    }
}

// ── Passwords ───────────────────────────────────────────────────────────────

/// Hash a password with Argon2id and a fresh salt.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
}

/// Check a password against a stored PHC string.
///
/// A malformed stored hash counts as a mismatch and is logged.
pub async fn verify_password(password: String, stored_hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || {
        let parsed = match PasswordHash::new(&stored_hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is not a valid PHC string");
                return false;
            }
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))
}

// ── Tokens ──────────────────────────────────────────────────────────────────

/// Generate a new bearer token.
pub fn issue_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    to_hex(&bytes)
}

/// Lowercase hex SHA-256 of a bearer token, as stored in `sessions`.
pub fn digest_token(token: &str) -> String {
    to_hex(&Sha256::digest(token.as_bytes()))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Constant-time comparison of two digests.
fn digest_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

// ── Auth Context ────────────────────────────────────────────────────────────

/// Store handles the middleware needs, injected into request extensions.
#[derive(Clone)]
pub struct AuthContext {
    /// Account lookup.
    pub users: Arc<dyn UserStore>,
    /// Session lookup.
    pub sessions: Arc<dyn SessionStore>,
    /// Bound on each storage call.
    pub timeout: Duration,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

enum AuthFailure {
    Rejected(&'static str),
    Storage(AppError),
}

impl AuthContext {
    /// Resolve a presented bearer token into the caller's identity.
    async fn authenticate(&self, token: &str) -> Result<CallerIdentity, AuthFailure> {
        let digest = digest_token(token);
        let session = bounded(self.timeout, self.sessions.find_session(&digest))
            .await
            .map_err(|e| AuthFailure::Storage(e.into()))?
            .ok_or(AuthFailure::Rejected("invalid bearer token"))?;

        if !digest_eq(&session.token_digest, &digest) {
            return Err(AuthFailure::Rejected("invalid bearer token"));
        }
        if session.expires_at <= Utc::now() {
            return Err(AuthFailure::Rejected("session expired"));
        }

        let user = bounded(self.timeout, self.users.get(session.user_id))
            .await
            .map_err(|e| AuthFailure::Storage(e.into()))?
            .ok_or(AuthFailure::Rejected("account no longer exists"))?;

        Ok(CallerIdentity {
            user_id: user.id,
            username: user.username,
            role: user.role,
        })
    }
}

// ── Middleware ──────────────────────────────────────────────────────────────

/// Extract and validate the Bearer token from the Authorization header.
///
/// On success injects [`CallerIdentity`] and [`SessionDigest`] into the
/// request extensions for downstream handlers.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(ctx) = request.extensions().get::<AuthContext>().cloned() else {
        return AppError::Internal("auth context not configured".into()).into_response();
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => token.trim().to_string(),
            _ => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return unauthorized_response("missing authorization header");
        }
    };

    match ctx.authenticate(&token).await {
        Ok(identity) => {
            request
                .extensions_mut()
                .insert(SessionDigest(digest_token(&token)));
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(AuthFailure::Rejected(reason)) => {
            tracing::warn!(reason, "authentication failed");
            unauthorized_response(reason)
        }
        Err(AuthFailure::Storage(err)) => err.into_response(),
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewUser, Session, Stores};
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn fixture() -> (Router, Stores, String) {
        let stores = Stores::from_backend(MemoryStore::new());
        let user = stores
            .users
            .create(NewUser {
                username: "clerk".into(),
                email: None,
                role: Role::User,
                password_hash: "unused".into(),
            })
            .await
            .unwrap();
        let token = issue_token();
        let now = Utc::now();
        stores
            .sessions
            .create_session(Session {
                token_digest: digest_token(&token),
                user_id: user.id,
                created_at: now,
                expires_at: now + chrono::Duration::hours(1),
            })
            .await
            .unwrap();

        let ctx = AuthContext {
            users: stores.users.clone(),
            sessions: stores.sessions.clone(),
            timeout: Duration::from_secs(1),
        };
        let app = Router::new()
            .route(
                "/test",
                get(|caller: CallerIdentity| async move { caller.username }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(ctx));
        (app, stores, token)
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/test");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_bearer_token_accepted() {
        let (app, _, token) = fixture().await;
        let (status, body) = call(app, Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "clerk");
    }

    #[tokio::test]
    async fn missing_authorization_header_rejected() {
        let (app, _, _) = fixture().await;
        let (status, body) = call(app, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
        assert!(err["error"]["message"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn unknown_token_rejected() {
        let (app, _, _) = fixture().await;
        let (status, body) = call(app, Some("Bearer not-a-real-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("invalid bearer token"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let (app, _, _) = fixture().await;
        let (status, body) = call(app, Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn expired_session_rejected() {
        let (app, stores, _) = fixture().await;
        let token = issue_token();
        let now = Utc::now();
        stores
            .sessions
            .create_session(Session {
                token_digest: digest_token(&token),
                user_id: UserId(1),
                created_at: now - chrono::Duration::hours(2),
                expires_at: now - chrono::Duration::hours(1),
            })
            .await
            .unwrap();
        let (status, body) = call(app, Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("expired"));
    }

    #[tokio::test]
    async fn deleted_account_rejected() {
        let (app, stores, token) = fixture().await;
        stores.users.delete(UserId(1)).await.unwrap();
        let (status, _) = call(app, Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn password_hash_verifies() {
        let hash = hash_password("correct horse".into()).await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse".into(), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password("wrong horse".into(), hash).await.unwrap());
        assert!(!verify_password("x".into(), "not-a-phc-string".into())
            .await
            .unwrap());
    }

    #[test]
    fn tokens_are_random_hex() {
        let a = issue_token();
        let b = issue_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            digest_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(digest_eq(&digest_token("abc"), &digest_token("abc")));
        assert!(!digest_eq(&digest_token("abc"), &digest_token("abd")));
        assert!(!digest_eq("ab", "abc"));
    }

    #[test]
    fn role_ordering_and_parsing() {
        assert!(Role::User < Role::Admin);
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::User.as_str(), "user");
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn require_role_checks_level() {
        let user = CallerIdentity {
            user_id: UserId(1),
            username: "u".into(),
            role: Role::User,
        };
        assert!(require_role(&user, Role::User).is_ok());
        let err = require_role(&user, Role::Admin).unwrap_err();
        assert!(err.to_string().contains("role 'admin' required"));
    }
}
