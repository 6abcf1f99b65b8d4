//! # Storage Abstraction
//!
//! Handlers and the record registry talk to storage only through the
//! [`RecordStore`], [`UserStore`] and [`SessionStore`] traits. Two backends
//! implement all three:
//!
//! - [`MemoryStore`]: `parking_lot` locked maps, for tests and `DATABASE_URL=memory`.
//! - [`SqliteStore`]: sqlx pool over the migrations in `migrations/`.
//!
//! ## Identifier uniqueness
//!
//! [`RecordStore::insert_unique`] is the only place uniqueness is decided.
//! It rejects an identifier that belongs to a live record **or** to a record
//! that was deleted: identifiers are retired forever once issued, so a
//! physical sticker that outlives its record can never resolve to a
//! different one.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use legal_core::{
    Identifier, Record, RecordFields, RecordFieldsPatch, RecordId, UserId, VisibilityStatus,
};
use thiserror::Error;

use crate::auth::Role;

/// Errors from any storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The identifier is live or retired.
    #[error("identifier already issued")]
    DuplicateIdentifier,

    /// The username is taken.
    #[error("username already exists")]
    DuplicateUsername,

    /// The addressed row does not exist.
    #[error("not found")]
    NotFound,

    /// The backend could not serve the call (I/O, pool, constraint fault).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured bound.
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Run a storage future with an upper time bound.
///
/// An elapsed bound is reported as [`StoreError::Timeout`] and never retried.
pub async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

// ── Records ─────────────────────────────────────────────────────────────────

/// A record about to be inserted. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Freshly generated identifier.
    pub identifier: Identifier,
    /// Verification URL snapshot.
    pub encoded_url: String,
    /// Descriptive fields, already validated.
    pub fields: RecordFields,
    /// Creating user.
    pub created_by: Option<UserId>,
}

/// Filter and pagination for record listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Substring over identifier, legalization number, document owner and
    /// authorized officer. Case folding is ASCII only.
    pub search: Option<String>,
    /// Restrict to one status.
    pub status: Option<VisibilityStatus>,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: None,
            status: None,
        }
    }
}

impl RecordQuery {
    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Search term with surrounding whitespace removed, if non-empty.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// One page of results plus the total count across all pages.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items on this page, newest first.
    pub items: Vec<T>,
    /// Total matching rows.
    pub total: u64,
}

/// Record persistence.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up by public identifier, any status.
    async fn get_by_identifier(&self, identifier: &Identifier)
        -> Result<Option<Record>, StoreError>;

    /// Look up by row id, any status.
    async fn get_by_id(&self, id: RecordId) -> Result<Option<Record>, StoreError>;

    /// Insert a record whose identifier has never been issued.
    ///
    /// Fails with [`StoreError::DuplicateIdentifier`] if it has, and never
    /// overwrites an existing row.
    async fn insert_unique(&self, record: NewRecord) -> Result<Record, StoreError>;

    /// Apply a validated patch in one atomic step. Fields the patch leaves
    /// unset keep their stored value, even under concurrent updates.
    async fn update(&self, id: RecordId, patch: &RecordFieldsPatch) -> Result<Record, StoreError>;

    /// Set the status of every listed record. Returns the number changed.
    async fn update_status(
        &self,
        ids: &[RecordId],
        status: VisibilityStatus,
    ) -> Result<u64, StoreError>;

    /// Delete records, retiring their identifiers. Returns the identifiers
    /// of the rows actually removed.
    async fn delete(&self, ids: &[RecordId]) -> Result<Vec<Identifier>, StoreError>;

    /// Filtered, paginated listing, newest first.
    async fn list(&self, query: &RecordQuery) -> Result<Page<Record>, StoreError>;

    /// Total number of live records.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Cheap liveness check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

// ── Users ───────────────────────────────────────────────────────────────────

/// A user account without its credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Row id.
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Contact address.
    pub email: Option<String>,
    /// Access level.
    pub role: Role,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A user together with the stored password hash.
#[derive(Clone)]
pub struct UserCredentials {
    /// The account.
    pub user: User,
    /// Argon2 PHC string.
    pub password_hash: String,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("user", &self.user)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

/// A user about to be created.
#[derive(Clone)]
pub struct NewUser {
    /// Unique login name.
    pub username: String,
    /// Contact address.
    pub email: Option<String>,
    /// Access level.
    pub role: Role,
    /// Argon2 PHC string.
    pub password_hash: String,
}

/// Partial user update. `email: Some(None)` clears the address.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    /// New username.
    pub username: Option<String>,
    /// New email.
    pub email: Option<Option<String>>,
    /// New role.
    pub role: Option<Role>,
}

/// User account persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up an account and its hash by username.
    async fn find_by_username(&self, username: &str)
        -> Result<Option<UserCredentials>, StoreError>;

    /// Look up an account and its hash by id.
    async fn get_credentials(&self, id: UserId) -> Result<Option<UserCredentials>, StoreError>;

    /// Look up an account by id.
    async fn get(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// All accounts, oldest first.
    async fn list(&self) -> Result<Vec<User>, StoreError>;

    /// Create an account. Fails with [`StoreError::DuplicateUsername`].
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    /// Apply a partial update.
    async fn update(&self, id: UserId, patch: UserPatch) -> Result<User, StoreError>;

    /// Replace the password hash.
    async fn set_password(&self, id: UserId, password_hash: String) -> Result<(), StoreError>;

    /// Delete an account. Its sessions go with it; its records keep a
    /// cleared creator reference.
    async fn delete(&self, id: UserId) -> Result<(), StoreError>;

    /// Number of accounts.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Number of admin accounts.
    async fn count_admins(&self) -> Result<u64, StoreError>;
}

// ── Sessions ────────────────────────────────────────────────────────────────

/// A login session. Only the SHA-256 digest of the bearer token is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Lowercase hex SHA-256 of the bearer token.
    pub token_digest: String,
    /// Owner of the session.
    pub user_id: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
}

/// Session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new session.
    async fn create_session(&self, session: Session) -> Result<(), StoreError>;

    /// Look up a session by token digest, expired or not.
    async fn find_session(&self, token_digest: &str) -> Result<Option<Session>, StoreError>;

    /// Remove one session. Returns whether it existed.
    async fn delete_session(&self, token_digest: &str) -> Result<bool, StoreError>;

    /// Remove every session of a user. Returns how many were removed.
    async fn delete_user_sessions(&self, user_id: UserId) -> Result<u64, StoreError>;

    /// Remove sessions that expired before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// The three store handles backed by one backend.
#[derive(Clone)]
pub struct Stores {
    /// Record persistence.
    pub records: Arc<dyn RecordStore>,
    /// Account persistence.
    pub users: Arc<dyn UserStore>,
    /// Session persistence.
    pub sessions: Arc<dyn SessionStore>,
}

impl Stores {
    /// Split one backend into the three trait handles.
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: RecordStore + UserStore + SessionStore + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            records: backend.clone(),
            users: backend.clone(),
            sessions: backend,
        }
    }

    /// Fresh in-memory backend.
    pub fn memory() -> Self {
        Self::from_backend(MemoryStore::new())
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
