//! Login session persistence operations.

use chrono::{DateTime, Utc};
use legal_core::UserId;
use sqlx::SqlitePool;

use crate::store::{Session, StoreError};

/// Store a new session.
pub async fn create(pool: &SqlitePool, session: &Session) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO sessions (token_digest, user_id, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&session.token_digest)
    .bind(session.user_id.0)
    .bind(session.created_at)
    .bind(session.expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Look up a session by token digest.
pub async fn find(pool: &SqlitePool, token_digest: &str) -> Result<Option<Session>, StoreError> {
    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT token_digest, user_id, created_at, expires_at FROM sessions
         WHERE token_digest = ?1",
    )
    .bind(token_digest)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(SessionRow::into_session))
}

/// Remove one session.
pub async fn delete(pool: &SqlitePool, token_digest: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM sessions WHERE token_digest = ?1")
        .bind(token_digest)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove every session of a user.
pub async fn delete_for_user(pool: &SqlitePool, user_id: UserId) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?1")
        .bind(user_id.0)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Remove sessions whose expiry is not after `now`.
///
/// Timestamps are compared by parsed value in Rust rather than by their
/// TEXT encoding, which does not sort reliably across fractional-second
/// precisions.
pub async fn purge_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64, StoreError> {
    let rows: Vec<(String, DateTime<Utc>)> =
        sqlx::query_as("SELECT token_digest, expires_at FROM sessions")
            .fetch_all(pool)
            .await?;
    let mut removed = 0;
    for (digest, expires_at) in rows {
        if expires_at <= now {
            removed += sqlx::query("DELETE FROM sessions WHERE token_digest = ?1")
                .bind(digest)
                .execute(pool)
                .await?
                .rows_affected();
        }
    }
    Ok(removed)
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    token_digest: String,
    user_id: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self) -> Session {
        Session {
            token_digest: self.token_digest,
            user_id: UserId(self.user_id),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}
