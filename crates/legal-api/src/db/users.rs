//! User account persistence operations.

use chrono::{DateTime, Utc};
use legal_core::UserId;
use sqlx::SqlitePool;

use crate::auth::Role;
use crate::store::{NewUser, StoreError, User, UserCredentials, UserPatch};

const SELECT_USER: &str =
    "SELECT id, username, email, role, password_hash, created_at FROM users";

/// Create an account.
pub async fn create(pool: &SqlitePool, new: &NewUser) -> Result<User, StoreError> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (username, password_hash, email, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5) RETURNING id",
    )
    .bind(&new.username)
    .bind(&new.password_hash)
    .bind(&new.email)
    .bind(new.role.as_str())
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(duplicate_username)?;

    get(pool, UserId(id)).await?.ok_or(StoreError::NotFound)
}

fn duplicate_username(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateUsername,
        _ => err.into(),
    }
}

/// Look up an account and its hash by username.
pub async fn find_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<UserCredentials>, StoreError> {
    let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE username = ?1"))
        .bind(username)
        .fetch_optional(pool)
        .await?;
    row.map(UserRow::into_credentials).transpose()
}

/// Look up an account and its hash by id.
pub async fn get_credentials(
    pool: &SqlitePool,
    id: UserId,
) -> Result<Option<UserCredentials>, StoreError> {
    let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE id = ?1"))
        .bind(id.0)
        .fetch_optional(pool)
        .await?;
    row.map(UserRow::into_credentials).transpose()
}

/// Look up an account by id.
pub async fn get(pool: &SqlitePool, id: UserId) -> Result<Option<User>, StoreError> {
    Ok(get_credentials(pool, id).await?.map(|c| c.user))
}

/// All accounts, oldest first.
pub async fn list(pool: &SqlitePool) -> Result<Vec<User>, StoreError> {
    let rows = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} ORDER BY id"))
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|r| r.into_credentials().map(|c| c.user))
        .collect()
}

/// Apply a partial update. Absent fields keep their stored value.
pub async fn update(pool: &SqlitePool, id: UserId, patch: &UserPatch) -> Result<User, StoreError> {
    let (set_email, email) = match &patch.email {
        Some(email) => (true, email.clone()),
        None => (false, None),
    };
    let result = sqlx::query(
        "UPDATE users SET username = COALESCE(?1, username),
         email = CASE WHEN ?2 THEN ?3 ELSE email END,
         role = COALESCE(?4, role), updated_at = ?5
         WHERE id = ?6",
    )
    .bind(&patch.username)
    .bind(set_email)
    .bind(email)
    .bind(patch.role.map(|r| r.as_str()))
    .bind(Utc::now())
    .bind(id.0)
    .execute(pool)
    .await
    .map_err(duplicate_username)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    get(pool, id).await?.ok_or(StoreError::NotFound)
}

/// Replace the password hash.
pub async fn set_password(
    pool: &SqlitePool,
    id: UserId,
    password_hash: &str,
) -> Result<(), StoreError> {
    let result =
        sqlx::query("UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id.0)
            .execute(pool)
            .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Delete an account. Sessions cascade; records get `created_by = NULL`.
pub async fn delete(pool: &SqlitePool, id: UserId) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(id.0)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Number of accounts.
pub async fn count(pool: &SqlitePool) -> Result<u64, StoreError> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(u64::try_from(n).unwrap_or(0))
}

/// Number of admin accounts.
pub async fn count_admins(pool: &SqlitePool) -> Result<u64, StoreError> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(pool)
        .await?;
    Ok(u64::try_from(n).unwrap_or(0))
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: Option<String>,
    role: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_credentials(self) -> Result<UserCredentials, StoreError> {
        let role: Role = self.role.parse().map_err(|_| {
            tracing::warn!(user_id = self.id, role = %self.role, "unknown role in database");
            StoreError::Corrupt(format!("unknown role {:?}", self.role))
        })?;
        Ok(UserCredentials {
            user: User {
                id: UserId(self.id),
                username: self.username,
                email: self.email,
                role,
                created_at: self.created_at,
            },
            password_hash: self.password_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn new_user(name: &str, role: Role) -> NewUser {
        NewUser {
            username: name.into(),
            email: Some(format!("{name}@example.org")),
            role,
            password_hash: "$argon2id$fake".into(),
        }
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let pool = test_pool().await;
        let user = create(&pool, &new_user("clerk", Role::User)).await.unwrap();
        assert_eq!(user.role, Role::User);

        let creds = find_by_username(&pool, "clerk").await.unwrap().unwrap();
        assert_eq!(creds.user, user);
        assert_eq!(creds.password_hash, "$argon2id$fake");
        assert!(find_by_username(&pool, "nobody").await.unwrap().is_none());

        assert!(matches!(
            create(&pool, &new_user("clerk", Role::Admin)).await,
            Err(StoreError::DuplicateUsername)
        ));
    }

    #[tokio::test]
    async fn partial_update_keeps_unset_fields() {
        let pool = test_pool().await;
        let user = create(&pool, &new_user("clerk", Role::User)).await.unwrap();

        let updated = update(
            &pool,
            user.id,
            &UserPatch {
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.username, "clerk");
        assert_eq!(updated.email.as_deref(), Some("clerk@example.org"));
        assert_eq!(updated.role, Role::Admin);

        let cleared = update(
            &pool,
            user.id,
            &UserPatch {
                email: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(cleared.email, None);
        assert_eq!(count_admins(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rename_to_taken_username_fails() {
        let pool = test_pool().await;
        create(&pool, &new_user("a", Role::User)).await.unwrap();
        let b = create(&pool, &new_user("b", Role::User)).await.unwrap();
        let result = update(
            &pool,
            b.id,
            &UserPatch {
                username: Some("a".into()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(StoreError::DuplicateUsername)));
    }

    #[tokio::test]
    async fn delete_and_missing_rows() {
        let pool = test_pool().await;
        let user = create(&pool, &new_user("gone", Role::User)).await.unwrap();
        set_password(&pool, user.id, "$argon2id$other").await.unwrap();
        delete(&pool, user.id).await.unwrap();
        assert_eq!(count(&pool).await.unwrap(), 0);
        assert!(matches!(
            delete(&pool, user.id).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            set_password(&pool, user.id, "x").await,
            Err(StoreError::NotFound)
        ));
    }
}
