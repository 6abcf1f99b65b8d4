//! SQLite storage backend over [`crate::db`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use legal_core::{Identifier, Record, RecordFieldsPatch, RecordId, UserId, VisibilityStatus};
use sqlx::SqlitePool;

use super::{
    NewRecord, NewUser, Page, RecordQuery, RecordStore, Session, SessionStore, StoreError, User,
    UserCredentials, UserPatch, UserStore,
};
use crate::db;

/// Store backed by a migrated SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap a pool on which [`db::init_pool`] has run migrations.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<Record>, StoreError> {
        db::records::get_by_identifier(&self.pool, identifier).await
    }

    async fn get_by_id(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        db::records::get_by_id(&self.pool, id).await
    }

    async fn insert_unique(&self, record: NewRecord) -> Result<Record, StoreError> {
        db::records::insert_unique(&self.pool, &record).await
    }

    async fn update(&self, id: RecordId, patch: &RecordFieldsPatch) -> Result<Record, StoreError> {
        db::records::update(&self.pool, id, patch).await
    }

    async fn update_status(
        &self,
        ids: &[RecordId],
        status: VisibilityStatus,
    ) -> Result<u64, StoreError> {
        db::records::update_status(&self.pool, ids, status).await
    }

    async fn delete(&self, ids: &[RecordId]) -> Result<Vec<Identifier>, StoreError> {
        db::records::delete(&self.pool, ids).await
    }

    async fn list(&self, query: &RecordQuery) -> Result<Page<Record>, StoreError> {
        db::records::list(&self.pool, query).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        db::records::count(&self.pool).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        db::users::find_by_username(&self.pool, username).await
    }

    async fn get_credentials(&self, id: UserId) -> Result<Option<UserCredentials>, StoreError> {
        db::users::get_credentials(&self.pool, id).await
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, StoreError> {
        db::users::get(&self.pool, id).await
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        db::users::list(&self.pool).await
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        db::users::create(&self.pool, &user).await
    }

    async fn update(&self, id: UserId, patch: UserPatch) -> Result<User, StoreError> {
        db::users::update(&self.pool, id, &patch).await
    }

    async fn set_password(&self, id: UserId, password_hash: String) -> Result<(), StoreError> {
        db::users::set_password(&self.pool, id, &password_hash).await
    }

    async fn delete(&self, id: UserId) -> Result<(), StoreError> {
        db::users::delete(&self.pool, id).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        db::users::count(&self.pool).await
    }

    async fn count_admins(&self) -> Result<u64, StoreError> {
        db::users::count_admins(&self.pool).await
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_session(&self, session: Session) -> Result<(), StoreError> {
        db::sessions::create(&self.pool, &session).await
    }

    async fn find_session(&self, token_digest: &str) -> Result<Option<Session>, StoreError> {
        db::sessions::find(&self.pool, token_digest).await
    }

    async fn delete_session(&self, token_digest: &str) -> Result<bool, StoreError> {
        db::sessions::delete(&self.pool, token_digest).await
    }

    async fn delete_user_sessions(&self, user_id: UserId) -> Result<u64, StoreError> {
        db::sessions::delete_for_user(&self.pool, user_id).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        db::sessions::purge_expired(&self.pool, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legal_core::RecordFields;
    use crate::auth::Role;
    use crate::store::Stores;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn deleting_creator_keeps_record() {
        let stores = Stores::from_backend(SqliteStore::new(db::test_pool().await));
        let user = stores
            .users
            .create(NewUser {
                username: "clerk".into(),
                email: None,
                role: Role::User,
                password_hash: "$argon2id$fake".into(),
            })
            .await
            .unwrap();

        let code = "CCCCCCCCCCCCCCCCCCCC";
        let rec = stores
            .records
            .insert_unique(NewRecord {
                identifier: Identifier::new(code).unwrap(),
                encoded_url: format!("http://localhost:3000/check/sticker?qr={code}"),
                fields: RecordFields {
                    legalization_no: "LEG-7".into(),
                    issue_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                    place_of_issue: None,
                    legalization_type: "Apostille".into(),
                    authorized_officer: "Consul".into(),
                    document_owner: "Owner".into(),
                    document_type: "Diploma".into(),
                },
                created_by: Some(user.id),
            })
            .await
            .unwrap();
        assert_eq!(rec.created_by_name.as_deref(), Some("clerk"));

        stores.users.delete(user.id).await.unwrap();
        let after = stores.records.get_by_id(rec.id).await.unwrap().unwrap();
        assert_eq!(after.created_by, None);
        assert_eq!(after.created_by_name, None);
        stores.records.ping().await.unwrap();
    }
}
