//! In-memory storage backend.
//!
//! All locks are `parking_lot` and are never held across an `.await`. The
//! live record map, its identifier index and the retired-identifier set sit
//! behind one lock, so the uniqueness check and the insert are a single
//! critical section.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use legal_core::{Identifier, Record, RecordFieldsPatch, RecordId, UserId, VisibilityStatus};
use parking_lot::RwLock;

use super::{
    NewRecord, NewUser, Page, RecordQuery, RecordStore, Session, SessionStore, StoreError, User,
    UserCredentials, UserPatch, UserStore,
};
use crate::auth::Role;

#[derive(Debug, Default)]
struct RecordTable {
    rows: HashMap<RecordId, Record>,
    by_identifier: HashMap<Identifier, RecordId>,
    issued: HashSet<Identifier>,
    next_id: i64,
}

#[derive(Debug, Default)]
struct UserTable {
    rows: HashMap<UserId, UserCredentials>,
    next_id: i64,
}

/// Process-local store for records, users and sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<RecordTable>,
    users: RwLock<UserTable>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn username_of(&self, id: Option<UserId>) -> Option<String> {
        let id = id?;
        self.users.read().rows.get(&id).map(|c| c.user.username.clone())
    }

    /// Fill the joined creator name. Called after the records lock is released.
    fn with_creator(&self, mut record: Record) -> Record {
        record.created_by_name = self.username_of(record.created_by);
        record
    }
}

/// ASCII-only case folding, the same as SQLite `LIKE`.
fn matches_search(record: &Record, needle: &str) -> bool {
    let needle = needle.to_ascii_lowercase();
    [
        record.identifier.as_str(),
        record.fields.legalization_no.as_str(),
        record.fields.document_owner.as_str(),
        record.fields.authorized_officer.as_str(),
    ]
    .iter()
    .any(|hay| hay.to_ascii_lowercase().contains(&needle))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<Record>, StoreError> {
        let found = {
            let table = self.records.read();
            table
                .by_identifier
                .get(identifier)
                .and_then(|id| table.rows.get(id))
                .cloned()
        };
        Ok(found.map(|r| self.with_creator(r)))
    }

    async fn get_by_id(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        let found = self.records.read().rows.get(&id).cloned();
        Ok(found.map(|r| self.with_creator(r)))
    }

    async fn insert_unique(&self, new: NewRecord) -> Result<Record, StoreError> {
        let record = {
            let mut table = self.records.write();
            if !table.issued.insert(new.identifier.clone()) {
                return Err(StoreError::DuplicateIdentifier);
            }
            table.next_id += 1;
            let id = RecordId(table.next_id);
            let now = Utc::now();
            let record = Record {
                id,
                identifier: new.identifier,
                encoded_url: new.encoded_url,
                fields: new.fields,
                status: VisibilityStatus::Active,
                created_by: new.created_by,
                created_by_name: None,
                created_at: now,
                updated_at: now,
            };
            table.by_identifier.insert(record.identifier.clone(), id);
            table.rows.insert(id, record.clone());
            record
        };
        Ok(self.with_creator(record))
    }

    async fn update(&self, id: RecordId, patch: &RecordFieldsPatch) -> Result<Record, StoreError> {
        let record = {
            let mut table = self.records.write();
            let row = table.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
            patch.merge_into(&mut row.fields);
            if let Some(status) = patch.status {
                row.status = status;
            }
            row.updated_at = Utc::now();
            row.clone()
        };
        Ok(self.with_creator(record))
    }

    async fn update_status(
        &self,
        ids: &[RecordId],
        status: VisibilityStatus,
    ) -> Result<u64, StoreError> {
        let mut table = self.records.write();
        let now = Utc::now();
        let mut changed = 0;
        for id in ids {
            if let Some(row) = table.rows.get_mut(id) {
                row.status = status;
                row.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, ids: &[RecordId]) -> Result<Vec<Identifier>, StoreError> {
        let mut table = self.records.write();
        let mut removed = Vec::new();
        for id in ids {
            if let Some(row) = table.rows.remove(id) {
                table.by_identifier.remove(&row.identifier);
                // `issued` keeps the identifier: it is retired, not freed.
                removed.push(row.identifier);
            }
        }
        Ok(removed)
    }

    async fn list(&self, query: &RecordQuery) -> Result<Page<Record>, StoreError> {
        let mut matching: Vec<Record> = {
            let table = self.records.read();
            table
                .rows
                .values()
                .filter(|r| query.status.map_or(true, |s| r.status == s))
                .filter(|r| query.search_term().map_or(true, |n| matches_search(r, n)))
                .cloned()
                .collect()
        };
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .map(|r| self.with_creator(r))
            .collect();
        Ok(Page { items, total })
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.read().rows.len() as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        Ok(self
            .users
            .read()
            .rows
            .values()
            .find(|c| c.user.username == username)
            .cloned())
    }

    async fn get_credentials(&self, id: UserId) -> Result<Option<UserCredentials>, StoreError> {
        Ok(self.users.read().rows.get(&id).cloned())
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().rows.get(&id).map(|c| c.user.clone()))
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self
            .users
            .read()
            .rows
            .values()
            .map(|c| c.user.clone())
            .collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut table = self.users.write();
        if table.rows.values().any(|c| c.user.username == new.username) {
            return Err(StoreError::DuplicateUsername);
        }
        table.next_id += 1;
        let user = User {
            id: UserId(table.next_id),
            username: new.username,
            email: new.email,
            role: new.role,
            created_at: Utc::now(),
        };
        table.rows.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                password_hash: new.password_hash,
            },
        );
        Ok(user)
    }

    async fn update(&self, id: UserId, patch: UserPatch) -> Result<User, StoreError> {
        let mut table = self.users.write();
        if let Some(name) = &patch.username {
            if table
                .rows
                .values()
                .any(|c| c.user.id != id && &c.user.username == name)
            {
                return Err(StoreError::DuplicateUsername);
            }
        }
        let creds = table.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = patch.username {
            creds.user.username = name;
        }
        if let Some(email) = patch.email {
            creds.user.email = email;
        }
        if let Some(role) = patch.role {
            creds.user.role = role;
        }
        Ok(creds.user.clone())
    }

    async fn set_password(&self, id: UserId, password_hash: String) -> Result<(), StoreError> {
        let mut table = self.users.write();
        let creds = table.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        creds.password_hash = password_hash;
        Ok(())
    }

    async fn delete(&self, id: UserId) -> Result<(), StoreError> {
        if self.users.write().rows.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        self.sessions.write().retain(|_, s| s.user_id != id);
        let mut records = self.records.write();
        for row in records.rows.values_mut() {
            if row.created_by == Some(id) {
                row.created_by = None;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.users.read().rows.len() as u64)
    }

    async fn count_admins(&self) -> Result<u64, StoreError> {
        Ok(self
            .users
            .read()
            .rows
            .values()
            .filter(|c| c.user.role == Role::Admin)
            .count() as u64)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .insert(session.token_digest.clone(), session);
        Ok(())
    }

    async fn find_session(&self, token_digest: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().get(token_digest).cloned())
    }

    async fn delete_session(&self, token_digest: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().remove(token_digest).is_some())
    }

    async fn delete_user_sessions(&self, user_id: UserId) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}
