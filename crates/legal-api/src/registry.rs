//! # Record Registry
//!
//! The creation flow and the lookup resolver, over an injected
//! [`RecordStore`] and [`IdentifierGenerator`].
//!
//! ## Creation
//!
//! ```text
//! generate → encode URL → insert_unique ─┬─ Ok ─────────────────→ CreatedRecord
//!                ▲                        └─ DuplicateIdentifier ─┐
//!                └────────────── retry (≤ max_attempts) ──────────┘
//! ```
//!
//! The store decides uniqueness; the registry only retries. When every
//! attempt collides the request fails with
//! [`RegistryError::GenerationExhausted`].
//!
//! ## Public lookup
//!
//! [`RecordRegistry::resolve_public`] answers [`RegistryError::NotFound`]
//! for a malformed code, a missing row and an inactive row alike, and the
//! variant carries nothing that could tell them apart.
//!
//! Every storage call is bounded by the configured timeout. A timeout is
//! reported, never retried.

use std::sync::Arc;
use std::time::Duration;

use legal_core::{
    encode_verification_url, image_filename, BaseUrl, Identifier, IdentifierGenerator,
    PublicRecord, Record, RecordFields, RecordFieldsPatch, RecordId, UserId, ValidationError,
    VisibilityStatus,
};
use thiserror::Error;

use crate::error::AppError;
use crate::store::{bounded, NewRecord, Page, RecordQuery, RecordStore, StoreError};

/// Attempts before creation gives up on finding an unused identifier.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Registry failures.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No record, or not visible to this caller.
    #[error("record not found")]
    NotFound,

    /// Every generated identifier was already issued.
    #[error("no unused identifier after {attempts} attempts")]
    GenerationExhausted {
        /// Attempts made.
        attempts: u32,
    },

    /// Input failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// A storage call exceeded its bound.
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    /// Any other storage fault.
    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::Timeout(limit) => Self::Timeout(limit),
            other => Self::Storage(other),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound => AppError::record_not_found(),
            RegistryError::GenerationExhausted { .. } => AppError::Internal(err.to_string()),
            RegistryError::Invalid(e) => AppError::Validation(e.to_string()),
            RegistryError::Timeout(limit) => AppError::from(StoreError::Timeout(limit)),
            RegistryError::Storage(e) => AppError::from(e),
        }
    }
}

/// Result of a successful creation.
#[derive(Debug, Clone)]
pub struct CreatedRecord {
    /// The stored record.
    pub record: Record,
    /// `<identifier>.png`.
    pub image_filename: String,
}

/// Record creation, lookup and maintenance.
#[derive(Clone)]
pub struct RecordRegistry {
    store: Arc<dyn RecordStore>,
    generator: Arc<dyn IdentifierGenerator>,
    base_url: BaseUrl,
    timeout: Duration,
    max_attempts: u32,
}

impl std::fmt::Debug for RecordRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordRegistry")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl RecordRegistry {
    /// Create a registry with the default attempt budget.
    pub fn new(
        store: Arc<dyn RecordStore>,
        generator: Arc<dyn IdentifierGenerator>,
        base_url: BaseUrl,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            generator,
            base_url,
            timeout,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the attempt budget. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Base URL every verification URL is built from.
    pub fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    /// Bound applied to each storage call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create a record under a freshly generated identifier.
    pub async fn create(
        &self,
        fields: RecordFields,
        created_by: Option<UserId>,
    ) -> Result<CreatedRecord, RegistryError> {
        fields.validate()?;

        for attempt in 1..=self.max_attempts {
            let identifier = self.generator.generate();
            let new = NewRecord {
                encoded_url: encode_verification_url(&identifier, &self.base_url),
                identifier,
                fields: fields.clone(),
                created_by,
            };
            match bounded(self.timeout, self.store.insert_unique(new)).await {
                Ok(record) => {
                    tracing::info!(
                        record_id = %record.id,
                        identifier = %record.identifier,
                        attempt,
                        "record created"
                    );
                    return Ok(CreatedRecord {
                        image_filename: image_filename(&record.identifier),
                        record,
                    });
                }
                Err(StoreError::DuplicateIdentifier) => {
                    tracing::warn!(attempt, "identifier collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(attempts = self.max_attempts, "identifier generation exhausted");
        Err(RegistryError::GenerationExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Resolve a code for an unauthenticated caller.
    pub async fn resolve_public(&self, code: &str) -> Result<PublicRecord, RegistryError> {
        let record = self.find_public(code).await?;
        record.to_public().ok_or(RegistryError::NotFound)
    }

    /// Fetch the full record behind a publicly visible code.
    ///
    /// Same gate as [`Self::resolve_public`]; used by the public image routes.
    pub async fn find_public(&self, code: &str) -> Result<Record, RegistryError> {
        let Ok(identifier) = Identifier::new(code) else {
            return Err(RegistryError::NotFound);
        };
        match self.find_by_identifier(&identifier).await? {
            Some(record) if record.status.is_public() => Ok(record),
            _ => Err(RegistryError::NotFound),
        }
    }

    /// Fetch by identifier, any status.
    pub async fn find_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<Record>, RegistryError> {
        Ok(bounded(self.timeout, self.store.get_by_identifier(identifier)).await?)
    }

    /// Authenticated fetch by row id, any status.
    pub async fn get(&self, id: RecordId) -> Result<Record, RegistryError> {
        bounded(self.timeout, self.store.get_by_id(id))
            .await?
            .ok_or(RegistryError::NotFound)
    }

    /// Apply a partial update. The identifier and stored URL never change.
    ///
    /// The patch is merged by the store, so concurrent updates touching
    /// different fields both land.
    pub async fn update(
        &self,
        id: RecordId,
        patch: RecordFieldsPatch,
    ) -> Result<Record, RegistryError> {
        patch.validate()?;
        let record = bounded(self.timeout, self.store.update(id, &patch)).await?;
        tracing::info!(record_id = %id, status = record.status.as_str(), "record updated");
        Ok(record)
    }

    /// Set the status of several records. Returns how many changed.
    pub async fn set_status(
        &self,
        ids: &[RecordId],
        status: VisibilityStatus,
    ) -> Result<u64, RegistryError> {
        let changed = bounded(self.timeout, self.store.update_status(ids, status)).await?;
        tracing::info!(
            requested = ids.len(),
            changed,
            status = status.as_str(),
            "record status changed"
        );
        Ok(changed)
    }

    /// Delete records. Returns the retired identifiers.
    pub async fn delete(&self, ids: &[RecordId]) -> Result<Vec<Identifier>, RegistryError> {
        let removed = bounded(self.timeout, self.store.delete(ids)).await?;
        tracing::info!(requested = ids.len(), removed = removed.len(), "records deleted");
        Ok(removed)
    }

    /// Filtered, paginated listing.
    pub async fn list(&self, query: &RecordQuery) -> Result<Page<Record>, RegistryError> {
        Ok(bounded(self.timeout, self.store.list(query)).await?)
    }

    /// Number of live records.
    pub async fn count(&self) -> Result<u64, RegistryError> {
        Ok(bounded(self.timeout, self.store.count()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_pool;
    use crate::store::{MemoryStore, SqliteStore};
    use chrono::NaiveDate;
    use legal_core::RandomIdentifierGenerator;
    use parking_lot::Mutex;

    /// Hands out a fixed script of identifiers, then repeats the last one.
    struct Scripted(Mutex<Vec<&'static str>>);

    impl Scripted {
        fn new(codes: &[&'static str]) -> Arc<Self> {
            let mut codes = codes.to_vec();
            codes.reverse();
            Arc::new(Self(Mutex::new(codes)))
        }
    }

    impl IdentifierGenerator for Scripted {
        fn generate(&self) -> Identifier {
            let mut codes = self.0.lock();
            let code = if codes.len() > 1 {
                codes.pop().unwrap()
            } else {
                codes[0]
            };
            Identifier::new(code).unwrap()
        }
    }

    const I1: &str = "AAAAAAAAAAAAAAAAAAA1";
    const I2: &str = "AAAAAAAAAAAAAAAAAAA2";

    fn fields() -> RecordFields {
        RecordFields {
            legalization_no: "LEG-2024-001".into(),
            issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            place_of_issue: Some("Consulate General".into()),
            legalization_type: "Apostille".into(),
            authorized_officer: "A. Consul".into(),
            document_owner: "J. Doe".into(),
            document_type: "Birth certificate".into(),
        }
    }

    fn owned_by(owner: &str) -> RecordFields {
        RecordFields {
            document_owner: owner.into(),
            ..fields()
        }
    }

    fn registry_over(
        store: Arc<dyn RecordStore>,
        generator: Arc<dyn IdentifierGenerator>,
    ) -> RecordRegistry {
        RecordRegistry::new(
            store,
            generator,
            BaseUrl::new("https://legal.example.org").unwrap(),
            Duration::from_secs(5),
        )
    }

    fn registry(generator: Arc<dyn IdentifierGenerator>) -> RecordRegistry {
        registry_over(Arc::new(MemoryStore::new()), generator)
    }

    async fn file_store(dir: &tempfile::TempDir) -> Arc<dyn RecordStore> {
        let url = format!("sqlite://{}", dir.path().join("registry.db").display());
        Arc::new(SqliteStore::new(init_pool(&url).await.unwrap()))
    }

    /// Two creations race while both draw `I1` first. One keeps `I1`, the
    /// other retries onto `I2`, and the `I1` row keeps its own fields.
    async fn concurrent_creations_share_no_identifier(store: Arc<dyn RecordStore>) {
        let reg = registry_over(store, Scripted::new(&[I1, I1, I2]));
        let (a, b) = tokio::join!(
            tokio::spawn({
                let reg = reg.clone();
                async move { reg.create(owned_by("First Owner"), None).await }
            }),
            tokio::spawn({
                let reg = reg.clone();
                async move { reg.create(owned_by("Second Owner"), None).await }
            }),
        );
        let a = a.unwrap().unwrap().record;
        let b = b.unwrap().unwrap().record;

        let mut codes = [a.identifier.as_str(), b.identifier.as_str()];
        codes.sort_unstable();
        assert_eq!(codes, [I1, I2]);

        let holder = if a.identifier.as_str() == I1 { &a } else { &b };
        let stored = reg
            .find_by_identifier(&Identifier::new(I1).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, holder.id);
        assert_eq!(stored.fields, holder.fields);
        assert_eq!(reg.count().await.unwrap(), 2);
    }

    /// Two updates touching different fields race; both edits survive.
    async fn concurrent_updates_keep_both_edits(store: Arc<dyn RecordStore>) {
        let reg = registry_over(store, Scripted::new(&[I1]));
        let id = reg.create(fields(), None).await.unwrap().record.id;

        let owner = RecordFieldsPatch {
            document_owner: Some("R. Roe".into()),
            ..Default::default()
        };
        let officer = RecordFieldsPatch {
            authorized_officer: Some("Vice Consul".into()),
            ..Default::default()
        };
        let (a, b) = tokio::join!(
            tokio::spawn({
                let reg = reg.clone();
                async move { reg.update(id, owner).await }
            }),
            tokio::spawn({
                let reg = reg.clone();
                async move { reg.update(id, officer).await }
            }),
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let record = reg.get(id).await.unwrap();
        assert_eq!(record.fields.document_owner, "R. Roe");
        assert_eq!(record.fields.authorized_officer, "Vice Consul");
        assert_eq!(record.fields.legalization_no, fields().legalization_no);
    }

    #[tokio::test]
    async fn create_assigns_identifier_and_url() {
        let reg = registry(Arc::new(RandomIdentifierGenerator));
        let created = reg.create(fields(), None).await.unwrap();
        let id = &created.record.identifier;
        assert_eq!(
            created.record.encoded_url,
            format!("https://legal.example.org/check/sticker?qr={id}")
        );
        assert_eq!(created.image_filename, format!("{id}.png"));
        assert_eq!(created.record.status, VisibilityStatus::Active);
    }

    #[tokio::test]
    async fn forced_collision_retries_with_fresh_identifier() {
        let reg = registry(Scripted::new(&[I1, I1, I2]));
        let first = reg.create(fields(), None).await.unwrap();
        assert_eq!(first.record.identifier.as_str(), I1);

        let second = reg.create(fields(), None).await.unwrap();
        assert_eq!(second.record.identifier.as_str(), I2);

        let original = reg.get(first.record.id).await.unwrap();
        assert_eq!(original.identifier.as_str(), I1);
        assert_eq!(original.fields, fields());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_collision_in_memory() {
        concurrent_creations_share_no_identifier(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_collision_in_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        concurrent_creations_share_no_identifier(file_store(&dir).await).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_updates_in_memory() {
        concurrent_updates_keep_both_edits(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_updates_in_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        concurrent_updates_keep_both_edits(file_store(&dir).await).await;
    }

    #[tokio::test]
    async fn invalid_patch_is_rejected_without_touching_the_row() {
        let reg = registry(Scripted::new(&[I1]));
        let created = reg.create(fields(), None).await.unwrap();
        let patch = RecordFieldsPatch {
            document_owner: Some("changed".into()),
            legalization_no: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(
            reg.update(created.record.id, patch).await,
            Err(RegistryError::Invalid(_))
        ));
        let kept = reg.get(created.record.id).await.unwrap();
        assert_eq!(kept.fields, fields());
    }

    #[tokio::test]
    async fn exhausted_generation_fails() {
        let reg = registry(Scripted::new(&[I1])).with_max_attempts(3);
        reg.create(fields(), None).await.unwrap();
        let err = reg.create(fields(), None).await.unwrap_err();
        assert!(matches!(err, RegistryError::GenerationExhausted { attempts: 3 }));
        assert_eq!(reg.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_fields_rejected_before_generation() {
        let reg = registry(Arc::new(RandomIdentifierGenerator));
        let mut bad = fields();
        bad.document_owner = "  ".into();
        assert!(matches!(
            reg.create(bad, None).await,
            Err(RegistryError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn public_lookup_hides_inactive_and_missing_alike() {
        let reg = registry(Scripted::new(&[I1]));
        let created = reg.create(fields(), None).await.unwrap();

        let public = reg.resolve_public(I1).await.unwrap();
        assert_eq!(public.identifier().as_str(), I1);

        reg.set_status(&[created.record.id], VisibilityStatus::Inactive)
            .await
            .unwrap();
        assert!(matches!(reg.resolve_public(I1).await, Err(RegistryError::NotFound)));
        assert!(matches!(reg.resolve_public(I2).await, Err(RegistryError::NotFound)));
        assert!(matches!(reg.resolve_public("short").await, Err(RegistryError::NotFound)));

        let internal = reg.get(created.record.id).await.unwrap();
        assert_eq!(internal.status, VisibilityStatus::Inactive);
    }

    #[tokio::test]
    async fn update_applies_patch_and_keeps_identifier() {
        let reg = registry(Scripted::new(&[I1]));
        let created = reg.create(fields(), None).await.unwrap();
        let patch = RecordFieldsPatch {
            document_owner: Some("R. Roe".into()),
            status: Some(VisibilityStatus::Inactive),
            ..Default::default()
        };
        let updated = reg.update(created.record.id, patch).await.unwrap();
        assert_eq!(updated.fields.document_owner, "R. Roe");
        assert_eq!(updated.status, VisibilityStatus::Inactive);
        assert_eq!(updated.identifier.as_str(), I1);
        assert_eq!(updated.encoded_url, created.record.encoded_url);

        assert!(matches!(
            reg.update(RecordId(999), RecordFieldsPatch::default()).await,
            Err(RegistryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn deleted_identifier_never_reissued() {
        let reg = registry(Scripted::new(&[I1, I1, I2]));
        let created = reg.create(fields(), None).await.unwrap();
        let removed = reg.delete(&[created.record.id]).await.unwrap();
        assert_eq!(removed[0].as_str(), I1);

        let next = reg.create(fields(), None).await.unwrap();
        assert_eq!(next.record.identifier.as_str(), I2);
        assert!(matches!(reg.resolve_public(I1).await, Err(RegistryError::NotFound)));
    }

    #[test]
    fn registry_errors_map_to_http_taxonomy() {
        use axum::response::IntoResponse;
        let status = |e: RegistryError| AppError::from(e).into_response().status().as_u16();
        assert_eq!(status(RegistryError::NotFound), 404);
        assert_eq!(status(RegistryError::GenerationExhausted { attempts: 10 }), 500);
        assert_eq!(status(RegistryError::Timeout(Duration::from_secs(5))), 503);
        assert_eq!(
            status(RegistryError::Storage(StoreError::Unavailable("x".into()))),
            503
        );
    }
}
