//! Record persistence operations.
//!
//! All functions take a `&SqlitePool` and operate on the `records` and
//! `issued_identifiers` tables.

use chrono::{DateTime, NaiveDate, Utc};
use legal_core::{
    Identifier, Record, RecordFields, RecordFieldsPatch, RecordId, UserId, VisibilityStatus,
};
use sqlx::SqlitePool;

use crate::store::{NewRecord, Page, RecordQuery, StoreError};

const SELECT_RECORD: &str = "SELECT r.id, r.qr_code, r.encoded_url, r.legalization_no,
        r.issue_date, r.place_of_issue, r.legalization_type, r.authorized_officer,
        r.document_owner, r.document_type, r.status, r.created_by,
        u.username AS created_by_name, r.created_at, r.updated_at
    FROM records r LEFT JOIN users u ON u.id = r.created_by";

const FILTER: &str = r"WHERE (?1 IS NULL OR r.status = ?1)
      AND (?2 IS NULL
           OR r.qr_code LIKE ?2 ESCAPE '\'
           OR r.legalization_no LIKE ?2 ESCAPE '\'
           OR r.document_owner LIKE ?2 ESCAPE '\'
           OR r.authorized_officer LIKE ?2 ESCAPE '\')";

/// Insert a record, first claiming its identifier in `issued_identifiers`.
///
/// Both inserts run in one transaction. A unique violation on either table
/// means the identifier was issued before.
pub async fn insert_unique(pool: &SqlitePool, new: &NewRecord) -> Result<Record, StoreError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO issued_identifiers (identifier, issued_at) VALUES (?1, ?2)")
        .bind(new.identifier.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(duplicate_identifier)?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO records (qr_code, encoded_url, legalization_no, issue_date,
         place_of_issue, legalization_type, authorized_officer, document_owner,
         document_type, status, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
         RETURNING id",
    )
    .bind(new.identifier.as_str())
    .bind(&new.encoded_url)
    .bind(&new.fields.legalization_no)
    .bind(new.fields.issue_date)
    .bind(&new.fields.place_of_issue)
    .bind(&new.fields.legalization_type)
    .bind(&new.fields.authorized_officer)
    .bind(&new.fields.document_owner)
    .bind(&new.fields.document_type)
    .bind(VisibilityStatus::Active.as_str())
    .bind(new.created_by.map(|u| u.0))
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(duplicate_identifier)?;

    tx.commit().await?;

    get_by_id(pool, RecordId(id))
        .await?
        .ok_or_else(|| StoreError::Unavailable(format!("record {id} vanished after insert")))
}

fn duplicate_identifier(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateIdentifier,
        _ => err.into(),
    }
}

/// Fetch a record by row id.
pub async fn get_by_id(pool: &SqlitePool, id: RecordId) -> Result<Option<Record>, StoreError> {
    let row = sqlx::query_as::<_, RecordRow>(&format!("{SELECT_RECORD} WHERE r.id = ?1"))
        .bind(id.0)
        .fetch_optional(pool)
        .await?;
    row.map(RecordRow::into_record).transpose()
}

/// Fetch a record by identifier.
pub async fn get_by_identifier(
    pool: &SqlitePool,
    identifier: &Identifier,
) -> Result<Option<Record>, StoreError> {
    let row = sqlx::query_as::<_, RecordRow>(&format!("{SELECT_RECORD} WHERE r.qr_code = ?1"))
        .bind(identifier.as_str())
        .fetch_optional(pool)
        .await?;
    row.map(RecordRow::into_record).transpose()
}

/// Apply a patch in a single statement. Unset fields keep their stored value.
pub async fn update(
    pool: &SqlitePool,
    id: RecordId,
    patch: &RecordFieldsPatch,
) -> Result<Record, StoreError> {
    let place = patch.place_of_issue_change();
    let result = sqlx::query(
        "UPDATE records SET
             legalization_no = COALESCE(?1, legalization_no),
             issue_date = COALESCE(?2, issue_date),
             place_of_issue = CASE WHEN ?3 THEN ?4 ELSE place_of_issue END,
             legalization_type = COALESCE(?5, legalization_type),
             authorized_officer = COALESCE(?6, authorized_officer),
             document_owner = COALESCE(?7, document_owner),
             document_type = COALESCE(?8, document_type),
             status = COALESCE(?9, status),
             updated_at = ?10
         WHERE id = ?11",
    )
    .bind(patch.legalization_no.as_deref())
    .bind(patch.issue_date)
    .bind(place.is_some())
    .bind(place.flatten())
    .bind(patch.legalization_type.as_deref())
    .bind(patch.authorized_officer.as_deref())
    .bind(patch.document_owner.as_deref())
    .bind(patch.document_type.as_deref())
    .bind(patch.status.map(|s| s.as_str()))
    .bind(Utc::now())
    .bind(id.0)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    get_by_id(pool, id).await?.ok_or(StoreError::NotFound)
}

/// Set the status of several records in one transaction.
pub async fn update_status(
    pool: &SqlitePool,
    ids: &[RecordId],
    status: VisibilityStatus,
) -> Result<u64, StoreError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let mut changed = 0;
    for id in ids {
        changed += sqlx::query("UPDATE records SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status.as_str())
            .bind(now)
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    tx.commit().await?;
    Ok(changed)
}

/// Delete records. Their identifiers remain in `issued_identifiers`.
pub async fn delete(pool: &SqlitePool, ids: &[RecordId]) -> Result<Vec<Identifier>, StoreError> {
    let mut tx = pool.begin().await?;
    let mut removed = Vec::with_capacity(ids.len());
    for id in ids {
        let code: Option<String> =
            sqlx::query_scalar("DELETE FROM records WHERE id = ?1 RETURNING qr_code")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(code) = code {
            removed.push(parse_identifier(code)?);
        }
    }
    tx.commit().await?;
    Ok(removed)
}

/// Filtered, paginated listing, newest first.
pub async fn list(pool: &SqlitePool, query: &RecordQuery) -> Result<Page<Record>, StoreError> {
    let status = query.status.map(|s| s.as_str());
    let pattern = query.search_term().map(|t| format!("%{}%", escape_like(t)));

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM records r {FILTER}"))
        .bind(status)
        .bind(pattern.as_deref())
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, RecordRow>(&format!(
        "{SELECT_RECORD} {FILTER} ORDER BY r.created_at DESC, r.id DESC LIMIT ?3 OFFSET ?4"
    ))
    .bind(status)
    .bind(pattern.as_deref())
    .bind(i64::from(query.limit))
    .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;

    let items = rows
        .into_iter()
        .map(RecordRow::into_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page {
        items,
        total: u64::try_from(total).unwrap_or(0),
    })
}

/// Number of live records.
pub async fn count(pool: &SqlitePool) -> Result<u64, StoreError> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
        .fetch_one(pool)
        .await?;
    Ok(u64::try_from(n).unwrap_or(0))
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn parse_identifier(code: String) -> Result<Identifier, StoreError> {
    Identifier::new(code).map_err(|e| {
        tracing::warn!(error = %e, "unparseable qr_code in records table");
        StoreError::Corrupt(e.to_string())
    })
}

fn parse_status(s: &str) -> Result<VisibilityStatus, StoreError> {
    s.parse().map_err(|_| {
        tracing::warn!(status = s, "unknown record status in database");
        StoreError::Corrupt(format!("unknown record status {s:?}"))
    })
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct RecordRow {
    id: i64,
    qr_code: String,
    encoded_url: String,
    legalization_no: String,
    issue_date: NaiveDate,
    place_of_issue: Option<String>,
    legalization_type: String,
    authorized_officer: String,
    document_owner: String,
    document_type: String,
    status: String,
    created_by: Option<i64>,
    created_by_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self) -> Result<Record, StoreError> {
        Ok(Record {
            id: RecordId(self.id),
            identifier: parse_identifier(self.qr_code)?,
            encoded_url: self.encoded_url,
            fields: RecordFields {
                legalization_no: self.legalization_no,
                issue_date: self.issue_date,
                place_of_issue: self.place_of_issue,
                legalization_type: self.legalization_type,
                authorized_officer: self.authorized_officer,
                document_owner: self.document_owner,
                document_type: self.document_type,
            },
            status: parse_status(&self.status)?,
            created_by: self.created_by.map(UserId),
            created_by_name: self.created_by_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn new_record(code: &str, owner: &str) -> NewRecord {
        NewRecord {
            identifier: Identifier::new(code).unwrap(),
            encoded_url: format!("http://localhost:3000/check/sticker?qr={code}"),
            fields: RecordFields {
                legalization_no: "LEG-100".into(),
                issue_date: NaiveDate::from_ymd_opt(2023, 11, 5).unwrap(),
                place_of_issue: Some("Consulate".into()),
                legalization_type: "Attestation".into(),
                authorized_officer: "Consul".into(),
                document_owner: owner.into(),
                document_type: "Contract".into(),
            },
            created_by: None,
        }
    }

    const A: &str = "AAAAAAAAAAAAAAAAAAAA";
    const B: &str = "BBBBBBBBBBBBBBBBBBBB";

    #[tokio::test]
    async fn insert_and_fetch() {
        let pool = test_pool().await;
        let rec = insert_unique(&pool, &new_record(A, "Owner 100%")).await.unwrap();
        assert_eq!(rec.identifier.as_str(), A);
        assert_eq!(rec.status, VisibilityStatus::Active);
        assert_eq!(rec.fields.issue_date, NaiveDate::from_ymd_opt(2023, 11, 5).unwrap());

        let by_code = get_by_identifier(&pool, &rec.identifier).await.unwrap().unwrap();
        assert_eq!(by_code, rec);
    }

    #[tokio::test]
    async fn duplicate_and_retired_identifiers_rejected() {
        let pool = test_pool().await;
        let rec = insert_unique(&pool, &new_record(A, "x")).await.unwrap();
        assert!(matches!(
            insert_unique(&pool, &new_record(A, "y")).await,
            Err(StoreError::DuplicateIdentifier)
        ));

        let removed = delete(&pool, &[rec.id]).await.unwrap();
        assert_eq!(removed, vec![rec.identifier.clone()]);
        assert!(get_by_id(&pool, rec.id).await.unwrap().is_none());
        assert!(matches!(
            insert_unique(&pool, &new_record(A, "z")).await,
            Err(StoreError::DuplicateIdentifier)
        ));
        assert_eq!(count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_merges_patch_and_status() {
        let pool = test_pool().await;
        let rec = insert_unique(&pool, &new_record(A, "x")).await.unwrap();
        let patch = RecordFieldsPatch {
            document_owner: Some("Changed".into()),
            place_of_issue: Some(String::new()),
            status: Some(VisibilityStatus::Inactive),
            ..Default::default()
        };

        let updated = update(&pool, rec.id, &patch).await.unwrap();
        assert_eq!(updated.fields.document_owner, "Changed");
        assert_eq!(updated.fields.place_of_issue, None);
        assert_eq!(updated.fields.legalization_no, rec.fields.legalization_no);
        assert_eq!(updated.fields.issue_date, rec.fields.issue_date);
        assert_eq!(updated.status, VisibilityStatus::Inactive);
        assert_eq!(updated.identifier, rec.identifier);

        let officer = RecordFieldsPatch {
            authorized_officer: Some("Vice Consul".into()),
            place_of_issue: Some("Embassy".into()),
            ..Default::default()
        };
        let kept = update(&pool, rec.id, &officer).await.unwrap();
        assert_eq!(kept.status, VisibilityStatus::Inactive);
        assert_eq!(kept.fields.document_owner, "Changed");
        assert_eq!(kept.fields.authorized_officer, "Vice Consul");
        assert_eq!(kept.fields.place_of_issue.as_deref(), Some("Embassy"));

        assert!(matches!(
            update(&pool, RecordId(404), &patch).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_search_is_literal_and_case_insensitive() {
        let pool = test_pool().await;
        insert_unique(&pool, &new_record(A, "Owner 100%")).await.unwrap();
        insert_unique(&pool, &new_record(B, "Owner 1000")).await.unwrap();

        let q = RecordQuery {
            search: Some("100%".into()),
            ..Default::default()
        };
        let page = list(&pool, &q).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].fields.document_owner, "Owner 100%");

        let q = RecordQuery {
            search: Some("owner".into()),
            ..Default::default()
        };
        assert_eq!(list(&pool, &q).await.unwrap().total, 2);

        let q = RecordQuery {
            search: Some("bbbbb".into()),
            ..Default::default()
        };
        assert_eq!(list(&pool, &q).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn list_search_folds_ascii_case_only() {
        let pool = test_pool().await;
        insert_unique(&pool, &new_record(A, "Élodie Martin")).await.unwrap();

        let q = RecordQuery {
            search: Some("ÉLODIE MARTIN".into()),
            ..Default::default()
        };
        assert_eq!(list(&pool, &q).await.unwrap().total, 1);

        let q = RecordQuery {
            search: Some("élodie".into()),
            ..Default::default()
        };
        assert_eq!(list(&pool, &q).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn list_filters_status_and_paginates() {
        let pool = test_pool().await;
        let a = insert_unique(&pool, &new_record(A, "a")).await.unwrap();
        insert_unique(&pool, &new_record(B, "b")).await.unwrap();
        assert_eq!(
            update_status(&pool, &[a.id, RecordId(77)], VisibilityStatus::Inactive)
                .await
                .unwrap(),
            1
        );

        let inactive = list(
            &pool,
            &RecordQuery {
                status: Some(VisibilityStatus::Inactive),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(inactive.total, 1);
        assert_eq!(inactive.items[0].id, a.id);

        let second = list(
            &pool,
            &RecordQuery {
                page: 2,
                limit: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(second.total, 2);
        assert_eq!(second.items.len(), 1);
    }

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like(r"50%_a\b"), r"50\%\_a\\b");
    }
}
