//! # Record Management API
//!
//! Authenticated CRUD over legalization records. Creation assigns the
//! identifier, stores the verification URL snapshot and renders the QR
//! image before responding.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use legal_core::{
    BaseUrl, Record, RecordFields, RecordFieldsPatch, RecordId, ValidationError, VisibilityStatus,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, Validate};
use crate::state::AppState;
use crate::store::RecordQuery;

/// Largest page size a listing may request.
pub const MAX_PAGE_SIZE: u32 = 100;
/// Largest number of ids in one bulk request.
pub const MAX_BULK_IDS: usize = 500;

// ── DTOs ────────────────────────────────────────────────────────────────────

/// A record as returned to authenticated callers.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordResponse {
    /// Row id.
    pub id: i64,
    /// 20-character public identifier.
    pub identifier: String,
    /// Verification URL under the current base URL.
    pub encoded_url: String,
    /// URL stored at creation, present only when it differs from `encoded_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_encoded_url: Option<String>,
    /// Legalization number printed on the sticker.
    pub legalization_no: String,
    /// Date the legalization was issued.
    pub issue_date: NaiveDate,
    /// Issuing mission, if recorded.
    pub place_of_issue: Option<String>,
    /// Kind of legalization, e.g. apostille or attestation.
    pub legalization_type: String,
    /// Officer who signed the legalization.
    pub authorized_officer: String,
    /// Person the legalized document belongs to.
    pub document_owner: String,
    /// Kind of document legalized.
    pub document_type: String,
    /// `active` or `inactive`.
    pub status: String,
    /// Id of the creating account, if it still exists.
    pub created_by: Option<i64>,
    /// Username of the creating account.
    pub created_by_name: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl RecordResponse {
    /// Build the response view, recomputing the URL under `base_url`.
    pub fn from_record(record: Record, base_url: &BaseUrl) -> Self {
        let encoded_url = record.current_url(base_url);
        let stored_encoded_url = (record.encoded_url != encoded_url).then_some(record.encoded_url);
        Self {
            id: record.id.0,
            identifier: record.identifier.into(),
            encoded_url,
            stored_encoded_url,
            legalization_no: record.fields.legalization_no,
            issue_date: record.fields.issue_date,
            place_of_issue: record.fields.place_of_issue,
            legalization_type: record.fields.legalization_type,
            authorized_officer: record.fields.authorized_officer,
            document_owner: record.fields.document_owner,
            document_type: record.fields.document_type,
            status: record.status.as_str().to_string(),
            created_by: record.created_by.map(|u| u.0),
            created_by_name: record.created_by_name,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Create-record request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRecordRequest {
    /// Legalization number printed on the sticker.
    pub legalization_no: String,
    /// Date the legalization was issued.
    pub issue_date: NaiveDate,
    /// Issuing mission, if recorded.
    #[serde(default)]
    pub place_of_issue: Option<String>,
    /// Kind of legalization, e.g. apostille or attestation.
    pub legalization_type: String,
    /// Officer who signed the legalization.
    pub authorized_officer: String,
    /// Person the legalized document belongs to.
    pub document_owner: String,
    /// Kind of document legalized.
    pub document_type: String,
}

impl CreateRecordRequest {
    fn into_fields(self) -> RecordFields {
        RecordFields {
            legalization_no: self.legalization_no.trim().to_string(),
            issue_date: self.issue_date,
            place_of_issue: self
                .place_of_issue
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            legalization_type: self.legalization_type.trim().to_string(),
            authorized_officer: self.authorized_officer.trim().to_string(),
            document_owner: self.document_owner.trim().to_string(),
            document_type: self.document_type.trim().to_string(),
        }
    }
}

impl Validate for CreateRecordRequest {
    fn validate(&self) -> Result<(), String> {
        RecordFields {
            legalization_no: self.legalization_no.clone(),
            issue_date: self.issue_date,
            place_of_issue: self.place_of_issue.clone(),
            legalization_type: self.legalization_type.clone(),
            authorized_officer: self.authorized_officer.clone(),
            document_owner: self.document_owner.clone(),
            document_type: self.document_type.clone(),
        }
        .validate()
        .map_err(|e| e.to_string())
    }
}

/// Create-record response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateRecordResponse {
    /// Row id of the new record.
    pub id: i64,
    /// Server-assigned public identifier.
    pub identifier: String,
    /// Verification URL embedded in the QR code.
    pub encoded_url: String,
    /// `<identifier>.png`.
    pub image_filename: String,
}

/// Partial record update. Omitted fields are unchanged; an empty
/// `place_of_issue` clears it.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateRecordRequest {
    /// New legalization number.
    pub legalization_no: Option<String>,
    /// New issue date.
    pub issue_date: Option<NaiveDate>,
    /// New place of issue; empty clears it.
    pub place_of_issue: Option<String>,
    /// New legalization type.
    pub legalization_type: Option<String>,
    /// New authorized officer.
    pub authorized_officer: Option<String>,
    /// New document owner.
    pub document_owner: Option<String>,
    /// New document type.
    pub document_type: Option<String>,
    /// `active` or `inactive`.
    pub status: Option<String>,
}

impl UpdateRecordRequest {
    fn into_patch(self) -> Result<RecordFieldsPatch, ValidationError> {
        let status = self.status.as_deref().map(str::parse).transpose()?;
        Ok(RecordFieldsPatch {
            legalization_no: self.legalization_no,
            issue_date: self.issue_date,
            place_of_issue: self.place_of_issue,
            legalization_type: self.legalization_type,
            authorized_officer: self.authorized_officer,
            document_owner: self.document_owner,
            document_type: self.document_type,
            status,
        })
    }
}

/// Listing query.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListRecordsQuery {
    /// 1-based page, default 1.
    pub page: Option<u32>,
    /// Page size, default 10, clamped to 1..=100.
    pub limit: Option<u32>,
    /// Substring over identifier, legalization number, owner and officer.
    pub search: Option<String>,
    /// `active` or `inactive`.
    pub status: Option<String>,
}

impl ListRecordsQuery {
    fn into_query(self) -> Result<RecordQuery, ValidationError> {
        let status = self
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .transpose()?;
        Ok(RecordQuery {
            page: self.page.unwrap_or(1).max(1),
            limit: self.limit.unwrap_or(10).clamp(1, MAX_PAGE_SIZE),
            search: self.search,
            status,
        })
    }
}

/// Page metadata.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    /// Current 1-based page.
    pub page: u32,
    /// Page size in effect.
    pub limit: u32,
    /// Matching records across all pages.
    pub total: u64,
    /// Number of pages at this size.
    pub total_pages: u64,
}

/// Listing response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListRecordsResponse {
    /// Records on this page, newest first.
    pub records: Vec<RecordResponse>,
    /// Page metadata.
    pub pagination: Pagination,
}

/// A set of record ids.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkIdsRequest {
    /// Record ids, at most 500.
    pub ids: Vec<i64>,
}

fn validate_ids(ids: &[i64]) -> Result<(), String> {
    if ids.is_empty() {
        return Err("ids must not be empty".into());
    }
    if ids.len() > MAX_BULK_IDS {
        return Err(format!("at most {MAX_BULK_IDS} ids per request"));
    }
    Ok(())
}

impl Validate for BulkIdsRequest {
    fn validate(&self) -> Result<(), String> {
        validate_ids(&self.ids)
    }
}

/// Bulk status change.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkStatusRequest {
    /// Record ids, at most 500.
    pub ids: Vec<i64>,
    /// `active` or `inactive`.
    pub status: String,
}

impl Validate for BulkStatusRequest {
    fn validate(&self) -> Result<(), String> {
        validate_ids(&self.ids)?;
        self.status
            .parse::<VisibilityStatus>()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Bulk status change result.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkStatusResponse {
    /// Records whose status was set.
    pub updated: u64,
    /// Status applied.
    pub status: String,
}

/// Deletion result.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteRecordsResponse {
    /// Records actually removed.
    pub deleted: usize,
    /// Identifiers of the removed records. They are retired permanently.
    pub identifiers: Vec<String>,
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the records router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/records",
            get(list_records).post(create_record).delete(delete_records),
        )
        .route("/api/records/status", patch(update_status))
        .route(
            "/api/records/:id",
            get(get_record).put(update_record).delete(delete_record),
        )
}

fn to_ids(ids: &[i64]) -> Vec<RecordId> {
    ids.iter().copied().map(RecordId).collect()
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// GET /api/records: List records with search, status filter and pagination.
#[utoipa::path(
    get,
    path = "/api/records",
    params(ListRecordsQuery),
    responses(
        (status = 200, description = "One page of records", body = ListRecordsResponse),
        (status = 422, description = "Unknown status filter", body = crate::error::ErrorBody),
    ),
    tag = "records"
)]
pub async fn list_records(
    State(state): State<AppState>,
    query: Result<Query<ListRecordsQuery>, QueryRejection>,
) -> Result<Json<ListRecordsResponse>, AppError> {
    let query = extract_query(query)?.into_query()?;
    let page = state.registry.list(&query).await?;
    let base_url = state.registry.base_url();
    Ok(Json(ListRecordsResponse {
        records: page
            .items
            .into_iter()
            .map(|r| RecordResponse::from_record(r, base_url))
            .collect(),
        pagination: Pagination {
            page: query.page,
            limit: query.limit,
            total: page.total,
            total_pages: page.total.div_ceil(u64::from(query.limit)),
        },
    }))
}

/// POST /api/records: Create a record and render its QR image.
#[utoipa::path(
    post,
    path = "/api/records",
    request_body = CreateRecordRequest,
    responses(
        (status = 201, description = "Record created", body = CreateRecordResponse),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
        (status = 500, description = "Identifier generation exhausted or render failure", body = crate::error::ErrorBody),
    ),
    tag = "records"
)]
pub async fn create_record(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateRecordRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateRecordResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let created = state
        .registry
        .create(req.into_fields(), Some(caller.user_id))
        .await?;

    // The row is kept if rendering fails; the image renders on demand later.
    state.images.regenerate(&created.record).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateRecordResponse {
            id: created.record.id.0,
            identifier: created.record.identifier.to_string(),
            encoded_url: created.record.encoded_url,
            image_filename: created.image_filename,
        }),
    ))
}

/// GET /api/records/:id: Fetch a record by id, whatever its status.
#[utoipa::path(
    get,
    path = "/api/records/{id}",
    params(("id" = i64, Path, description = "Record ID")),
    responses(
        (status = 200, description = "Record found", body = RecordResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "records"
)]
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RecordResponse>, AppError> {
    let record = state.registry.get(RecordId(id)).await?;
    Ok(Json(RecordResponse::from_record(
        record,
        state.registry.base_url(),
    )))
}

/// PUT /api/records/:id: Partially update descriptive fields and status.
#[utoipa::path(
    put,
    path = "/api/records/{id}",
    params(("id" = i64, Path, description = "Record ID")),
    request_body = UpdateRecordRequest,
    responses(
        (status = 200, description = "Record updated", body = RecordResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "records"
)]
pub async fn update_record(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<i64>,
    body: Result<Json<UpdateRecordRequest>, JsonRejection>,
) -> Result<Json<RecordResponse>, AppError> {
    let patch = extract_json(body)?.into_patch()?;
    if patch.is_empty() {
        return Err(AppError::Validation("no fields to update".into()));
    }
    let record = state.registry.update(RecordId(id), patch).await?;
    tracing::info!(record_id = id, by = %caller.username, "record edited");
    Ok(Json(RecordResponse::from_record(
        record,
        state.registry.base_url(),
    )))
}

/// DELETE /api/records/:id: Delete one record and its image.
#[utoipa::path(
    delete,
    path = "/api/records/{id}",
    params(("id" = i64, Path, description = "Record ID")),
    responses(
        (status = 200, description = "Record deleted", body = DeleteRecordsResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "records"
)]
pub async fn delete_record(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<i64>,
) -> Result<Json<DeleteRecordsResponse>, AppError> {
    let response = delete_ids(&state, &caller, &[RecordId(id)]).await?;
    if response.deleted == 0 {
        return Err(AppError::record_not_found());
    }
    Ok(Json(response))
}

/// DELETE /api/records: Delete several records and their images.
#[utoipa::path(
    delete,
    path = "/api/records",
    request_body = BulkIdsRequest,
    responses(
        (status = 200, description = "Records deleted", body = DeleteRecordsResponse),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "records"
)]
pub async fn delete_records(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<BulkIdsRequest>, JsonRejection>,
) -> Result<Json<DeleteRecordsResponse>, AppError> {
    let req = extract_validated_json(body)?;
    Ok(Json(delete_ids(&state, &caller, &to_ids(&req.ids)).await?))
}

async fn delete_ids(
    state: &AppState,
    caller: &CallerIdentity,
    ids: &[RecordId],
) -> Result<DeleteRecordsResponse, AppError> {
    let removed = state.registry.delete(ids).await?;
    tracing::info!(by = %caller.username, count = removed.len(), "records removed by user");
    let identifiers = removed.iter().map(ToString::to_string).collect();
    let deleted = removed.len();
    state.images.remove(removed).await;
    Ok(DeleteRecordsResponse {
        deleted,
        identifiers,
    })
}

/// PATCH /api/records/status: Set the status of several records.
#[utoipa::path(
    patch,
    path = "/api/records/status",
    request_body = BulkStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = BulkStatusResponse),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "records"
)]
pub async fn update_status(
    State(state): State<AppState>,
    body: Result<Json<BulkStatusRequest>, JsonRejection>,
) -> Result<Json<BulkStatusResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let status: VisibilityStatus = req.status.parse()?;
    let updated = state.registry.set_status(&to_ids(&req.ids), status).await?;
    Ok(Json(BulkStatusResponse {
        updated,
        status: status.as_str().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_clamps_and_defaults() {
        let q = ListRecordsQuery::default().into_query().unwrap();
        assert_eq!((q.page, q.limit), (1, 10));

        let q = ListRecordsQuery {
            page: Some(0),
            limit: Some(1000),
            ..Default::default()
        }
        .into_query()
        .unwrap();
        assert_eq!((q.page, q.limit), (1, MAX_PAGE_SIZE));

        let q = ListRecordsQuery {
            status: Some("inactive".into()),
            ..Default::default()
        }
        .into_query()
        .unwrap();
        assert_eq!(q.status, Some(VisibilityStatus::Inactive));

        assert!(ListRecordsQuery {
            status: Some("archived".into()),
            ..Default::default()
        }
        .into_query()
        .is_err());
    }

    #[test]
    fn bulk_ids_bounds() {
        assert!(BulkIdsRequest { ids: vec![] }.validate().is_err());
        assert!(BulkIdsRequest { ids: vec![1, 2] }.validate().is_ok());
        assert!(BulkIdsRequest {
            ids: vec![1; MAX_BULK_IDS + 1]
        }
        .validate()
        .is_err());
        assert!(BulkStatusRequest {
            ids: vec![1],
            status: "hidden".into()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn update_request_rejects_unknown_status() {
        let req = UpdateRecordRequest {
            status: Some("deleted".into()),
            ..Default::default()
        };
        assert!(req.into_patch().is_err());
    }

    #[test]
    fn create_request_trims_and_drops_blank_place() {
        let req = CreateRecordRequest {
            legalization_no: " LEG-1 ".into(),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            place_of_issue: Some("   ".into()),
            legalization_type: "Apostille".into(),
            authorized_officer: "Consul".into(),
            document_owner: "Owner".into(),
            document_type: "Deed".into(),
        };
        assert!(req.validate().is_ok());
        let fields = req.into_fields();
        assert_eq!(fields.legalization_no, "LEG-1");
        assert_eq!(fields.place_of_issue, None);
    }
}
