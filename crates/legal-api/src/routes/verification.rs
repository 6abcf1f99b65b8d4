//! # Public Verification API
//!
//! Unauthenticated lookup by QR code, as reached by scanning a sticker.
//! Every failure (malformed code, unknown code, inactive record) produces
//! the same 404 body, so a caller cannot learn that a retracted record ever
//! existed.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use legal_core::{extract_identifier, image_filename, PublicRecord};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::state::AppState;

/// Public projection of an active record.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublicRecordView {
    /// Public identifier from the QR code.
    pub identifier: String,
    /// Legalization number printed on the sticker.
    pub legalization_no: String,
    /// Date the legalization was issued.
    pub issue_date: NaiveDate,
    /// Issuing mission, if recorded.
    pub place_of_issue: Option<String>,
    /// Kind of legalization.
    pub legalization_type: String,
    /// Officer who signed the legalization.
    pub authorized_officer: String,
    /// Person the legalized document belongs to.
    pub document_owner: String,
    /// Kind of document legalized.
    pub document_type: String,
    /// Always `active`; inactive records are not served.
    pub status: String,
    /// When the record was registered.
    pub created_at: DateTime<Utc>,
}

impl From<PublicRecord> for PublicRecordView {
    fn from(record: PublicRecord) -> Self {
        let fields = record.fields().clone();
        Self {
            identifier: record.identifier().to_string(),
            legalization_no: fields.legalization_no,
            issue_date: fields.issue_date,
            place_of_issue: fields.place_of_issue,
            legalization_type: fields.legalization_type,
            authorized_officer: fields.authorized_officer,
            document_owner: fields.document_owner,
            document_type: fields.document_type,
            status: record.status().as_str().to_string(),
            created_at: record.created_at(),
        }
    }
}

/// Lookup response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LookupResponse {
    /// The verified record.
    pub record: PublicRecordView,
}

/// Query of the sticker check endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StickerQuery {
    /// The identifier, or the full scanned verification URL.
    pub qr: Option<String>,
}

/// Build the public verification router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/check/sticker", get(check_sticker))
        .route("/api/qrcode/info/:code", get(qrcode_info))
        .route("/api/qrcode/download/:code", get(download_qrcode))
        .route("/api/qrcode/preview/:code", get(preview_qrcode))
}

async fn lookup(state: &AppState, raw: &str) -> Result<LookupResponse, AppError> {
    let identifier = extract_identifier(raw).map_err(|_| AppError::record_not_found())?;
    let record = state.registry.resolve_public(identifier.as_str()).await?;
    Ok(LookupResponse {
        record: record.into(),
    })
}

/// GET /api/check/sticker: Look up a record by the `qr` query parameter.
#[utoipa::path(
    get,
    path = "/api/check/sticker",
    params(StickerQuery),
    responses(
        (status = 200, description = "Active record found", body = LookupResponse),
        (status = 404, description = "No active record for this code", body = crate::error::ErrorBody),
    ),
    security(()),
    tag = "verification"
)]
pub async fn check_sticker(
    State(state): State<AppState>,
    query: Result<Query<StickerQuery>, QueryRejection>,
) -> Result<Json<LookupResponse>, AppError> {
    let raw = query
        .ok()
        .and_then(|Query(q)| q.qr)
        .ok_or_else(AppError::record_not_found)?;
    Ok(Json(lookup(&state, &raw).await?))
}

/// GET /api/qrcode/info/:code: Look up a record by code in the path.
#[utoipa::path(
    get,
    path = "/api/qrcode/info/{code}",
    params(("code" = String, Path, description = "20-character identifier")),
    responses(
        (status = 200, description = "Active record found", body = LookupResponse),
        (status = 404, description = "No active record for this code", body = crate::error::ErrorBody),
    ),
    security(()),
    tag = "verification"
)]
pub async fn qrcode_info(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<LookupResponse>, AppError> {
    Ok(Json(lookup(&state, &code).await?))
}

/// GET /api/qrcode/download/:code: QR image of an active record as an attachment.
#[utoipa::path(
    get,
    path = "/api/qrcode/download/{code}",
    params(("code" = String, Path, description = "20-character identifier")),
    responses(
        (status = 200, description = "PNG image", body = Vec<u8>, content_type = "image/png"),
        (status = 404, description = "No active record for this code", body = crate::error::ErrorBody),
    ),
    security(()),
    tag = "verification"
)]
pub async fn download_qrcode(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    serve_public_image(&state, &code, Disposition::Attachment).await
}

/// GET /api/qrcode/preview/:code: QR image of an active record, inline.
#[utoipa::path(
    get,
    path = "/api/qrcode/preview/{code}",
    params(("code" = String, Path, description = "20-character identifier")),
    responses(
        (status = 200, description = "PNG image", body = Vec<u8>, content_type = "image/png"),
        (status = 404, description = "No active record for this code", body = crate::error::ErrorBody),
    ),
    security(()),
    tag = "verification"
)]
pub async fn preview_qrcode(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    serve_public_image(&state, &code, Disposition::Inline).await
}

async fn serve_public_image(
    state: &AppState,
    code: &str,
    disposition: Disposition,
) -> Result<Response, AppError> {
    let record = state.registry.find_public(code).await?;
    let png = state.images.ensure(&record).await?;
    Ok(png_response(png, &image_filename(&record.identifier), disposition))
}

/// How a PNG response should be presented by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Inline,
    Attachment,
}

/// PNG body with content type, disposition and a no-store cache policy.
///
/// Public images must not be cached: a record can become inactive at any
/// time.
pub(crate) fn png_response(png: Vec<u8>, filename: &str, disposition: Disposition) -> Response {
    let disposition = match disposition {
        Disposition::Inline => format!("inline; filename=\"{filename}\""),
        Disposition::Attachment => format!("attachment; filename=\"{filename}\""),
    };
    (
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        png,
    )
        .into_response()
}
