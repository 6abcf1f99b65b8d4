//! # Authenticated QR Image API
//!
//! Image access for staff: any status, forced re-render, and a download
//! manifest for batches of codes.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use legal_core::{image_filename, Identifier, RecordId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::routes::verification::{png_response, Disposition};
use crate::state::AppState;

/// Largest number of codes in one batch.
pub const MAX_BATCH_CODES: usize = 500;

/// Batch download request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DownloadBatchRequest {
    /// Identifiers to include, at most 500.
    pub codes: Vec<String>,
}

impl Validate for DownloadBatchRequest {
    fn validate(&self) -> Result<(), String> {
        if self.codes.is_empty() {
            return Err("codes must not be empty".into());
        }
        if self.codes.len() > MAX_BATCH_CODES {
            return Err(format!("at most {MAX_BATCH_CODES} codes per request"));
        }
        Ok(())
    }
}

/// One entry of a batch manifest.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchFile {
    /// Record identifier.
    pub identifier: String,
    /// `<identifier>.png`.
    pub filename: String,
    /// Public download path. Resolves only while the record is active.
    pub download_url: String,
    /// `active` or `inactive`.
    pub status: String,
}

/// Batch download manifest.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadBatchResponse {
    /// One entry per requested code, in request order.
    pub files: Vec<BatchFile>,
}

/// Build the authenticated QR router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/records/:id/qrcode", get(record_qrcode))
        .route("/api/records/:id/qrcode/regenerate", post(regenerate_qrcode))
        .route("/api/qrcode/download-batch", post(download_batch))
}

/// GET /api/records/:id/qrcode: QR image of a record, whatever its status.
#[utoipa::path(
    get,
    path = "/api/records/{id}/qrcode",
    params(("id" = i64, Path, description = "Record ID")),
    responses(
        (status = 200, description = "PNG image", body = Vec<u8>, content_type = "image/png"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "qrcode"
)]
pub async fn record_qrcode(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let record = state.registry.get(RecordId(id)).await?;
    let png = state.images.ensure(&record).await?;
    Ok(png_response(
        png,
        &image_filename(&record.identifier),
        Disposition::Inline,
    ))
}

/// POST /api/records/:id/qrcode/regenerate: Re-render from the current base URL.
#[utoipa::path(
    post,
    path = "/api/records/{id}/qrcode/regenerate",
    params(("id" = i64, Path, description = "Record ID")),
    responses(
        (status = 200, description = "Freshly rendered PNG", body = Vec<u8>, content_type = "image/png"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "qrcode"
)]
pub async fn regenerate_qrcode(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let record = state.registry.get(RecordId(id)).await?;
    let png = state.images.regenerate(&record).await?;
    Ok(png_response(
        png,
        &image_filename(&record.identifier),
        Disposition::Inline,
    ))
}

/// POST /api/qrcode/download-batch: Ensure images exist and list their download paths.
#[utoipa::path(
    post,
    path = "/api/qrcode/download-batch",
    request_body = DownloadBatchRequest,
    responses(
        (status = 200, description = "Download manifest", body = DownloadBatchResponse),
        (status = 404, description = "Some codes are unknown", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "qrcode"
)]
pub async fn download_batch(
    State(state): State<AppState>,
    body: Result<Json<DownloadBatchRequest>, JsonRejection>,
) -> Result<Json<DownloadBatchResponse>, AppError> {
    let req = extract_validated_json(body)?;

    let mut records = Vec::with_capacity(req.codes.len());
    let mut unknown = Vec::new();
    for code in &req.codes {
        let found = match Identifier::new(code.trim()) {
            Ok(identifier) => state.registry.find_by_identifier(&identifier).await?,
            Err(_) => None,
        };
        match found {
            Some(record) => records.push(record),
            None => unknown.push(code.clone()),
        }
    }
    if !unknown.is_empty() {
        return Err(AppError::NotFound(format!(
            "unknown codes: {}",
            unknown.join(", ")
        )));
    }

    let mut files = Vec::with_capacity(records.len());
    for record in &records {
        state.images.ensure(record).await?;
        files.push(BatchFile {
            identifier: record.identifier.to_string(),
            filename: image_filename(&record.identifier),
            download_url: format!("/api/qrcode/download/{}", record.identifier),
            status: record.status.as_str().to_string(),
        });
    }
    tracing::info!(count = files.len(), "batch download manifest prepared");
    Ok(Json(DownloadBatchResponse { files }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_request_bounds() {
        assert!(DownloadBatchRequest { codes: vec![] }.validate().is_err());
        assert!(DownloadBatchRequest {
            codes: vec!["A".into(); MAX_BATCH_CODES + 1]
        }
        .validate()
        .is_err());
        assert!(DownloadBatchRequest {
            codes: vec!["A".into()]
        }
        .validate()
        .is_ok());
    }
}
