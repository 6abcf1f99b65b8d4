//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the Bearer token security scheme to the spec.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Opaque session token returned by POST /api/auth/login.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Legalization Registry API",
        version = "0.1.0",
        description = "Consular legalization records with QR verification stickers: record management, QR image issuance, and the public lookup behind each sticker.",
        license(name = "AGPL-3.0-or-later")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Public verification ──────────────────────────────────────────
        crate::routes::verification::check_sticker,
        crate::routes::verification::qrcode_info,
        crate::routes::verification::download_qrcode,
        crate::routes::verification::preview_qrcode,
        // ── Sessions ─────────────────────────────────────────────────────
        crate::routes::auth::login,
        crate::routes::auth::me,
        crate::routes::auth::change_password,
        crate::routes::auth::logout,
        // ── Records ──────────────────────────────────────────────────────
        crate::routes::records::list_records,
        crate::routes::records::create_record,
        crate::routes::records::get_record,
        crate::routes::records::update_record,
        crate::routes::records::delete_record,
        crate::routes::records::delete_records,
        crate::routes::records::update_status,
        // ── QR images ────────────────────────────────────────────────────
        crate::routes::qrcode::record_qrcode,
        crate::routes::qrcode::regenerate_qrcode,
        crate::routes::qrcode::download_batch,
        // ── Users ────────────────────────────────────────────────────────
        crate::routes::users::list_users,
        crate::routes::users::create_user,
        crate::routes::users::update_user,
        crate::routes::users::delete_user,
        crate::routes::users::stats,
    ),
    components(schemas(
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        // Verification DTOs
        crate::routes::verification::PublicRecordView,
        crate::routes::verification::LookupResponse,
        // Session DTOs
        crate::auth::Role,
        crate::routes::auth::UserResponse,
        crate::routes::auth::LoginRequest,
        crate::routes::auth::LoginResponse,
        crate::routes::auth::ChangePasswordRequest,
        // Record DTOs
        crate::routes::records::RecordResponse,
        crate::routes::records::CreateRecordRequest,
        crate::routes::records::CreateRecordResponse,
        crate::routes::records::UpdateRecordRequest,
        crate::routes::records::Pagination,
        crate::routes::records::ListRecordsResponse,
        crate::routes::records::BulkIdsRequest,
        crate::routes::records::BulkStatusRequest,
        crate::routes::records::BulkStatusResponse,
        crate::routes::records::DeleteRecordsResponse,
        // QR DTOs
        crate::routes::qrcode::DownloadBatchRequest,
        crate::routes::qrcode::BatchFile,
        crate::routes::qrcode::DownloadBatchResponse,
        // User DTOs
        crate::routes::users::CreateUserRequest,
        crate::routes::users::UpdateUserRequest,
        crate::routes::users::StatsResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "verification", description = "Public lookup behind each QR sticker"),
        (name = "auth", description = "Login, logout and password change"),
        (name = "records", description = "Legalization record management"),
        (name = "qrcode", description = "QR image issuance for staff"),
        (name = "users", description = "Account administration"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates_successfully() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Legalization Registry API");
    }

    #[test]
    fn test_openapi_spec_has_public_lookup_paths() {
        let spec = ApiDoc::openapi();
        for path in [
            "/api/check/sticker",
            "/api/qrcode/info/{code}",
            "/api/qrcode/download/{code}",
            "/api/qrcode/preview/{code}",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn test_openapi_spec_has_record_paths() {
        let spec = ApiDoc::openapi();
        for path in [
            "/api/records",
            "/api/records/{id}",
            "/api/records/status",
            "/api/records/{id}/qrcode",
            "/api/records/{id}/qrcode/regenerate",
            "/api/qrcode/download-batch",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn test_openapi_spec_has_schemas() {
        let spec = ApiDoc::openapi();
        let schemas = &spec.components.as_ref().unwrap().schemas;
        assert!(schemas.contains_key("ErrorBody"));
        assert!(schemas.contains_key("RecordResponse"));
        assert!(schemas.contains_key("LookupResponse"));
    }

    #[test]
    fn test_openapi_schema_fields_are_described() {
        let json = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let schemas = &json["components"]["schemas"];
        for (schema, field) in [
            ("RecordResponse", "legalization_no"),
            ("RecordResponse", "created_by_name"),
            ("CreateRecordRequest", "issue_date"),
            ("CreateRecordResponse", "image_filename"),
            ("PublicRecordView", "document_owner"),
            ("Pagination", "total_pages"),
            ("BulkIdsRequest", "ids"),
            ("LoginResponse", "token"),
            ("UserResponse", "username"),
        ] {
            let description = &schemas[schema]["properties"][field]["description"];
            assert!(
                description.as_str().is_some_and(|d| !d.is_empty()),
                "{schema}.{field} has no description"
            );
        }
    }

    #[test]
    fn test_openapi_spec_has_security_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.as_ref().unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn test_openapi_spec_has_servers() {
        let spec = ApiDoc::openapi();
        let servers = spec.servers.as_ref().unwrap();
        assert!(!servers.is_empty());
    }
}
