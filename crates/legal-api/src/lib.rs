//! # legal-api: Axum Service for the Legalization Registry
//!
//! Staff manage consular legalization records; each record gets a random
//! 20-character identifier and a QR sticker encoding its verification URL.
//! Anyone scanning the sticker lands on the public lookup, which shows the
//! record only while it is active.
//!
//! ## API Surface
//!
//! | Prefix                    | Module                   | Access        |
//! |---------------------------|--------------------------|---------------|
//! | `/api/check/sticker`      | [`routes::verification`] | public        |
//! | `/api/qrcode/{info,download,preview}/*` | [`routes::verification`] | public |
//! | `/api/auth/login`         | [`routes::auth`]         | public        |
//! | `/api/auth/*`             | [`routes::auth`]         | authenticated |
//! | `/api/records/*`          | [`routes::records`], [`routes::qrcode`] | authenticated |
//! | `/api/qrcode/download-batch` | [`routes::qrcode`]    | authenticated |
//! | `/api/users/*`            | [`routes::users`]        | admin         |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → RateLimitMiddleware (public) → Handler
//!                                → AuthMiddleware (protected)  → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Generated via utoipa derive macros, served at `/openapi.json`.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod images;
pub mod middleware;
pub mod openapi;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;

use std::time::Duration;

use axum::extract::State;
use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use crate::state::AppState;
use crate::store::bounded;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes and `/openapi.json` need no credentials. Public lookup
/// routes and login are rate limited per client.
pub fn app(state: AppState) -> Router {
    let auth_ctx = state.auth_context();
    let metrics = ApiMetrics::new();
    let limiter = RateLimiter::new(RateLimitConfig {
        max_requests: state.config.public_rate_limit,
        window: Duration::from_secs(60),
    });

    let public = Router::new()
        .merge(routes::verification::router())
        .merge(routes::auth::public_router())
        .route_layer(from_fn(middleware::rate_limit::rate_limit_middleware));

    let protected = Router::new()
        .merge(routes::auth::router())
        .merge(routes::records::router())
        .merge(routes::qrcode::router())
        .merge(routes::users::router())
        .route_layer(from_fn(auth::auth_middleware));

    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    Router::new()
        .merge(health)
        .merge(openapi::router())
        .merge(public)
        .merge(protected)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_ctx))
        .layer(axum::Extension(metrics))
        .layer(axum::Extension(limiter))
        .with_state(state)
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 when storage answers within the configured bound.
async fn readiness(State(state): State<AppState>) -> Result<&'static str, AppError> {
    bounded(state.storage_timeout(), state.stores.records.ping())
        .await
        .map_err(|e| AppError::ServiceUnavailable(format!("storage not ready: {e}")))?;
    Ok("ready")
}
