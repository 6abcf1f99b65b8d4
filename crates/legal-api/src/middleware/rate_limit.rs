//! # Per-Client Rate Limiting
//!
//! Fixed-window limiter for the public lookup routes, keyed by the first
//! hop of `X-Forwarded-For`. Requests without the header share the
//! `"anonymous"` bucket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;

use crate::error::{ErrorBody, ErrorDetail};

/// Buckets idle for this many windows are dropped on the next sweep.
const STALE_WINDOWS: u32 = 2;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 120,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
struct BucketState {
    count: u64,
    window_start: Instant,
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a request from `key` and report whether it is allowed.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();

        let stale_after = self.config.window * STALE_WINDOWS;
        if buckets.len() > 10_000 {
            buckets.retain(|_, b| now.duration_since(b.window_start) < stale_after);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(BucketState {
            count: 0,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) >= self.config.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= self.config.max_requests {
            false
        } else {
            bucket.count += 1;
            true
        }
    }
}

fn client_key(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

/// Middleware that enforces per-client rate limits.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let limiter = request.extensions().get::<RateLimiter>().cloned();

    if let Some(limiter) = limiter {
        let key = client_key(&request);
        if !limiter.check(&key) {
            tracing::warn!(client = %key, "rate limit exceeded");
            let body = ErrorBody {
                error: ErrorDetail {
                    code: "RATE_LIMITED".to_string(),
                    message: "rate limit exceeded".to_string(),
                    details: None,
                },
            };
            return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn limiter(max: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests: max,
            window: Duration::from_secs(60),
        })
    }

    #[test]
    fn allows_up_to_limit_then_blocks() {
        let l = limiter(2);
        let t = Instant::now();
        assert!(l.check_at("a", t));
        assert!(l.check_at("a", t));
        assert!(!l.check_at("a", t));
        assert!(l.check_at("b", t));
    }

    #[test]
    fn window_resets() {
        let l = limiter(1);
        let t = Instant::now();
        assert!(l.check_at("a", t));
        assert!(!l.check_at("a", t + Duration::from_secs(30)));
        assert!(l.check_at("a", t + Duration::from_secs(61)));
    }

    #[tokio::test]
    async fn middleware_returns_429_per_forwarded_client() {
        let app = Router::new()
            .route("/p", get(|| async { "ok" }))
            .layer(from_fn(rate_limit_middleware))
            .layer(axum::Extension(limiter(1)));

        let req = |ip: &str| {
            axum::http::Request::builder()
                .uri("/p")
                .header("x-forwarded-for", format!("{ip}, 10.0.0.1"))
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(
            app.clone().oneshot(req("203.0.113.5")).await.unwrap().status(),
            StatusCode::OK
        );
        assert_eq!(
            app.clone().oneshot(req("203.0.113.5")).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            app.oneshot(req("198.51.100.7")).await.unwrap().status(),
            StatusCode::OK
        );
    }
}
