//! # HTTP Middleware
//!
//! Request counters and per-client rate limiting. Authentication lives in
//! [`crate::auth`].

pub mod metrics;
pub mod rate_limit;
