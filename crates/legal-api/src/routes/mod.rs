//! # API Route Modules
//!
//! Public routes:
//! - `verification`: sticker lookup and public QR images.
//! - `auth::public_router`: login.
//!
//! Authenticated routes:
//! - `auth`: current account, password change, logout.
//! - `records`: record CRUD and bulk status/deletion.
//! - `qrcode`: staff image access and batch manifests.
//! - `users`: account administration (admin only).

pub mod auth;
pub mod qrcode;
pub mod records;
pub mod users;
pub mod verification;
