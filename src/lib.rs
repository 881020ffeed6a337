//! Convenience client for DigitalOcean Spaces and its CDN
//!
//! Wraps the S3-compatible object API and the CDN management API: public,
//! CDN and presigned URLs, uploads with optional retry and cache purge,
//! sorted listings, batch and folder deletes, ACL-preserving copies and
//! streaming downloads.

pub mod cdn;
pub mod client;
pub mod error;
pub mod mime;
pub mod models;
pub mod retry;
pub mod storage;

pub use client::ObjectStorageClient;
pub use error::{Error, Result};
