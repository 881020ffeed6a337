//! Object store gateway
//!
//! Executes object CRUD, listing and ACL calls against an S3-compatible
//! bucket (DigitalOcean Spaces).

pub mod client;
pub mod mock;

pub use client::SpacesStore;
pub use mock::MockObjectStore;

use crate::models::{Acl, AclGrant, ObjectOptions, ObjectPage};
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Readable body of a downloaded object.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// A put-object call whose body is streamed from a local file.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub key: String,
    pub source: PathBuf,
    pub acl: Acl,
    pub content_type: Option<String>,
    pub options: ObjectOptions,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String>;
    async fn get_object_acl(&self, key: &str) -> Result<Vec<AclGrant>>;
    async fn put_object(&self, request: PutObject) -> Result<()>;
    /// Lists a single page of objects under `prefix`.
    async fn list_objects(&self, prefix: &str) -> Result<ObjectPage>;
    async fn delete_objects(&self, keys: &[String]) -> Result<()>;
    async fn copy_object(&self, source_key: &str, destination_key: &str, acl: Acl) -> Result<()>;
    async fn get_object(&self, key: &str) -> Result<ObjectReader>;
}
