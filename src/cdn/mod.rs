//! CDN management gateway
//!
//! Looks up the CDN endpoints fronting Spaces buckets and purges cached
//! files through the DigitalOcean API.

pub mod client;
pub mod mock;

pub use client::CdnClient;
pub use mock::MockCdnClient;

use crate::models::CdnEndpoint;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CdnService: Send + Sync {
    async fn list_endpoints(&self) -> Result<Vec<CdnEndpoint>>;
    async fn purge_cache(&self, endpoint_id: &str, files: &[String]) -> Result<()>;
}
