use super::CdnService;
use crate::models::CdnEndpoint;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockCdnClient {
    endpoints: Arc<Mutex<Vec<CdnEndpoint>>>,
    fail_purge: bool,
    list_count: Arc<Mutex<usize>>,
    purges: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl MockCdnClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(self, id: &str, origin: &str) -> Self {
        self.endpoints
            .lock()
            .unwrap()
            .push(CdnEndpoint::new(id, origin));
        self
    }

    pub fn with_purge_failure(mut self) -> Self {
        self.fail_purge = true;
        self
    }

    pub fn get_list_count(&self) -> usize {
        *self.list_count.lock().unwrap()
    }

    /// Every purge request received, as `(endpoint_id, files)`.
    pub fn get_purges(&self) -> Vec<(String, Vec<String>)> {
        self.purges.lock().unwrap().clone()
    }
}

#[async_trait]
impl CdnService for MockCdnClient {
    async fn list_endpoints(&self) -> Result<Vec<CdnEndpoint>> {
        let mut count = self.list_count.lock().unwrap();
        *count += 1;

        Ok(self.endpoints.lock().unwrap().clone())
    }

    async fn purge_cache(&self, endpoint_id: &str, files: &[String]) -> Result<()> {
        if self.fail_purge {
            return Err(Error::Cdn(
                "API error (status 503 Service Unavailable): purge unavailable".to_string(),
            ));
        }

        self.purges
            .lock()
            .unwrap()
            .push((endpoint_id.to_string(), files.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_cdn_lists_configured_endpoints() {
        let cdn = MockCdnClient::new()
            .with_endpoint("one", "media.nyc3.digitaloceanspaces.com")
            .with_endpoint("two", "assets.sfo3.digitaloceanspaces.com");

        let endpoints = cdn.list_endpoints().await.unwrap();

        assert_eq!(endpoints.len(), 2);
        assert_eq!(cdn.get_list_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_cdn_records_purges() {
        let cdn = MockCdnClient::new();

        cdn.purge_cache("one", &["a.txt".to_string()]).await.unwrap();

        assert_eq!(
            cdn.get_purges(),
            vec![("one".to_string(), vec!["a.txt".to_string()])]
        );
    }

    #[tokio::test]
    async fn test_mock_cdn_purge_failure() {
        let cdn = MockCdnClient::new().with_purge_failure();
        let result = cdn.purge_cache("one", &["a.txt".to_string()]).await;

        assert!(result.is_err());
        assert!(cdn.get_purges().is_empty());
    }
}
