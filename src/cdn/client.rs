use super::CdnService;
use crate::models::{CdnEndpoint, CdnEndpointsResponse, PurgeCacheRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.digitalocean.com";
const ENDPOINTS_PER_PAGE: u32 = 200;

/// DigitalOcean CDN API client authenticated with a bearer token.
pub struct CdnClient {
    client: Client,
    api_token: String,
    base_url: String,
}

impl CdnClient {
    pub fn new(api_token: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self::new_with_client(api_token, client))
    }

    pub fn new_with_client(api_token: String, client: Client) -> Self {
        Self {
            client,
            api_token,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn check_status(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response.text().await?;
        tracing::error!("CDN API error (status {}): {}", status, error_text);
        Err(Error::Cdn(format!(
            "API error (status {}): {}",
            status, error_text
        )))
    }
}

#[async_trait]
impl CdnService for CdnClient {
    async fn list_endpoints(&self) -> Result<Vec<CdnEndpoint>> {
        tracing::debug!("Listing CDN endpoints");

        let mut endpoints = Vec::new();
        let mut request = self
            .client
            .get(format!("{}/v2/cdn/endpoints", self.base_url))
            .query(&[("per_page", ENDPOINTS_PER_PAGE)]);

        loop {
            let response = request
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|e| {
                    tracing::error!("Failed to send request to CDN API: {}", e);
                    e
                })?;

            let page: CdnEndpointsResponse = Self::check_status(response).await?.json().await?;
            endpoints.extend(page.endpoints.iter().cloned());

            // The API hands back the next page as an absolute URL.
            match page.next_page() {
                Some(next) => {
                    tracing::debug!("Fetching next page of CDN endpoints: {}", next);
                    request = self.client.get(next);
                }
                None => break,
            }
        }

        Ok(endpoints)
    }

    async fn purge_cache(&self, endpoint_id: &str, files: &[String]) -> Result<()> {
        tracing::debug!("Purging {} file(s) from CDN endpoint {}", files.len(), endpoint_id);

        let request = PurgeCacheRequest {
            files: files.to_vec(),
        };

        let response = self
            .client
            .delete(format!("{}/v2/cdn/endpoints/{}/cache", self.base_url, endpoint_id))
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send purge request to CDN API: {}", e);
                e
            })?;

        Self::check_status(response).await?;
        Ok(())
    }
}
