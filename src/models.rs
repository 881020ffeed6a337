//! Data models and structures
//!
//! Defines client configuration, per-operation options, listing records,
//! and the request/response shapes of the CDN management API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Grantee URI the object store uses for the "all users" group.
pub const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

const DEFAULT_ENDPOINT: &str = "nyc3.digitaloceanspaces.com";
const DEFAULT_REGION: &str = "us-east-1";
const SPACES_DOMAIN: &str = "digitaloceanspaces.com";
const DEFAULT_CDN_DOMAIN: &str = "cdn.digitaloceanspaces.com";

/// Canned access control applied to an object on upload or copy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Acl {
    #[default]
    Private,
    PublicRead,
    /// Any other canned ACL string, forwarded to the store untouched.
    Custom(String),
}

impl Acl {
    pub fn as_str(&self) -> &str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
            Acl::Custom(value) => value,
        }
    }
}

impl From<&str> for Acl {
    /// `"public"` is shorthand for public-read; `"private"` maps to private and
    /// everything else is kept as a raw ACL string.
    fn from(value: &str) -> Self {
        match value {
            "public" | "public-read" => Acl::PublicRead,
            "private" => Acl::Private,
            other => Acl::Custom(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantPermission {
    Read,
    Write,
    ReadAcp,
    WriteAcp,
    FullControl,
    Other(String),
}

impl From<&str> for GrantPermission {
    fn from(value: &str) -> Self {
        match value {
            "READ" => GrantPermission::Read,
            "WRITE" => GrantPermission::Write,
            "READ_ACP" => GrantPermission::ReadAcp,
            "WRITE_ACP" => GrantPermission::WriteAcp,
            "FULL_CONTROL" => GrantPermission::FullControl,
            other => GrantPermission::Other(other.to_string()),
        }
    }
}

/// One entry of an object's access control list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclGrant {
    /// Group URI for group grantees, `None` for canonical users.
    pub grantee_uri: Option<String>,
    pub permission: GrantPermission,
}

impl AclGrant {
    pub fn all_users(permission: GrantPermission) -> Self {
        Self {
            grantee_uri: Some(ALL_USERS_URI.to_string()),
            permission,
        }
    }

    pub fn is_public_read(&self) -> bool {
        self.grantee_uri.as_deref() == Some(ALL_USERS_URI)
            && self.permission == GrantPermission::Read
    }
}

/// Object attributes forwarded verbatim to the put-object call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectOptions {
    /// Overrides the Content-Type inferred from the file extension.
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl ObjectOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    pub fn with_content_disposition(mut self, disposition: impl Into<String>) -> Self {
        self.content_disposition = Some(disposition.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Options recognized by [`crate::client::ObjectStorageClient::upload`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Retry the upload (and purge, when enabled) with exponential backoff.
    pub exponential_backoff: bool,
    /// Purge the uploaded key from the CDN cache after a successful upload.
    pub purge_cache: bool,
    pub object: ObjectOptions,
}

impl UploadOptions {
    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }

    pub fn with_purge_cache(mut self, enabled: bool) -> Self {
        self.purge_cache = enabled;
        self
    }

    pub fn with_object_options(mut self, object: ObjectOptions) -> Self {
        self.object = object;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl From<&str> for SortOrder {
    /// Only an exact `"DESC"` sorts descending.
    fn from(value: &str) -> Self {
        match value {
            "DESC" => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub sort_by_date: SortOrder,
    /// Return raw keys instead of CDN URLs.
    pub path_only: bool,
}

impl ListOptions {
    pub fn with_sort(mut self, sort_by_date: SortOrder) -> Self {
        self.sort_by_date = sort_by_date;
        self
    }

    pub fn with_path_only(mut self, path_only: bool) -> Self {
        self.path_only = path_only;
        self
    }
}

/// An object as reported by the store's prefix listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectRecord {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
    pub etag: Option<String>,
    pub storage_class: Option<String>,
}

impl ObjectRecord {
    pub fn new(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            size: 0,
            last_modified,
            etag: None,
            storage_class: None,
        }
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }
}

/// A single page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectRecord>,
    /// Set when the store had more results than it returned.
    pub is_truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    /// CDN URL of the object, or its raw key when listing with `path_only`.
    pub locator: String,
    pub last_modified: DateTime<Utc>,
}

// CDN management API models
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CdnEndpoint {
    pub id: String,
    pub origin: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub custom_domain: Option<String>,
    #[serde(default)]
    pub ttl: Option<u32>,
}

impl CdnEndpoint {
    pub fn new(id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            origin: origin.into(),
            endpoint: None,
            custom_domain: None,
            ttl: None,
        }
    }

    /// Whether this endpoint fronts `bucket`, judged by the leading label of
    /// its origin host.
    pub fn serves_bucket(&self, bucket: &str) -> bool {
        self.origin.split('.').next() == Some(bucket)
    }
}

#[derive(Debug, Deserialize)]
pub struct CdnEndpointsResponse {
    pub endpoints: Vec<CdnEndpoint>,
    #[serde(default)]
    pub links: PageLinks,
}

impl CdnEndpointsResponse {
    /// Absolute URL of the following page, if the listing continues.
    pub fn next_page(&self) -> Option<&str> {
        self.links.pages.as_ref()?.next.as_deref()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub pages: Option<PageUrls>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageUrls {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub last: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PurgeCacheRequest {
    pub files: Vec<String>,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint host without scheme, e.g. `nyc3.digitaloceanspaces.com`.
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub cdn_api_token: Option<String>,
    /// Pre-resolved CDN endpoint id; skips the endpoint lookup when set.
    pub cdn_endpoint_id: Option<String>,
    /// Custom CDN hostname used in place of the default CDN host.
    pub cdn_host: Option<String>,
}

impl Config {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: normalize_endpoint(&endpoint.into()),
            bucket: bucket.into(),
            region: DEFAULT_REGION.to_string(),
            access_key_id: None,
            secret_access_key: None,
            cdn_api_token: None,
            cdn_endpoint_id: None,
            cdn_host: None,
        }
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_cdn_api_token(mut self, token: impl Into<String>) -> Self {
        self.cdn_api_token = Some(token.into());
        self
    }

    pub fn with_cdn_endpoint_id(mut self, id: impl Into<String>) -> Self {
        self.cdn_endpoint_id = Some(id.into());
        self
    }

    pub fn with_cdn_host(mut self, host: impl Into<String>) -> Self {
        self.cdn_host = Some(host.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn endpoint_url(&self) -> String {
        format!("https://{}", self.endpoint)
    }

    /// Host serving CDN URLs: the custom host when configured, otherwise the
    /// Spaces CDN host for this bucket's region.
    ///
    /// Endpoints outside `digitaloceanspaces.com` have no derivable CDN host;
    /// without a custom host they fall back to the origin host.
    pub fn cdn_host(&self) -> String {
        if let Some(host) = &self.cdn_host {
            return host.clone();
        }

        match self
            .endpoint
            .strip_suffix(SPACES_DOMAIN)
            .and_then(|rest| rest.strip_suffix('.'))
        {
            Some(region) if !region.is_empty() && !region.contains('.') => {
                format!("{}.{}.{}", self.bucket, region, DEFAULT_CDN_DOMAIN)
            }
            _ => format!("{}.{}", self.bucket, self.endpoint),
        }
    }

    pub fn from_env() -> crate::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e.into());
            }
        }

        let endpoint =
            std::env::var("SPACES_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let bucket = std::env::var("SPACES_BUCKET")
            .map_err(|_| crate::Error::Config("SPACES_BUCKET not set".to_string()))?;

        let mut config = Self::new(endpoint, bucket);
        if let Ok(region) = std::env::var("SPACES_REGION") {
            config.region = region;
        }

        match (
            std::env::var("SPACES_ACCESS_KEY_ID").ok(),
            std::env::var("SPACES_SECRET_ACCESS_KEY").ok(),
        ) {
            (Some(key), Some(secret)) => config = config.with_credentials(key, secret),
            (None, None) => {}
            _ => {
                return Err(crate::Error::Config(
                    "SPACES_ACCESS_KEY_ID and SPACES_SECRET_ACCESS_KEY must be set together"
                        .to_string(),
                ))
            }
        }

        config.cdn_api_token = std::env::var("SPACES_CDN_API_TOKEN").ok();
        config.cdn_endpoint_id = std::env::var("SPACES_CDN_ENDPOINT_ID").ok();
        config.cdn_host = std::env::var("SPACES_CDN_HOST").ok();

        Ok(config)
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    endpoint
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}
