//! Spaces client orchestration: URL derivation, uploads with retry and CDN
//! purge, listings, deletes, ACL-preserving copies and downloads.

use crate::cdn::{CdnClient, CdnService};
use crate::mime::content_type_for;
use crate::models::{
    Acl, AclGrant, Config, FileEntry, ListOptions, ObjectRecord, SortOrder, UploadOptions,
};
use crate::retry::RetryPolicy;
use crate::storage::{ObjectReader, ObjectStore, PutObject, SpacesStore};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(900);

/// Client for a single Spaces bucket and the CDN endpoint in front of it.
pub struct ObjectStorageClient {
    config: Config,
    store: Box<dyn ObjectStore>,
    cdn: Option<Box<dyn CdnService>>,
    retry: RetryPolicy,
    /// Resolved at most once per client, then reused without revalidation.
    cdn_endpoint_id: OnceCell<String>,
}

/// Injectable gateway bundle used to construct [`ObjectStorageClient`].
pub struct ClientServices {
    pub store: Box<dyn ObjectStore>,
    /// `None` when no CDN API token is available.
    pub cdn: Option<Box<dyn CdnService>>,
}

impl ObjectStorageClient {
    /// Build a client from concrete gateways.
    ///
    /// Useful for tests and harnesses that need to inject mocks.
    pub fn with_services(config: Config, services: ClientServices) -> Self {
        let cdn_endpoint_id = OnceCell::new_with(config.cdn_endpoint_id.clone());

        Self {
            config,
            store: services.store,
            cdn: services.cdn,
            retry: RetryPolicy::default(),
            cdn_endpoint_id,
        }
    }

    /// Construct a client talking to Spaces and, when a token is configured,
    /// the DigitalOcean CDN API.
    pub async fn new(config: Config) -> Result<Self> {
        let store = SpacesStore::new(&config).await?;

        let cdn: Option<Box<dyn CdnService>> = match &config.cdn_api_token {
            Some(token) => Some(Box::new(CdnClient::new(token.clone())?)),
            None => {
                debug!("No CDN API token configured; cache purging is unavailable");
                None
            }
        };

        info!(
            "Spaces client ready for bucket {} at {}",
            config.bucket, config.endpoint
        );

        Ok(Self::with_services(
            config,
            ClientServices {
                store: Box::new(store),
                cdn,
            },
        ))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Origin URL of `path`. No escaping is applied.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "https://{}.{}/{}",
            self.config.bucket, self.config.endpoint, path
        )
    }

    /// [`Self::public_url`] with the host swapped for the CDN host.
    pub fn cdn_url(&self, path: &str) -> String {
        format!("https://{}/{}", self.config.cdn_host(), path)
    }

    pub async fn presigned_url(&self, path: &str) -> Result<String> {
        self.presigned_url_expiring(path, DEFAULT_PRESIGN_EXPIRY)
            .await
    }

    pub async fn presigned_url_expiring(&self, path: &str, expires_in: Duration) -> Result<String> {
        self.store.presign_get(path, expires_in).await
    }

    /// Whether anonymous users may read `path`.
    pub async fn is_public(&self, path: &str) -> Result<bool> {
        let grants = self.store.get_object_acl(path).await?;
        Ok(grants.iter().any(AclGrant::is_public_read))
    }

    /// Id of the CDN endpoint whose origin is this bucket.
    ///
    /// Concurrent first calls share a single lookup.
    pub async fn resolve_cdn_endpoint_id(&self) -> Result<String> {
        let cdn = self.cdn.as_deref().ok_or_else(|| {
            Error::Config("a CDN API token is required to resolve the CDN endpoint".to_string())
        })?;

        let id = self
            .cdn_endpoint_id
            .get_or_try_init(|| async {
                let bucket = &self.config.bucket;
                let endpoint = cdn
                    .list_endpoints()
                    .await?
                    .into_iter()
                    .find(|endpoint| endpoint.serves_bucket(bucket))
                    .ok_or_else(|| {
                        Error::NotFound(format!("no CDN endpoint serves bucket {}", bucket))
                    })?;

                info!("Resolved CDN endpoint {} for bucket {}", endpoint.id, bucket);
                Ok::<_, Error>(endpoint.id)
            })
            .await?;

        Ok(id.clone())
    }

    /// Purge `paths` from the CDN cache of this bucket's endpoint.
    pub async fn purge_cache(&self, paths: &[String]) -> Result<()> {
        let endpoint_id = self.resolve_cdn_endpoint_id().await?;
        let cdn = self.cdn.as_deref().ok_or_else(|| {
            Error::Config("a CDN API token is required to purge the CDN cache".to_string())
        })?;

        cdn.purge_cache(&endpoint_id, paths).await?;
        info!("Purged {} path(s) from CDN endpoint {}", paths.len(), endpoint_id);
        Ok(())
    }

    /// Upload `local_path` to `destination_key` and return its CDN URL.
    ///
    /// With `purge_cache`, a purge failure fails the call even though the
    /// object has already been written. With `exponential_backoff`, the
    /// upload and purge are retried together.
    pub async fn upload(
        &self,
        local_path: impl AsRef<Path>,
        destination_key: &str,
        permission: Acl,
        options: UploadOptions,
    ) -> Result<String> {
        let UploadOptions {
            exponential_backoff,
            purge_cache,
            object: mut object_options,
        } = options;
        let local_path = local_path.as_ref();

        let content_type = object_options
            .content_type
            .take()
            .or_else(|| content_type_for(local_path));

        let request = PutObject {
            key: destination_key.to_string(),
            source: local_path.to_path_buf(),
            acl: permission,
            content_type,
            options: object_options,
        };

        let attempt = || {
            let request = request.clone();
            async move {
                self.store.put_object(request).await?;
                if purge_cache {
                    self.purge_cache(&[destination_key.to_string()]).await?;
                }
                Ok::<(), Error>(())
            }
        };

        if exponential_backoff {
            self.retry.run(destination_key, attempt).await?;
        } else {
            attempt().await?;
        }

        info!(
            "Uploaded {} to {}",
            local_path.display(),
            destination_key
        );
        Ok(self.cdn_url(destination_key))
    }

    /// Objects under `prefix`, first page only.
    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectRecord>> {
        let page = self.store.list_objects(prefix).await?;
        if page.is_truncated {
            warn!(
                "Listing for prefix '{}' was truncated after {} objects; later pages are not fetched",
                prefix,
                page.objects.len()
            );
        }
        Ok(page.objects)
    }

    /// Files under `prefix` ordered by modification time. Ties keep the
    /// store's order.
    pub async fn list_files(&self, prefix: &str, options: ListOptions) -> Result<Vec<FileEntry>> {
        let mut files: Vec<FileEntry> = self
            .list_objects(prefix)
            .await?
            .into_iter()
            .map(|record| FileEntry {
                locator: if options.path_only {
                    record.key
                } else {
                    self.cdn_url(&record.key)
                },
                last_modified: record.last_modified,
            })
            .collect();

        match options.sort_by_date {
            SortOrder::Asc => files.sort_by_key(|f| f.last_modified.timestamp_millis()),
            SortOrder::Desc => files.sort_by(|a, b| {
                b.last_modified
                    .timestamp_millis()
                    .cmp(&a.last_modified.timestamp_millis())
            }),
        }

        Ok(files)
    }

    /// Delete `keys` in one batch. An empty batch is a no-op.
    pub async fn delete_objects(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            debug!("Nothing to delete");
            return Ok(());
        }

        self.store.delete_objects(keys).await?;
        info!("Deleted {} object(s)", keys.len());
        Ok(())
    }

    pub async fn delete_paths<S: AsRef<str>>(&self, paths: &[S]) -> Result<()> {
        let keys: Vec<String> = paths.iter().map(|p| p.as_ref().to_string()).collect();
        self.delete_objects(&keys).await
    }

    pub async fn delete_file(&self, path: &str) -> Result<()> {
        self.delete_paths(&[path]).await
    }

    /// Delete everything in the first listing page under `prefix`.
    pub async fn delete_folder(&self, prefix: &str) -> Result<()> {
        let keys: Vec<String> = self
            .list_objects(prefix)
            .await?
            .into_iter()
            .map(|record| record.key)
            .collect();

        self.delete_objects(&keys).await
    }

    /// Copy an object, making the copy public-read iff the source is public.
    ///
    /// The ACL check and the copy are separate requests; an ACL change in
    /// between is not detected.
    pub async fn copy_file(&self, source_key: &str, destination_key: &str) -> Result<()> {
        let acl = if self.is_public(source_key).await? {
            Acl::PublicRead
        } else {
            Acl::Private
        };

        self.store
            .copy_object(source_key, destination_key, acl.clone())
            .await?;
        info!(
            "Copied {} to {} ({})",
            source_key,
            destination_key,
            acl.as_str()
        );
        Ok(())
    }

    /// Stream `remote_key` into `local_path`, returning the path written.
    ///
    /// A failed transfer removes the partial file before the error is
    /// returned.
    pub async fn download_file(
        &self,
        remote_key: &str,
        local_path: impl AsRef<Path>,
        create_dir_if_not_exists: bool,
    ) -> Result<PathBuf> {
        let local_path = local_path.as_ref();

        if create_dir_if_not_exists {
            if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let (file, body) = tokio::join!(
            File::create(local_path),
            self.store.get_object(remote_key)
        );
        let mut file = file?;

        let result = match body {
            Ok(body) => Self::write_body(body, &mut file).await.map_err(Error::from),
            Err(e) => Err(e),
        };
        drop(file);

        match result {
            Ok(bytes) => {
                info!(
                    "Downloaded {} ({} bytes) to {}",
                    remote_key,
                    bytes,
                    local_path.display()
                );
                Ok(local_path.to_path_buf())
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(local_path).await {
                    warn!(
                        "Failed to remove partial download {}: {}",
                        local_path.display(),
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    async fn write_body(mut body: ObjectReader, file: &mut File) -> std::io::Result<u64> {
        let bytes = tokio::io::copy(&mut body, file).await?;
        file.flush().await?;
        Ok(bytes)
    }
}
