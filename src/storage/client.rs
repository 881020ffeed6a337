use super::{ObjectReader, ObjectStore, PutObject};
use crate::models::{Acl, AclGrant, Config, GrantPermission, ObjectPage, ObjectRecord};
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, Grant, Object, ObjectCannedAcl, ObjectIdentifier};
use aws_sdk_s3::{config::Region, Client as S3Client};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// [`ObjectStore`] backed by the AWS S3 SDK pointed at a Spaces endpoint.
pub struct SpacesStore {
    client: S3Client,
    bucket: String,
}

impl SpacesStore {
    pub async fn new(config: &Config) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone())) // Spaces ignores the region but SigV4 needs one
            .endpoint_url(config.endpoint_url());

        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            let credentials = aws_sdk_s3::config::Credentials::new(
                key,
                secret,
                None,
                None,
                "digital-ocean-spaces",
            );
            loader = loader.credentials_provider(credentials);
        }

        let sdk_config = loader.load().await;

        Ok(Self::from_client(
            S3Client::new(&sdk_config),
            config.bucket.clone(),
        ))
    }

    pub fn from_client(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

fn s3_error(action: &str, err: impl std::error::Error) -> Error {
    Error::S3(format!("Failed to {}: {}", action, DisplayErrorContext(err)))
}

fn canned_acl(acl: &Acl) -> ObjectCannedAcl {
    match acl {
        Acl::Private => ObjectCannedAcl::Private,
        Acl::PublicRead => ObjectCannedAcl::PublicRead,
        Acl::Custom(value) => ObjectCannedAcl::from(value.as_str()),
    }
}

fn grant_from_sdk(grant: &Grant) -> AclGrant {
    AclGrant {
        grantee_uri: grant
            .grantee()
            .and_then(|grantee| grantee.uri())
            .map(str::to_string),
        permission: grant
            .permission()
            .map(|permission| GrantPermission::from(permission.as_str()))
            .unwrap_or_else(|| GrantPermission::Other(String::new())),
    }
}

/// `x-amz-copy-source` value: the bucket and the key, percent-encoded per
/// path segment so `/` separators survive.
fn copy_source(bucket: &str, key: &str) -> String {
    let encoded: Vec<_> = key.split('/').map(urlencoding::encode).collect();
    format!("{}/{}", bucket, encoded.join("/"))
}

fn record_from_sdk(object: &Object) -> ObjectRecord {
    let key = object.key().unwrap_or_default();
    // Objects without a timestamp sort as the oldest entries.
    let last_modified = object
        .last_modified()
        .and_then(|ts| ts.to_millis().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(|| {
            debug!("Object {} has no usable LastModified; using the Unix epoch", key);
            DateTime::<Utc>::UNIX_EPOCH
        });

    ObjectRecord {
        key: key.to_string(),
        size: object.size().unwrap_or_default(),
        last_modified,
        etag: object.e_tag().map(str::to_string),
        storage_class: object.storage_class().map(|class| class.as_str().to_string()),
    }
}

#[async_trait]
impl ObjectStore for SpacesStore {
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presigning =
            PresigningConfig::expires_in(expires_in).map_err(|e| s3_error("presign URL", e))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| s3_error("presign URL", e))?;

        Ok(request.uri().to_string())
    }

    async fn get_object_acl(&self, key: &str) -> Result<Vec<AclGrant>> {
        let response = self
            .client
            .get_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("read object ACL", e))?;

        Ok(response.grants().iter().map(grant_from_sdk).collect())
    }

    async fn put_object(&self, request: PutObject) -> Result<()> {
        debug!("Streaming {} to {}", request.source.display(), request.key);

        let body = ByteStream::from_path(&request.source)
            .await
            .map_err(std::io::Error::other)?;

        let options = request.options;
        let metadata = (!options.metadata.is_empty()).then_some(options.metadata);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .body(body)
            .acl(canned_acl(&request.acl))
            .set_content_type(request.content_type)
            .set_cache_control(options.cache_control)
            .set_content_disposition(options.content_disposition)
            .set_content_encoding(options.content_encoding)
            .set_content_language(options.content_language)
            .set_metadata(metadata)
            .send()
            .await
            .map_err(|e| s3_error("upload file", e))?;

        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<ObjectPage> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| s3_error("list objects", e))?;

        Ok(ObjectPage {
            objects: response.contents().iter().map(record_from_sdk).collect(),
            is_truncated: response.is_truncated().unwrap_or(false),
        })
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<()> {
        let identifiers = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| s3_error("build delete request", e))?;

        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|e| s3_error("build delete request", e))?;

        let response = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| s3_error("delete objects", e))?;

        let failed: Vec<String> = response
            .errors()
            .iter()
            .map(|e| {
                format!(
                    "{} ({})",
                    e.key().unwrap_or_default(),
                    e.message().or(e.code()).unwrap_or("unknown error")
                )
            })
            .collect();

        if !failed.is_empty() {
            return Err(Error::S3(format!(
                "Failed to delete objects: {}",
                failed.join(", ")
            )));
        }

        Ok(())
    }

    async fn copy_object(&self, source_key: &str, destination_key: &str, acl: Acl) -> Result<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source(&self.bucket, source_key))
            .key(destination_key)
            .acl(canned_acl(&acl))
            .send()
            .await
            .map_err(|e| s3_error("copy object", e))?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<ObjectReader> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("read file", e))?;

        Ok(Box::pin(response.body.into_async_read()))
    }
}
