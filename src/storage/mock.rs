use super::{ObjectReader, ObjectStore, PutObject};
use crate::models::{Acl, AclGrant, GrantPermission, ObjectOptions, ObjectPage, ObjectRecord};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

#[derive(Debug, Clone)]
pub struct MockObject {
    pub key: String,
    pub data: Vec<u8>,
    pub acl: Acl,
    pub content_type: Option<String>,
    pub options: ObjectOptions,
    pub last_modified: DateTime<Utc>,
}

/// In-memory [`ObjectStore`] with call counters and failure injection.
///
/// Objects are listed in insertion order, like a store returning its page
/// as-is.
#[derive(Clone, Default)]
pub struct MockObjectStore {
    objects: Arc<Mutex<Vec<MockObject>>>,
    page_size: Option<usize>,
    put_failures: Arc<Mutex<usize>>,
    read_failure_after: Option<usize>,
    flip_acl_after_check: bool,
    put_count: Arc<Mutex<usize>>,
    list_count: Arc<Mutex<usize>>,
    copy_count: Arc<Mutex<usize>>,
    delete_calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(
        self,
        key: &str,
        data: Vec<u8>,
        acl: Acl,
        last_modified: DateTime<Utc>,
    ) -> Self {
        self.objects.lock().unwrap().push(MockObject {
            key: key.to_string(),
            data,
            acl,
            content_type: None,
            options: ObjectOptions::default(),
            last_modified,
        });
        self
    }

    /// Return at most `page_size` objects per listing, flagging truncation.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Fail the next `failures` put-object calls.
    pub fn with_put_failures(self, failures: usize) -> Self {
        *self.put_failures.lock().unwrap() = failures;
        self
    }

    /// Make downloads error out after `bytes` bytes of the body.
    pub fn with_read_failure_after(mut self, bytes: usize) -> Self {
        self.read_failure_after = Some(bytes);
        self
    }

    /// Toggle an object's public/private ACL right after it has been read.
    pub fn with_acl_flip_after_check(mut self) -> Self {
        self.flip_acl_after_check = true;
        self
    }

    pub fn get_stored(&self, key: &str) -> Option<MockObject> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.key == key)
            .cloned()
    }

    pub fn get_keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.key.clone())
            .collect()
    }

    pub fn get_put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }

    pub fn get_list_count(&self) -> usize {
        *self.list_count.lock().unwrap()
    }

    pub fn get_copy_count(&self) -> usize {
        *self.copy_count.lock().unwrap()
    }

    pub fn get_delete_calls(&self) -> Vec<Vec<String>> {
        self.delete_calls.lock().unwrap().clone()
    }

    fn not_found(key: &str) -> Error {
        Error::S3(format!("NoSuchKey: {}", key))
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        Ok(format!(
            "https://mock-presigned.example.com/{}?X-Amz-Expires={}",
            key,
            expires_in.as_secs()
        ))
    }

    async fn get_object_acl(&self, key: &str) -> Result<Vec<AclGrant>> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .iter_mut()
            .find(|o| o.key == key)
            .ok_or_else(|| Self::not_found(key))?;

        let mut grants = vec![AclGrant {
            grantee_uri: None,
            permission: GrantPermission::FullControl,
        }];
        if object.acl == Acl::PublicRead {
            grants.push(AclGrant::all_users(GrantPermission::Read));
        }

        if self.flip_acl_after_check {
            object.acl = match object.acl {
                Acl::PublicRead => Acl::Private,
                _ => Acl::PublicRead,
            };
        }

        Ok(grants)
    }

    async fn put_object(&self, request: PutObject) -> Result<()> {
        *self.put_count.lock().unwrap() += 1;

        {
            let mut failures = self.put_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::S3("SlowDown: please reduce your request rate".to_string()));
            }
        }

        let data = tokio::fs::read(&request.source).await?;
        let object = MockObject {
            key: request.key.clone(),
            data,
            acl: request.acl,
            content_type: request.content_type,
            options: request.options,
            last_modified: Utc::now(),
        };

        let mut objects = self.objects.lock().unwrap();
        match objects.iter_mut().find(|o| o.key == request.key) {
            Some(existing) => *existing = object,
            None => objects.push(object),
        }
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<ObjectPage> {
        *self.list_count.lock().unwrap() += 1;

        let matching: Vec<ObjectRecord> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.key.starts_with(prefix))
            .map(|o| {
                ObjectRecord::new(o.key.clone(), o.last_modified).with_size(o.data.len() as i64)
            })
            .collect();

        let limit = self.page_size.unwrap_or(matching.len());
        let is_truncated = matching.len() > limit;
        Ok(ObjectPage {
            objects: matching.into_iter().take(limit).collect(),
            is_truncated,
        })
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<()> {
        self.delete_calls.lock().unwrap().push(keys.to_vec());
        self.objects
            .lock()
            .unwrap()
            .retain(|o| !keys.contains(&o.key));
        Ok(())
    }

    async fn copy_object(&self, source_key: &str, destination_key: &str, acl: Acl) -> Result<()> {
        *self.copy_count.lock().unwrap() += 1;

        let mut objects = self.objects.lock().unwrap();
        let source = objects
            .iter()
            .find(|o| o.key == source_key)
            .cloned()
            .ok_or_else(|| Self::not_found(source_key))?;

        let copy = MockObject {
            key: destination_key.to_string(),
            acl,
            last_modified: Utc::now(),
            ..source
        };
        objects.retain(|o| o.key != destination_key);
        objects.push(copy);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<ObjectReader> {
        let data = self
            .get_stored(key)
            .map(|o| o.data)
            .ok_or_else(|| Self::not_found(key))?;

        match self.read_failure_after {
            Some(limit) => Ok(Box::pin(FailingReader {
                data: data.into_iter().take(limit).collect(),
                position: 0,
            })),
            None => Ok(Box::pin(io::Cursor::new(data))),
        }
    }
}

/// Yields its bytes, then fails like a dropped connection.
struct FailingReader {
    data: Vec<u8>,
    position: usize,
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.position >= self.data.len() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }

        let end = (self.position + buf.remaining()).min(self.data.len());
        buf.put_slice(&self.data[self.position..end]);
        self.position = end;
        Poll::Ready(Ok(()))
    }
}
