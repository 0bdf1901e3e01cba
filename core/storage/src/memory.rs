//! In-memory object client for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use polycloud_common::{Error, Result};

use crate::entity::{PlatformHandle, SINGLE_PAGE_LIMIT};
use crate::provider::{BucketEntry, ObjectClient, ObjectEntry};

/// Calls a failure can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOp {
    Verify,
    ListBuckets,
    CreateBucket,
    DeleteBucket,
    ListObjects,
    PutObject,
    GetObject,
    DeleteObject,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    created: DateTime<Utc>,
    etag: String,
}

#[derive(Debug)]
struct Bucket {
    region: Option<String>,
    created: DateTime<Utc>,
    objects: BTreeMap<String, StoredObject>,
}

/// Injected failure: the call succeeds `remaining_ok` more times, then fails
/// every time after.
#[derive(Debug)]
struct Fault {
    op: MemoryOp,
    remaining_ok: usize,
    error: Error,
}

/// In-memory object client.
///
/// Behaves like a strict object store: creating an existing bucket and
/// deleting a non-empty one both fail. All data is lost on drop.
pub struct MemoryClient {
    buckets: RwLock<BTreeMap<String, Bucket>>,
    region: Option<String>,
    page_limit: usize,
    reject_credentials: bool,
    faults: Mutex<Vec<Fault>>,
}

impl MemoryClient {
    /// Create an empty client.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            region: None,
            page_limit: SINGLE_PAGE_LIMIT,
            reject_credentials: false,
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Region recorded for buckets created through this client.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Cap object listings at `limit` entries.
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    /// Seed an empty bucket, optionally in a specific region.
    pub fn with_bucket(mut self, name: impl Into<String>, region: Option<&str>) -> Self {
        self.buckets.get_mut().insert(
            name.into(),
            Bucket {
                region: region.map(str::to_string),
                created: Utc::now(),
                objects: BTreeMap::new(),
            },
        );
        self
    }

    /// Reject every credential check with `Authentication`.
    pub fn rejecting_credentials(mut self) -> Self {
        self.reject_credentials = true;
        self
    }

    /// Fail `op` with `error` once it has succeeded `after` times.
    pub fn failing(mut self, op: MemoryOp, after: usize, error: Error) -> Self {
        self.faults.get_mut().push(Fault {
            op,
            remaining_ok: after,
            error,
        });
        self
    }

    /// Number of objects currently stored in a bucket.
    pub async fn object_count(&self, bucket: &str) -> Option<usize> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|b| b.objects.len())
    }

    /// Whether a bucket exists.
    pub async fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.read().await.contains_key(bucket)
    }

    async fn check(&self, op: MemoryOp) -> Result<()> {
        let mut faults = self.faults.lock().await;
        if let Some(fault) = faults.iter_mut().find(|f| f.op == op) {
            if fault.remaining_ok == 0 {
                return Err(fault.error.clone());
            }
            fault.remaining_ok -= 1;
        }
        Ok(())
    }

    fn missing_bucket(bucket: &str) -> Error {
        Error::NotFound(format!("Bucket not found: {}", bucket))
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectClient for MemoryClient {
    fn name(&self) -> &str {
        "memory"
    }

    async fn verify(&self) -> Result<()> {
        self.check(MemoryOp::Verify).await?;
        if self.reject_credentials {
            return Err(Error::Authentication(
                "The security token included in the request is invalid".to_string(),
            ));
        }
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketEntry>> {
        self.check(MemoryOp::ListBuckets).await?;
        let buckets = self.buckets.read().await;

        Ok(buckets
            .iter()
            .map(|(name, bucket)| BucketEntry {
                name: name.clone(),
                region: bucket.region.clone(),
                created: Some(bucket.created),
                handle: PlatformHandle::None,
            })
            .collect())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.check(MemoryOp::CreateBucket).await?;
        let mut buckets = self.buckets.write().await;

        if buckets.contains_key(bucket) {
            return Err(Error::AlreadyExists(format!(
                "Bucket already exists: {}",
                bucket
            )));
        }
        buckets.insert(
            bucket.to_string(),
            Bucket {
                region: self.region.clone(),
                created: Utc::now(),
                objects: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.check(MemoryOp::DeleteBucket).await?;
        let mut buckets = self.buckets.write().await;

        match buckets.get(bucket) {
            Some(b) if !b.objects.is_empty() => Err(Error::Platform(format!(
                "The bucket you tried to delete is not empty: {}",
                bucket
            ))),
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
            None => Err(Self::missing_bucket(bucket)),
        }
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectEntry>> {
        self.check(MemoryOp::ListObjects).await?;
        let buckets = self.buckets.read().await;
        let b = buckets.get(bucket).ok_or_else(|| Self::missing_bucket(bucket))?;

        Ok(b.objects
            .iter()
            .take(self.page_limit)
            .map(|(key, object)| ObjectEntry {
                key: key.clone(),
                size: object.data.len() as u64,
                content_type: Some("application/octet-stream".to_string()),
                created: Some(object.created),
                etag: Some(object.etag.clone()),
                handle: PlatformHandle::None,
            })
            .collect())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.check(MemoryOp::PutObject).await?;
        let mut buckets = self.buckets.write().await;
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;

        b.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                created: Utc::now(),
                etag: Uuid::new_v4().to_string(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.check(MemoryOp::GetObject).await?;
        let buckets = self.buckets.read().await;
        let b = buckets.get(bucket).ok_or_else(|| Self::missing_bucket(bucket))?;

        b.objects
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}/{}", bucket, key)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.check(MemoryOp::DeleteObject).await?;
        let mut buckets = self.buckets.write().await;
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;

        b.objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}/{}", bucket, key)))
    }
}
