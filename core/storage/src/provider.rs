//! Storage contract and the client call contract adapters consume.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use polycloud_common::{ConnectionString, Error, Platform, Result};

use crate::entity::{CloudFile, CloudFolder, PlatformHandle};
use crate::local;

/// Upper bound on list-and-delete passes while emptying a folder.
const PURGE_PASS_LIMIT: usize = 1000;

/// A bucket/container as reported by a platform client.
#[derive(Debug, Clone)]
pub struct BucketEntry {
    pub name: String,
    /// Region/location the bucket lives in, when the platform reports one.
    pub region: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub handle: PlatformHandle,
}

/// An object as reported by a platform client.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub handle: PlatformHandle,
}

/// Narrow call contract over a vendor SDK client.
///
/// Implementations translate vendor failures into [`Error`] and never expose
/// vendor error types. Listings return a single page only.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Client name for logging (e.g. "s3", "azure-blob", "gcs", "memory").
    fn name(&self) -> &str;

    /// Check that the configured credentials are accepted.
    ///
    /// # Errors
    /// - `Authentication` when the platform rejects the identity
    /// - `Transport` when the platform cannot be reached
    async fn verify(&self) -> Result<()>;

    /// List buckets visible to the identity.
    async fn list_buckets(&self) -> Result<Vec<BucketEntry>>;

    /// Create a bucket.
    ///
    /// # Errors
    /// - `AlreadyExists` when the platform refuses to recreate it
    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Delete an (empty) bucket.
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// List one page of objects in a bucket.
    ///
    /// # Errors
    /// - `NotFound` when the bucket does not exist
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectEntry>>;

    /// Store an object, replacing any existing one with the same key.
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()>;

    /// Fetch an object's content.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Delete an object.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
}

/// Storage backend implemented once per platform.
///
/// Adapters supply credentials handling, `open`/`close` and the connection
/// descriptor; the folder and file operations are provided in terms of the
/// adapter's [`ObjectClient`] and may be overridden where a platform differs.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Platform this backend talks to.
    fn platform(&self) -> Platform;

    /// Key-value descriptor sufficient to rebuild this backend.
    ///
    /// Secrets appear in plain text.
    fn connection(&self) -> ConnectionString;

    /// Name of the account folders are attributed to.
    fn account(&self) -> Option<&str>;

    /// Attribute listed folders to an account.
    fn bind_account(&mut self, account: &str);

    /// The client acquired by `open`.
    ///
    /// # Errors
    /// - `NotConnected` before a successful `open` or after `close`
    fn client(&self) -> Result<&Arc<dyn ObjectClient>>;

    /// Authenticate and acquire the platform client.
    ///
    /// # Postconditions
    /// - On success, `client()` returns the verified client
    ///
    /// # Errors
    /// - `Authentication` when credentials are missing or rejected
    /// - `Transport` when the platform cannot be reached
    async fn open(&mut self) -> Result<()>;

    /// Release the platform client. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Whether a listed bucket belongs to this backend's region/scope.
    fn in_scope(&self, _bucket: &BucketEntry) -> bool {
        true
    }

    /// List folders within scope.
    ///
    /// # Preconditions
    /// - `open` must have succeeded
    ///
    /// # Postconditions
    /// - Every returned folder passed `in_scope` and carries this backend's account
    ///
    /// # Errors
    /// - Any failure of the underlying listing; no partial list is returned
    async fn list_folders(&self) -> Result<Vec<CloudFolder>> {
        let client = self.client()?;
        let buckets = client.list_buckets().await?;
        let total = buckets.len();

        let folders: Vec<CloudFolder> = buckets
            .into_iter()
            .filter(|bucket| self.in_scope(bucket))
            .map(|bucket| CloudFolder::listed(bucket.name, self.account(), bucket.handle))
            .collect();

        debug!(
            "{} of {} {} folders in scope",
            folders.len(),
            total,
            self.platform()
        );
        Ok(folders)
    }

    /// List the first page of files in a folder.
    ///
    /// # Preconditions
    /// - `open` must have succeeded
    ///
    /// # Postconditions
    /// - At most one platform page, attributed to `folder`
    ///
    /// # Errors
    /// - `NotFound` when the folder does not exist
    async fn list_files(&self, folder: &str) -> Result<Vec<CloudFile>> {
        let client = self.client()?;
        let objects = client.list_objects(folder).await?;

        Ok(objects
            .into_iter()
            .map(|object| {
                CloudFile::listed(
                    folder,
                    object.key,
                    object.size,
                    object.content_type,
                    object.created,
                    object.etag,
                    object.handle,
                )
            })
            .collect())
    }

    /// Upload a local file under its file name; returns the object name.
    ///
    /// # Preconditions
    /// - `open` must have succeeded
    /// - `local_path` names a readable file
    ///
    /// # Postconditions
    /// - An object named after the file's last path component replaces any
    ///   existing object of that name
    ///
    /// # Errors
    /// - `InvalidInput` when the path has no file name
    /// - `NotFound`/`Io` when the local file cannot be read
    async fn upload_file(&self, folder: &str, local_path: &Path) -> Result<String> {
        let client = self.client()?;
        let name = local::object_name(local_path)?;
        let data = local::read_upload(local_path).await?;

        debug!("Uploading {} ({} bytes) to {}/{}", local_path.display(), data.len(), folder, name);
        client.put_object(folder, &name, data).await?;
        Ok(name)
    }

    /// Download an object; returns the local file written.
    ///
    /// # Preconditions
    /// - `open` must have succeeded
    ///
    /// # Postconditions
    /// - The content is written to the directory of `output` under the
    ///   object's name, overwriting an existing file
    ///
    /// # Errors
    /// - `NotFound` when the folder or object does not exist
    /// - `Io` when the local file cannot be written
    async fn download_file(&self, folder: &str, file: &str, output: &Path) -> Result<PathBuf> {
        let client = self.client()?;
        let target = local::download_target(output, file);
        let data = client.get_object(folder, file).await?;

        debug!("Downloaded {}/{} ({} bytes) to {}", folder, file, data.len(), target.display());
        local::write_download(&target, &data).await?;
        Ok(target)
    }

    /// Create a folder.
    ///
    /// # Preconditions
    /// - `open` must have succeeded
    ///
    /// # Errors
    /// - `AlreadyExists` when the platform refuses to recreate the folder
    async fn new_folder(&self, folder: &str) -> Result<()> {
        self.client()?.create_bucket(folder).await?;
        info!("Created {} folder {}", self.platform(), folder);
        Ok(())
    }

    /// Delete every object in a folder, then the folder itself.
    ///
    /// Not transactional: a failure after some objects were removed is
    /// reported as `PartialDelete` and nothing is restored.
    ///
    /// # Preconditions
    /// - `open` must have succeeded
    ///
    /// # Postconditions
    /// - On success, neither the folder nor any of its objects exist
    ///
    /// # Errors
    /// - `PartialDelete` when a step fails after at least one object was removed
    /// - The failing step's own error when nothing was removed yet
    async fn delete_folder(&self, folder: &str) -> Result<()> {
        let client = self.client()?;
        let mut deleted = 0usize;

        for _ in 0..PURGE_PASS_LIMIT {
            let batch = client
                .list_objects(folder)
                .await
                .map_err(|e| partial_delete(folder, deleted, e))?;
            if batch.is_empty() {
                break;
            }
            for object in batch {
                client
                    .delete_object(folder, &object.key)
                    .await
                    .map_err(|e| partial_delete(folder, deleted, e))?;
                deleted += 1;
            }
        }

        client
            .delete_bucket(folder)
            .await
            .map_err(|e| partial_delete(folder, deleted, e))?;

        info!("Deleted {} folder {} ({} objects)", self.platform(), folder, deleted);
        Ok(())
    }

    /// Delete one object.
    ///
    /// # Preconditions
    /// - `open` must have succeeded
    async fn delete_file(&self, folder: &str, file: &str) -> Result<()> {
        self.client()?.delete_object(folder, file).await
    }
}

/// Error for a folder delete that failed after removing `deleted` objects.
fn partial_delete(folder: &str, deleted: usize, err: Error) -> Error {
    if deleted == 0 {
        err
    } else {
        Error::PartialDelete {
            folder: folder.to_string(),
            deleted,
            reason: err.to_string(),
        }
    }
}

/// Error for operations issued while no client is held.
pub(crate) fn not_connected(platform: Platform) -> Error {
    Error::NotConnected(format!("{} storage is not open; call open() first", platform))
}

/// Client held by an adapter between `open` and `close`.
///
/// A preset client (injected for tests or shared setups) is adopted by `open`
/// instead of building a vendor client.
#[derive(Default)]
pub(crate) struct ClientSlot {
    active: Option<Arc<dyn ObjectClient>>,
    preset: Option<Arc<dyn ObjectClient>>,
}

impl ClientSlot {
    pub(crate) fn with_preset(client: Arc<dyn ObjectClient>) -> Self {
        Self {
            active: None,
            preset: Some(client),
        }
    }

    pub(crate) fn get(&self, platform: Platform) -> Result<&Arc<dyn ObjectClient>> {
        self.active.as_ref().ok_or_else(|| not_connected(platform))
    }

    pub(crate) fn preset(&self) -> Option<Arc<dyn ObjectClient>> {
        self.preset.clone()
    }

    /// Verify the client's credentials and hold it.
    pub(crate) async fn install(
        &mut self,
        platform: Platform,
        client: Arc<dyn ObjectClient>,
    ) -> Result<()> {
        client.verify().await?;
        info!("Opened {} storage ({} client)", platform, client.name());
        self.active = Some(client);
        Ok(())
    }

    pub(crate) fn release(&mut self, platform: Platform) {
        if let Some(client) = self.active.take() {
            info!("Closed {} storage ({} client)", platform, client.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_delete_only_after_progress() {
        let cause = Error::Platform("container locked".to_string());
        assert_eq!(partial_delete("docs", 0, cause.clone()), cause);

        match partial_delete("docs", 2, cause) {
            Error::PartialDelete { folder, deleted, reason } => {
                assert_eq!(folder, "docs");
                assert_eq!(deleted, 2);
                assert!(reason.contains("container locked"));
            }
            other => panic!("Expected PartialDelete, got {:?}", other),
        }
    }

    #[test]
    fn test_not_connected_names_platform() {
        let err = not_connected(Platform::Azure);
        assert!(matches!(err, Error::NotConnected(_)));
        assert!(err.to_string().contains("Azure"));
    }
}
