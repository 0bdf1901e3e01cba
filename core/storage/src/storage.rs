//! Storage client facade with error-handling policy.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use polycloud_common::{ConnectionString, Error, Platform, Result};

use crate::aws::{AwsCredentials, AwsStorage};
use crate::azure::{AzureCredentials, AzureStorage};
use crate::entity::{CloudFile, CloudFolder};
use crate::gcp::{GcpCredentials, GcpStorage};
use crate::provider::StorageBackend;

/// The closed set of platform backends.
pub enum Backend {
    Aws(AwsStorage),
    Azure(AzureStorage),
    Gcp(GcpStorage),
}

impl Backend {
    /// Rebuild a backend from its platform and connection string.
    ///
    /// # Errors
    /// - `Unsupported` for `Platform::Select`
    /// - `InvalidInput` when required fields are missing
    pub fn from_connection(platform: Platform, connection: &ConnectionString) -> Result<Self> {
        match platform {
            Platform::Aws => Ok(Backend::Aws(AwsStorage::new(
                AwsCredentials::from_connection(connection)?,
            ))),
            Platform::Azure => Ok(Backend::Azure(AzureStorage::new(
                AzureCredentials::from_connection(connection)?,
            ))),
            Platform::Gcp => Ok(Backend::Gcp(GcpStorage::new(
                GcpCredentials::from_connection(connection)?,
            ))),
            Platform::Select => Err(Error::Unsupported(
                "No platform selected; there is no backend to build".to_string(),
            )),
        }
    }

    pub fn as_dyn(&self) -> &dyn StorageBackend {
        match self {
            Backend::Aws(backend) => backend,
            Backend::Azure(backend) => backend,
            Backend::Gcp(backend) => backend,
        }
    }

    pub fn as_dyn_mut(&mut self) -> &mut dyn StorageBackend {
        match self {
            Backend::Aws(backend) => backend,
            Backend::Azure(backend) => backend,
            Backend::Gcp(backend) => backend,
        }
    }
}

impl From<AwsStorage> for Backend {
    fn from(backend: AwsStorage) -> Self {
        Backend::Aws(backend)
    }
}

impl From<AzureStorage> for Backend {
    fn from(backend: AzureStorage) -> Self {
        Backend::Azure(backend)
    }
}

impl From<GcpStorage> for Backend {
    fn from(backend: GcpStorage) -> Self {
        Backend::Gcp(backend)
    }
}

/// Storage client for one platform account.
///
/// Every operation clears the last error on entry. When an operation fails
/// the error is recorded; with `handle_errors` set (the default) the
/// operation then returns its failure value (`false`, or `None` for
/// listings), otherwise it returns the error.
pub struct Storage {
    backend: Backend,
    handle_errors: bool,
    last_error: Option<Error>,
}

impl Storage {
    pub fn new(backend: impl Into<Backend>) -> Self {
        Self {
            backend: backend.into(),
            handle_errors: true,
            last_error: None,
        }
    }

    /// AWS S3 with explicit keys. `endpoint` is a region or endpoint URL.
    pub fn aws(access_key: &str, secret_key: &str, endpoint: &str) -> Self {
        Self::new(AwsStorage::new(AwsCredentials::new(
            access_key, secret_key, endpoint,
        )))
    }

    /// AWS S3 with the default credential chain.
    pub fn aws_implicit(endpoint: &str) -> Self {
        Self::new(AwsStorage::new(AwsCredentials::implicit(endpoint)))
    }

    /// Azure Blob Storage with an account name and key.
    pub fn azure(account_name: &str, account_key: &str) -> Self {
        Self::new(AzureStorage::new(AzureCredentials::new(account_name, account_key)))
    }

    /// Azure Blob Storage from an Azure connection string.
    ///
    /// # Errors
    /// - Malformed connection string, or account name/key missing
    pub fn azure_connection_string(connection: &str) -> Result<Self> {
        let parsed = ConnectionString::parse(connection)?;
        Ok(Self::new(AzureStorage::new(AzureCredentials::from_connection(
            &parsed,
        )?)))
    }

    /// Google Cloud Storage with a service-account key file.
    pub fn gcp(json_path: &str, project_id: &str) -> Self {
        Self::new(GcpStorage::new(GcpCredentials::new(json_path, project_id)))
    }

    /// Rebuild a client from a platform and its serialized connection string.
    pub fn from_connection(platform: Platform, connection: &str) -> Result<Self> {
        let parsed = ConnectionString::parse(connection)?;
        Ok(Self::new(Backend::from_connection(platform, &parsed)?))
    }

    pub fn platform(&self) -> Platform {
        self.backend.as_dyn().platform()
    }

    /// Platform display label ("AWS", "Azure", "GCP").
    pub fn platform_name(&self) -> &'static str {
        self.platform().label()
    }

    pub fn handle_errors(&self) -> bool {
        self.handle_errors
    }

    pub fn set_handle_errors(&mut self, handle_errors: bool) {
        self.handle_errors = handle_errors;
    }

    /// Error recorded by the most recent operation, if it failed.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Serialized connection string; secrets appear in plain text.
    pub fn connection(&self) -> String {
        self.backend.as_dyn().connection().to_string()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut Backend {
        &mut self.backend
    }

    /// Attribute listed folders to an account.
    pub fn bind_account(&mut self, account: &str) {
        self.backend.as_dyn_mut().bind_account(account);
    }

    fn settle<T>(&mut self, op: &str, outcome: Result<T>, failed: T) -> Result<T> {
        match outcome {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!("{} {} failed: {}", self.platform(), op, err);
                self.last_error = Some(err.clone());
                if self.handle_errors {
                    Ok(failed)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Authenticate and connect.
    pub async fn open(&mut self) -> Result<bool> {
        self.last_error = None;
        let outcome = self.backend.as_dyn_mut().open().await.map(|_| true);
        self.settle("open", outcome, false)
    }

    /// Release the connection. Safe to call repeatedly or without `open`.
    pub async fn close(&mut self) -> Result<bool> {
        self.last_error = None;
        let outcome = self.backend.as_dyn_mut().close().await.map(|_| true);
        self.settle("close", outcome, false)
    }

    /// List folders in the account's scope.
    pub async fn list_folders(&mut self) -> Result<Option<Vec<CloudFolder>>> {
        self.last_error = None;
        let outcome = self.backend.as_dyn().list_folders().await.map(Some);
        self.settle("list_folders", outcome, None)
    }

    /// List the first page of files in `folder` and store them as its items.
    ///
    /// # Postconditions
    /// - On success the folder's items are replaced wholesale and marked loaded
    /// - On failure the folder is left unchanged
    pub async fn list_files(&mut self, folder: &mut CloudFolder) -> Result<Option<Vec<CloudFile>>> {
        let listed = self.list_files_in(folder.name()).await?;
        if let Some(files) = &listed {
            folder.replace_items(files.clone());
        }
        Ok(listed)
    }

    /// List the first page of files in a folder by name.
    pub async fn list_files_in(&mut self, folder: &str) -> Result<Option<Vec<CloudFile>>> {
        self.last_error = None;
        let outcome = self.backend.as_dyn().list_files(folder).await.map(Some);
        if let Ok(Some(files)) = &outcome {
            debug!("Listed {} files in {}", files.len(), folder);
        }
        self.settle("list_files", outcome, None)
    }

    /// Upload a local file into `folder` under its file name.
    pub async fn upload_file(&mut self, folder: &CloudFolder, local_path: impl AsRef<Path>) -> Result<bool> {
        self.upload_file_to(folder.name(), local_path).await
    }

    /// Upload a local file into a folder given by name.
    pub async fn upload_file_to(&mut self, folder: &str, local_path: impl AsRef<Path>) -> Result<bool> {
        self.last_error = None;
        let outcome = self
            .backend
            .as_dyn()
            .upload_file(folder, local_path.as_ref())
            .await
            .map(|_| true);
        self.settle("upload_file", outcome, false)
    }

    /// Download a listed file; see [`crate::local::download_target`] for
    /// where it lands.
    pub async fn download_file(&mut self, file: &CloudFile, output: impl AsRef<Path>) -> Result<bool> {
        match file.folder() {
            Some(folder) => {
                let folder = folder.to_string();
                self.download_file_from(&folder, file.name(), output).await
            }
            None => {
                self.last_error = None;
                let outcome = Err(Error::InvalidInput(format!(
                    "File {} is not attached to a folder",
                    file.name()
                )));
                self.settle("download_file", outcome, false)
            }
        }
    }

    /// Download a file given by folder and file name.
    pub async fn download_file_from(
        &mut self,
        folder: &str,
        file: &str,
        output: impl AsRef<Path>,
    ) -> Result<bool> {
        self.last_error = None;
        let outcome = self
            .backend
            .as_dyn()
            .download_file(folder, file, output.as_ref())
            .await
            .map(|_| true);
        self.settle("download_file", outcome, false)
    }

    /// Local path a download of `file` to `output` would write.
    pub fn download_target(&self, file: &str, output: impl AsRef<Path>) -> PathBuf {
        crate::local::download_target(output.as_ref(), file)
    }

    /// Create a folder.
    pub async fn new_folder(&mut self, folder: &str) -> Result<bool> {
        self.last_error = None;
        let outcome = self.backend.as_dyn().new_folder(folder).await.map(|_| true);
        self.settle("new_folder", outcome, false)
    }

    /// Delete a folder and everything in it.
    pub async fn delete_folder(&mut self, folder: &str) -> Result<bool> {
        self.last_error = None;
        let outcome = self.backend.as_dyn().delete_folder(folder).await.map(|_| true);
        self.settle("delete_folder", outcome, false)
    }

    /// Delete one file.
    pub async fn delete_file(&mut self, folder: &str, file: &str) -> Result<bool> {
        self.last_error = None;
        let outcome = self
            .backend
            .as_dyn()
            .delete_file(folder, file)
            .await
            .map(|_| true);
        self.settle("delete_file", outcome, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryClient, MemoryOp};
    use crate::provider::ObjectClient;
    use std::sync::Arc;
    use tempfile::TempDir;
    use uuid::Uuid;

    const TEST_CONTENT: &str = "This is a test.";

    async fn seed(client: &MemoryClient, bucket: &str, i: usize) {
        client
            .put_object(bucket, &format!("file-{i}.txt"), vec![i as u8])
            .await
            .unwrap();
    }

    fn memory_storages() -> Vec<(Storage, Arc<MemoryClient>)> {
        let aws_client = Arc::new(MemoryClient::new().with_region("us-east-1"));
        let azure_client = Arc::new(MemoryClient::new());
        let gcp_client = Arc::new(MemoryClient::new());
        vec![
            (
                Storage::new(AwsStorage::with_client(
                    AwsCredentials::new("AKIA", "secret", "us-east-1"),
                    aws_client.clone(),
                )),
                aws_client,
            ),
            (
                Storage::new(AzureStorage::with_client(
                    AzureCredentials::new("acme", "a2V5"),
                    azure_client.clone(),
                )),
                azure_client,
            ),
            (
                Storage::new(GcpStorage::with_client(
                    GcpCredentials::new("key.json", "demo"),
                    gcp_client.clone(),
                )),
                gcp_client,
            ),
        ]
    }

    #[tokio::test]
    async fn test_end_to_end_scenario_all_platforms() {
        for (mut storage, client) in memory_storages() {
            let dir = TempDir::new().unwrap();
            let upload = dir.path().join("test.txt");
            std::fs::write(&upload, TEST_CONTENT).unwrap();
            let folder = format!("test-{}", Uuid::new_v4());

            assert!(storage.open().await.unwrap());
            assert!(storage.new_folder(&folder).await.unwrap());
            assert!(storage.upload_file_to(&folder, &upload).await.unwrap());

            let files = storage.list_files_in(&folder).await.unwrap().unwrap();
            assert_eq!(files.len(), 1);
            assert_eq!(files[0].name(), "test.txt");
            assert_eq!(files[0].size(), TEST_CONTENT.len() as u64);

            let output = dir.path().join("out").join("test2.txt");
            assert!(storage.download_file(&files[0], &output).await.unwrap());
            let downloaded = std::fs::read_to_string(dir.path().join("out").join("test.txt")).unwrap();
            assert_eq!(downloaded, TEST_CONTENT);

            assert!(storage.delete_file(&folder, "test.txt").await.unwrap());
            assert!(storage.delete_folder(&folder).await.unwrap());
            assert!(!client.has_bucket(&folder).await, "{}", storage.platform());
            assert!(storage.close().await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_failed_open_sets_last_error() {
        let mut storage = Storage::new(AwsStorage::with_client(
            AwsCredentials::new("AKIA", "wrong", "us-east-1"),
            Arc::new(MemoryClient::new().rejecting_credentials()),
        ));

        assert!(!storage.open().await.unwrap());
        assert!(matches!(storage.last_error(), Some(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn test_last_error_reset_on_next_operation() {
        let mut storage = Storage::new(GcpStorage::with_client(
            GcpCredentials::new("key.json", "demo"),
            Arc::new(MemoryClient::new()),
        ));

        assert_eq!(storage.list_folders().await.unwrap(), None);
        assert!(matches!(storage.last_error(), Some(Error::NotConnected(_))));

        storage.open().await.unwrap();
        assert!(storage.last_error().is_none());
        assert_eq!(storage.list_folders().await.unwrap(), Some(Vec::new()));
        assert!(storage.last_error().is_none());
    }

    #[tokio::test]
    async fn test_errors_propagate_when_not_handled() {
        let mut storage = Storage::new(AzureStorage::with_client(
            AzureCredentials::new("acme", "a2V5"),
            Arc::new(MemoryClient::new()),
        ));
        storage.set_handle_errors(false);
        storage.open().await.unwrap();

        let err = storage.list_files_in("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(storage.last_error(), Some(&err));
    }

    #[tokio::test]
    async fn test_list_files_marks_folder_loaded() {
        let client = MemoryClient::new().with_bucket("docs", None);
        let mut storage = Storage::new(GcpStorage::with_client(
            GcpCredentials::new("key.json", "demo"),
            Arc::new(client),
        ));
        storage.open().await.unwrap();

        let mut missing = CloudFolder::new("missing");
        assert_eq!(storage.list_files(&mut missing).await.unwrap(), None);
        assert!(!missing.items_loaded());

        let mut docs = CloudFolder::new("docs");
        assert_eq!(storage.list_files(&mut docs).await.unwrap(), Some(Vec::new()));
        assert!(docs.items_loaded());
        assert_eq!(docs.items().map(|items| items.len()), Some(0));
    }

    #[tokio::test]
    async fn test_delete_folder_removes_every_page() {
        let client = Arc::new(MemoryClient::new().with_page_limit(2));
        let mut storage = Storage::new(AzureStorage::with_client(
            AzureCredentials::new("acme", "a2V5"),
            client.clone(),
        ));
        storage.open().await.unwrap();
        storage.new_folder("bulk").await.unwrap();
        for i in 0..5 {
            seed(&client, "bulk", i).await;
        }

        assert!(storage.delete_folder("bulk").await.unwrap());
        assert!(!client.has_bucket("bulk").await);
        assert_eq!(storage.list_files_in("bulk").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_folder_reports_partial_delete() {
        let client = Arc::new(
            MemoryClient::new()
                .with_region("us-east-1")
                .failing(MemoryOp::DeleteObject, 2, Error::Transport("reset".to_string())),
        );
        let mut storage = Storage::new(AwsStorage::with_client(
            AwsCredentials::new("AKIA", "secret", "us-east-1"),
            client.clone(),
        ));
        storage.open().await.unwrap();
        storage.new_folder("photos").await.unwrap();
        for i in 0..3 {
            seed(&client, "photos", i).await;
        }

        assert!(!storage.delete_folder("photos").await.unwrap());
        match storage.last_error() {
            Some(Error::PartialDelete { folder, deleted, .. }) => {
                assert_eq!(folder, "photos");
                assert_eq!(*deleted, 2);
            }
            other => panic!("Expected PartialDelete, got {:?}", other),
        }
        assert_eq!(client.object_count("photos").await, Some(1));
    }

    #[tokio::test]
    async fn test_delete_folder_failing_first_surfaces_cause() {
        let client = Arc::new(MemoryClient::new().with_bucket("docs", None).failing(
            MemoryOp::ListObjects,
            0,
            Error::Authentication("expired".to_string()),
        ));
        let mut storage = Storage::new(GcpStorage::with_client(
            GcpCredentials::new("key.json", "demo"),
            client,
        ));
        storage.open().await.unwrap();

        assert!(!storage.delete_folder("docs").await.unwrap());
        assert!(matches!(storage.last_error(), Some(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn test_existing_folder_fails_on_aws_and_gcp() {
        for (mut storage, _client) in memory_storages() {
            storage.open().await.unwrap();
            storage.new_folder("dup").await.unwrap();
            let second = storage.new_folder("dup").await.unwrap();
            assert_eq!(second, storage.platform() == Platform::Azure);
        }
    }

    #[test]
    fn test_connection_round_trip_all_platforms() {
        let storages = [
            Storage::aws("AKIA", "s3cr3t", "eu-west-1"),
            Storage::aws_implicit("us-east-2"),
            Storage::azure("acme", "a2V5PT0="),
            Storage::gcp("/keys/gcp.json", "demo"),
        ];
        for storage in storages {
            let rebuilt = Storage::from_connection(storage.platform(), &storage.connection()).unwrap();
            assert_eq!(rebuilt.connection(), storage.connection());
            assert_eq!(rebuilt.platform(), storage.platform());
        }
    }

    #[test]
    fn test_azure_connection_string_constructor() {
        let storage = Storage::azure_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=acme;AccountKey=a2V5PT0=;EndpointSuffix=core.windows.net",
        )
        .unwrap();
        assert_eq!(storage.connection(), "accountName=acme;AccountKey=a2V5PT0=");
        assert_eq!(storage.platform_name(), "Azure");
    }

    #[test]
    fn test_select_has_no_backend() {
        assert!(matches!(
            Storage::from_connection(Platform::Select, ""),
            Err(Error::Unsupported(_))
        ));
    }
}
