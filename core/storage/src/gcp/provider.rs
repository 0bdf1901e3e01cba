//! Google Cloud Storage backend.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use polycloud_common::{ConnectionString, Error, Platform, Result};

use super::auth::{ServiceAccountKey, TokenManager};
use super::client::GcsClient;
use crate::provider::{ClientSlot, ObjectClient, StorageBackend};

const KEY_JSON_PATH: &str = "JsonPath";
const KEY_PROJECT: &str = "ProjectId";

/// Service-account key file location and project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpCredentials {
    json_path: String,
    project_id: String,
}

impl GcpCredentials {
    /// An empty `project_id` falls back to the project named in the key file.
    pub fn new(json_path: &str, project_id: &str) -> Self {
        Self {
            json_path: json_path.trim().to_string(),
            project_id: project_id.trim().to_string(),
        }
    }

    /// Read `JsonPath` and `ProjectId`.
    ///
    /// # Errors
    /// - Key file path missing
    pub fn from_connection(connection: &ConnectionString) -> Result<Self> {
        Ok(Self::new(
            connection.require(KEY_JSON_PATH)?,
            connection.get(KEY_PROJECT).unwrap_or_default(),
        ))
    }

    /// Serialize as `JsonPath=..;ProjectId=..`.
    pub fn to_connection(&self) -> ConnectionString {
        ConnectionString::new()
            .with(KEY_JSON_PATH, self.json_path.as_str())
            .with(KEY_PROJECT, self.project_id.as_str())
    }

    pub fn json_path(&self) -> &str {
        &self.json_path
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

/// Storage backend for Google Cloud Storage.
///
/// Folders are the buckets of one project.
pub struct GcpStorage {
    credentials: GcpCredentials,
    account: Option<String>,
    slot: ClientSlot,
}

impl GcpStorage {
    /// Create a backend. The key file is not read until `open`.
    pub fn new(credentials: GcpCredentials) -> Self {
        Self {
            credentials,
            account: None,
            slot: ClientSlot::default(),
        }
    }

    /// Create a backend that adopts `client` on `open`.
    pub fn with_client(credentials: GcpCredentials, client: Arc<dyn ObjectClient>) -> Self {
        Self {
            credentials,
            account: None,
            slot: ClientSlot::with_preset(client),
        }
    }

    pub fn credentials(&self) -> &GcpCredentials {
        &self.credentials
    }

    async fn connect(&self) -> Result<GcsClient> {
        let key = ServiceAccountKey::load(Path::new(&self.credentials.json_path))
            .await
            .map_err(|e| match e {
                Error::NotFound(detail) | Error::Io(detail) => Error::Authentication(detail),
                other => other,
            })?;

        let project_id = match (self.credentials.project_id.as_str(), &key.project_id) {
            ("", Some(from_key)) => from_key.clone(),
            ("", None) => {
                return Err(Error::InvalidInput(
                    "No project id given and none in the key file".to_string(),
                ))
            }
            (configured, _) => configured.to_string(),
        };

        let http = GcsClient::http_client()?;
        let token_manager = Arc::new(TokenManager::new(key, http.clone()));
        Ok(GcsClient::new(http, token_manager, project_id))
    }
}

#[async_trait]
impl StorageBackend for GcpStorage {
    fn platform(&self) -> Platform {
        Platform::Gcp
    }

    fn connection(&self) -> ConnectionString {
        self.credentials.to_connection()
    }

    fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    fn bind_account(&mut self, account: &str) {
        self.account = Some(account.to_string());
    }

    fn client(&self) -> Result<&Arc<dyn ObjectClient>> {
        self.slot.get(Platform::Gcp)
    }

    async fn open(&mut self) -> Result<()> {
        let client: Arc<dyn ObjectClient> = match self.slot.preset() {
            Some(client) => client,
            None => Arc::new(self.connect().await?),
        };
        self.slot.install(Platform::Gcp, client).await
    }

    async fn close(&mut self) -> Result<()> {
        self.slot.release(Platform::Gcp);
        Ok(())
    }
}
