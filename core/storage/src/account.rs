//! Storage accounts: platform selection, construction and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use polycloud_common::{Error, Platform, Result};

use crate::entity::CloudFolder;
use crate::storage::Storage;

/// Persisted form of a [`StorageAccount`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    pub platform: Platform,
    /// Serialized connection string; empty for `select` accounts.
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AccountConfig {
    /// Default accounts file: `<config dir>/polycloud/accounts.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("polycloud").join("accounts.json"))
    }

    /// Read a JSON array of accounts. A missing file yields no accounts.
    pub async fn load_all(path: &Path) -> Result<Vec<AccountConfig>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No accounts file at {}", path.display());
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write accounts as a JSON array, creating the parent directory.
    ///
    /// Connection strings are written as-is, secrets included.
    pub async fn save_all(path: &Path, accounts: &[AccountConfig]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(accounts)
            .map_err(|e| Error::InvalidInput(format!("Failed to serialize accounts: {}", e)))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// A named account bound to exactly one platform.
///
/// The platform is fixed at construction. A `select` account has no storage
/// client.
pub struct StorageAccount {
    name: String,
    timestamp: DateTime<Utc>,
    platform: Platform,
    storage: Option<Storage>,
    folders: Vec<CloudFolder>,
    items_loaded: bool,
}

impl StorageAccount {
    /// AWS account with explicit keys, named `AWS1`.
    pub fn aws(access_key: &str, secret_key: &str, endpoint: &str) -> Self {
        Self::with_storage("AWS1", Storage::aws(access_key, secret_key, endpoint))
    }

    /// AWS account using the default credential chain, named `AWS1`.
    pub fn aws_implicit(endpoint: &str) -> Self {
        Self::with_storage("AWS1", Storage::aws_implicit(endpoint))
    }

    /// Azure account, named `Azure1`.
    pub fn azure(account_name: &str, account_key: &str) -> Self {
        Self::with_storage("Azure1", Storage::azure(account_name, account_key))
    }

    /// Azure account from an Azure connection string, named `Azure1`.
    pub fn azure_connection_string(connection: &str) -> Result<Self> {
        Ok(Self::with_storage(
            "Azure1",
            Storage::azure_connection_string(connection)?,
        ))
    }

    /// GCP account, named `GCP1`.
    pub fn gcp(json_path: &str, project_id: &str) -> Self {
        Self::with_storage("GCP1", Storage::gcp(json_path, project_id))
    }

    /// Account with no platform selected.
    pub fn select(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: Utc::now(),
            platform: Platform::Select,
            storage: None,
            folders: Vec::new(),
            items_loaded: false,
        }
    }

    /// Account around an already-built storage client.
    pub fn with_storage(name: impl Into<String>, mut storage: Storage) -> Self {
        let name = name.into();
        storage.bind_account(&name);
        Self {
            platform: storage.platform(),
            name,
            timestamp: Utc::now(),
            storage: Some(storage),
            folders: Vec::new(),
            items_loaded: false,
        }
    }

    /// Build an account from a platform tag and positional parameters.
    ///
    /// | tag | `key` | `secret` | `endpoint` |
    /// |---|---|---|---|
    /// | `AWS` | access key | secret key | region or endpoint URL |
    /// | `Azure` | account name, or a connection string when `secret` is empty | account key | unused |
    /// | `GCP` | key file path | project id | unused |
    /// | `select` | unused | unused | unused |
    ///
    /// # Errors
    /// - `Unsupported` for an unknown tag
    /// - `InvalidInput` for a malformed Azure connection string
    pub fn new(name: &str, tag: &str, key: &str, secret: &str, endpoint: &str) -> Result<Self> {
        let platform: Platform = tag.parse()?;
        let storage = match platform {
            Platform::Select => return Ok(Self::select(name)),
            Platform::Aws => Storage::aws(key, secret, endpoint),
            Platform::Azure if secret.is_empty() => Storage::azure_connection_string(key)?,
            Platform::Azure => Storage::azure(key, secret),
            Platform::Gcp => Storage::gcp(key, secret),
        };
        Ok(Self::with_storage(name, storage))
    }

    /// Rebuild an account from a persisted connection string.
    pub fn from_connection(name: &str, platform: Platform, connection: &str) -> Result<Self> {
        match platform {
            Platform::Select => Ok(Self::select(name)),
            _ => Ok(Self::with_storage(
                name,
                Storage::from_connection(platform, connection)?,
            )),
        }
    }

    pub fn from_config(config: &AccountConfig) -> Result<Self> {
        let mut account = Self::from_connection(&config.name, config.platform, &config.connection)?;
        if let Some(timestamp) = config.timestamp {
            account.timestamp = timestamp;
        }
        Ok(account)
    }

    pub fn to_config(&self) -> AccountConfig {
        AccountConfig {
            name: self.name.clone(),
            platform: self.platform,
            connection: self.connection().unwrap_or_default(),
            timestamp: Some(self.timestamp),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the account; folders listed afterwards carry the new name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        if let Some(storage) = self.storage.as_mut() {
            storage.bind_account(&self.name);
        }
    }

    /// When the account was last accessed.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Record an access now.
    pub fn touch(&mut self) {
        self.timestamp = Utc::now();
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> Option<&mut Storage> {
        self.storage.as_mut()
    }

    /// Serialized connection string of the storage client.
    pub fn connection(&self) -> Option<String> {
        self.storage.as_ref().map(Storage::connection)
    }

    /// Folders from the last successful [`load_folders`](Self::load_folders).
    pub fn folders(&self) -> &[CloudFolder] {
        &self.folders
    }

    pub fn folders_mut(&mut self) -> &mut [CloudFolder] {
        &mut self.folders
    }

    pub fn items_loaded(&self) -> bool {
        self.items_loaded
    }

    /// List folders into the account, replacing any previous list.
    ///
    /// Returns `Ok(false)` when the listing failed and the storage client
    /// handles errors; the previous folder list is kept.
    ///
    /// # Errors
    /// - `Unsupported` for a `select` account
    /// - The listing error, when the storage client does not handle errors
    pub async fn load_folders(&mut self) -> Result<bool> {
        let storage = self.storage.as_mut().ok_or_else(|| {
            Error::Unsupported(format!("Account {} has no platform selected", self.name))
        })?;

        match storage.list_folders().await? {
            Some(folders) => {
                info!("Loaded {} folders for account {}", folders.len(), self.name);
                self.folders = folders;
                self.items_loaded = true;
                self.timestamp = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::{AwsCredentials, AwsStorage};
    use crate::memory::MemoryClient;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_named_factories() {
        let aws = StorageAccount::aws("AKIA", "secret", "us-east-1");
        assert_eq!(aws.name(), "AWS1");
        assert_eq!(aws.platform(), Platform::Aws);
        assert_eq!(aws.storage().map(|s| s.platform_name()), Some("AWS"));

        assert_eq!(StorageAccount::aws_implicit("us-east-1").name(), "AWS1");
        assert_eq!(StorageAccount::azure("acme", "a2V5").name(), "Azure1");
        assert_eq!(StorageAccount::gcp("key.json", "demo").name(), "GCP1");
    }

    #[test]
    fn test_generic_constructor_dispatch() {
        let aws = StorageAccount::new("backups", "AWS", "AKIA", "secret", "eu-west-1").unwrap();
        assert_eq!(
            aws.connection().unwrap(),
            "AccountKey=AKIA;SecretKey=secret;S3Endpoint=eu-west-1"
        );

        let gcp = StorageAccount::new("analytics", "GCP", "/keys/gcp.json", "demo", "").unwrap();
        assert_eq!(gcp.connection().unwrap(), "JsonPath=/keys/gcp.json;ProjectId=demo");

        let azure = StorageAccount::new("media", "Azure", "acme", "a2V5", "").unwrap();
        assert_eq!(azure.connection().unwrap(), "accountName=acme;AccountKey=a2V5");
    }

    #[test]
    fn test_azure_empty_secret_uses_connection_string() {
        let account = StorageAccount::new(
            "media",
            "Azure",
            "AccountName=acme;AccountKey=a2V5PT0=",
            "",
            "",
        )
        .unwrap();
        assert_eq!(account.connection().unwrap(), "accountName=acme;AccountKey=a2V5PT0=");
    }

    #[test]
    fn test_select_has_no_storage() {
        let account = StorageAccount::new("new", "select", "", "", "").unwrap();
        assert_eq!(account.platform(), Platform::Select);
        assert!(account.storage().is_none());
        assert!(account.connection().is_none());
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        let err = StorageAccount::new("x", "Dropbox", "", "", "").err().unwrap();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_config_round_trip() {
        let account = StorageAccount::azure("acme", "a2V5PT0=");
        let config = account.to_config();
        assert_eq!(config.platform, Platform::Azure);

        let restored = StorageAccount::from_config(&config).unwrap();
        assert_eq!(restored.name(), "Azure1");
        assert_eq!(restored.connection(), account.connection());
        assert_eq!(restored.timestamp(), account.timestamp());
    }

    #[tokio::test]
    async fn test_save_and_load_accounts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("polycloud").join("accounts.json");
        let accounts = vec![
            StorageAccount::aws("AKIA", "secret", "us-east-1").to_config(),
            StorageAccount::select("draft").to_config(),
        ];

        AccountConfig::save_all(&path, &accounts).await.unwrap();
        let loaded = AccountConfig::load_all(&path).await.unwrap();
        assert_eq!(loaded, accounts);
    }

    #[tokio::test]
    async fn test_load_missing_accounts_file() {
        let dir = TempDir::new().unwrap();
        let loaded = AccountConfig::load_all(&dir.path().join("none.json")).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_load_folders_attributes_account() {
        let client = MemoryClient::new()
            .with_bucket("photos", Some("us-east-1"))
            .with_bucket("logs", Some("us-east-1"));
        let storage = Storage::new(AwsStorage::with_client(
            AwsCredentials::new("AKIA", "secret", "us-east-1"),
            Arc::new(client),
        ));
        let mut account = StorageAccount::with_storage("Personal", storage);
        assert!(!account.items_loaded());

        account.storage_mut().unwrap().open().await.unwrap();
        assert!(account.load_folders().await.unwrap());
        assert!(account.items_loaded());
        assert_eq!(account.folders().len(), 2);
        assert!(account.folders().iter().all(|f| f.account() == Some("Personal")));
    }

    #[tokio::test]
    async fn test_load_folders_on_fresh_account_is_empty() {
        let storage = Storage::new(AwsStorage::with_client(
            AwsCredentials::implicit("us-east-1"),
            Arc::new(MemoryClient::new()),
        ));
        let mut account = StorageAccount::with_storage("Empty", storage);
        account.storage_mut().unwrap().open().await.unwrap();

        assert!(account.load_folders().await.unwrap());
        assert!(account.items_loaded());
        assert!(account.folders().is_empty());
    }

    #[tokio::test]
    async fn test_load_folders_failure_keeps_unloaded() {
        let mut account = StorageAccount::gcp("key.json", "demo");
        // never opened
        assert!(!account.load_folders().await.unwrap());
        assert!(!account.items_loaded());
        assert!(matches!(
            account.storage().and_then(|s| s.last_error()),
            Some(Error::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_select_account_cannot_load() {
        let mut account = StorageAccount::select("draft");
        assert!(matches!(account.load_folders().await, Err(Error::Unsupported(_))));
    }
}
