//! Azure Blob Storage backend.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use polycloud_common::{ConnectionString, Error, Platform, Result, SecretString};

use super::client::AzureBlobClient;
use crate::provider::{ClientSlot, ObjectClient, StorageBackend};

const KEY_ACCOUNT: &str = "accountName";
const KEY_SECRET: &str = "AccountKey";

/// Storage account name and shared key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureCredentials {
    account_name: String,
    account_key: SecretString,
}

impl AzureCredentials {
    pub fn new(account_name: &str, account_key: &str) -> Self {
        Self {
            account_name: account_name.trim().to_string(),
            account_key: SecretString::new(account_key.trim()),
        }
    }

    /// Read `accountName` and `AccountKey`.
    ///
    /// Keys match case-insensitively, so a connection string copied from the
    /// Azure portal (`DefaultEndpointsProtocol=https;AccountName=..;AccountKey=..;
    /// EndpointSuffix=..`) is accepted as well; other fields are ignored.
    ///
    /// # Errors
    /// - Account name or key missing
    pub fn from_connection(connection: &ConnectionString) -> Result<Self> {
        Ok(Self::new(
            connection.require(KEY_ACCOUNT)?,
            connection.require(KEY_SECRET)?,
        ))
    }

    /// Serialize as `accountName=..;AccountKey=..`.
    pub fn to_connection(&self) -> ConnectionString {
        ConnectionString::new()
            .with(KEY_ACCOUNT, self.account_name.as_str())
            .with(KEY_SECRET, self.account_key.expose())
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn account_key(&self) -> &SecretString {
        &self.account_key
    }
}

/// Storage backend for Azure Blob Storage.
///
/// Containers are folders. Creating a container that already exists
/// succeeds.
pub struct AzureStorage {
    credentials: AzureCredentials,
    account: Option<String>,
    slot: ClientSlot,
}

impl AzureStorage {
    /// Create a backend. No I/O happens until `open`.
    pub fn new(credentials: AzureCredentials) -> Self {
        Self {
            credentials,
            account: None,
            slot: ClientSlot::default(),
        }
    }

    /// Create a backend that adopts `client` on `open`.
    pub fn with_client(credentials: AzureCredentials, client: Arc<dyn ObjectClient>) -> Self {
        Self {
            credentials,
            account: None,
            slot: ClientSlot::with_preset(client),
        }
    }

    pub fn credentials(&self) -> &AzureCredentials {
        &self.credentials
    }
}

#[async_trait]
impl StorageBackend for AzureStorage {
    fn platform(&self) -> Platform {
        Platform::Azure
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
        self.slot.get(Platform::Azure)
    }

    async fn open(&mut self) -> Result<()> {
        if self.credentials.account_name.is_empty() || self.credentials.account_key.is_empty() {
            return Err(Error::Authentication(
                "Azure account name and key are required".to_string(),
            ));
        }
        let client: Arc<dyn ObjectClient> = match self.slot.preset() {
            Some(client) => client,
            None => Arc::new(AzureBlobClient::connect(&self.credentials)),
        };
        self.slot.install(Platform::Azure, client).await
    }

    async fn close(&mut self) -> Result<()> {
        self.slot.release(Platform::Azure);
        Ok(())
    }

    async fn new_folder(&self, folder: &str) -> Result<()> {
        match self.client()?.create_bucket(folder).await {
            Ok(()) => info!("Created Azure folder {}", folder),
            Err(Error::AlreadyExists(_)) => info!("Azure folder {} already exists", folder),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryClient;
    use proptest::prelude::*;

    fn credentials() -> AzureCredentials {
        AzureCredentials::new("acmestore", "c2VjcmV0LWtleQ==")
    }

    #[test]
    fn test_connection_string_fields_in_order() {
        assert_eq!(
            credentials().to_connection().to_string(),
            "accountName=acmestore;AccountKey=c2VjcmV0LWtleQ=="
        );
    }

    #[test]
    fn test_connection_round_trip_keeps_padding() {
        let parsed = ConnectionString::parse(&credentials().to_connection().to_string()).unwrap();
        assert_eq!(AzureCredentials::from_connection(&parsed).unwrap(), credentials());
    }

    #[test]
    fn test_portal_connection_string() {
        let parsed = ConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=acmestore;AccountKey=c2VjcmV0LWtleQ==;EndpointSuffix=core.windows.net",
        )
        .unwrap();
        assert_eq!(AzureCredentials::from_connection(&parsed).unwrap(), credentials());
    }

    #[test]
    fn test_missing_key_rejected() {
        let parsed = ConnectionString::parse("accountName=acmestore").unwrap();
        assert!(AzureCredentials::from_connection(&parsed).is_err());
    }

    #[tokio::test]
    async fn test_open_without_key_fails() {
        let creds = AzureCredentials::new("acmestore", "");
        let mut storage = AzureStorage::with_client(creds, Arc::new(MemoryClient::new()));
        let err = storage.open().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_new_folder_is_create_if_missing() {
        let client = Arc::new(MemoryClient::new());
        let mut storage = AzureStorage::with_client(credentials(), client.clone());
        storage.open().await.unwrap();

        storage.new_folder("photos").await.unwrap();
        storage.new_folder("photos").await.unwrap();
        assert!(client.has_bucket("photos").await);
    }

    #[tokio::test]
    async fn test_folders_keep_account() {
        let client = MemoryClient::new().with_bucket("photos", None);
        let mut storage = AzureStorage::with_client(credentials(), Arc::new(client));
        storage.bind_account("Azure1");
        storage.open().await.unwrap();

        let folders = storage.list_folders().await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].account(), Some("Azure1"));
    }

    proptest! {
        #[test]
        fn prop_credentials_round_trip(
            account_name in "[a-z0-9]{3,24}",
            account_key in "[A-Za-z0-9+/]{20,86}={0,2}",
        ) {
            let original = AzureCredentials::new(&account_name, &account_key);
            let parsed = ConnectionString::parse(&original.to_connection().to_string()).unwrap();
            prop_assert_eq!(AzureCredentials::from_connection(&parsed).unwrap(), original);
        }
    }
}
