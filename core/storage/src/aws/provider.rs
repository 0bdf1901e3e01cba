//! AWS S3 storage backend.

use async_trait::async_trait;
use std::sync::Arc;

use polycloud_common::{ConnectionString, Platform, Result, SecretString};

use super::client::{S3Client, DEFAULT_REGION};
use crate::provider::{BucketEntry, ClientSlot, ObjectClient, StorageBackend};

const KEY_ACCESS: &str = "AccountKey";
const KEY_SECRET: &str = "SecretKey";
const KEY_ENDPOINT: &str = "S3Endpoint";

/// S3 credentials and region/endpoint.
///
/// `endpoint` holds either a region name (`eu-west-1`) or the URL of an
/// S3-compatible service (`http://localhost:9000`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsCredentials {
    access_key: Option<String>,
    secret_key: Option<SecretString>,
    endpoint: Option<String>,
}

impl AwsCredentials {
    /// Explicit key credentials. Empty strings count as absent.
    pub fn new(access_key: &str, secret_key: &str, endpoint: &str) -> Self {
        Self {
            access_key: non_empty(access_key),
            secret_key: non_empty(secret_key).map(SecretString::new),
            endpoint: non_empty(endpoint),
        }
    }

    /// Ambient identity from the SDK's default credential chain.
    pub fn implicit(endpoint: &str) -> Self {
        Self::new("", "", endpoint)
    }

    /// Read `AccountKey`, `SecretKey` and `S3Endpoint`.
    ///
    /// Missing and empty values are both treated as absent.
    pub fn from_connection(connection: &ConnectionString) -> Result<Self> {
        Ok(Self {
            access_key: connection.optional(KEY_ACCESS).map(str::to_string),
            secret_key: connection.optional(KEY_SECRET).map(SecretString::new),
            endpoint: connection.optional(KEY_ENDPOINT).map(str::to_string),
        })
    }

    /// Serialize as `AccountKey=..;SecretKey=..;S3Endpoint=..`.
    pub fn to_connection(&self) -> ConnectionString {
        ConnectionString::new()
            .with(KEY_ACCESS, self.access_key.as_deref().unwrap_or_default())
            .with(
                KEY_SECRET,
                self.secret_key.as_ref().map(|s| s.expose()).unwrap_or_default(),
            )
            .with(KEY_ENDPOINT, self.endpoint.as_deref().unwrap_or_default())
    }

    pub fn access_key(&self) -> Option<&str> {
        self.access_key.as_deref()
    }

    pub fn secret_key(&self) -> Option<&SecretString> {
        self.secret_key.as_ref()
    }

    /// Whether the default credential chain is used.
    pub fn is_implicit(&self) -> bool {
        self.access_key.is_none()
    }

    /// Custom endpoint URL, when the endpoint is not a region name.
    pub fn endpoint_url(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .filter(|e| e.starts_with("http://") || e.starts_with("https://"))
    }

    /// Region requests are signed for.
    pub fn region(&self) -> String {
        match (&self.endpoint, self.endpoint_url()) {
            (Some(region), None) => region.clone(),
            _ => DEFAULT_REGION.to_string(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Storage backend for AWS S3.
///
/// Folder listings are limited to buckets located in the configured region.
pub struct AwsStorage {
    credentials: AwsCredentials,
    account: Option<String>,
    slot: ClientSlot,
}

impl AwsStorage {
    /// Create a backend. No I/O happens until `open`.
    pub fn new(credentials: AwsCredentials) -> Self {
        Self {
            credentials,
            account: None,
            slot: ClientSlot::default(),
        }
    }

    /// Create a backend that adopts `client` on `open` instead of building an
    /// SDK client.
    pub fn with_client(credentials: AwsCredentials, client: Arc<dyn ObjectClient>) -> Self {
        Self {
            credentials,
            account: None,
            slot: ClientSlot::with_preset(client),
        }
    }

    pub fn credentials(&self) -> &AwsCredentials {
        &self.credentials
    }
}

#[async_trait]
impl StorageBackend for AwsStorage {
    fn platform(&self) -> Platform {
        Platform::Aws
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
        self.slot.get(Platform::Aws)
    }

    async fn open(&mut self) -> Result<()> {
        let client: Arc<dyn ObjectClient> = match self.slot.preset() {
            Some(client) => client,
            None => Arc::new(S3Client::connect(&self.credentials).await?),
        };
        self.slot.install(Platform::Aws, client).await
    }

    async fn close(&mut self) -> Result<()> {
        self.slot.release(Platform::Aws);
        Ok(())
    }

    fn in_scope(&self, bucket: &BucketEntry) -> bool {
        bucket.region.as_deref() == Some(self.credentials.region().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryClient;
    use polycloud_common::Error;
    use proptest::prelude::*;

    fn credentials() -> AwsCredentials {
        AwsCredentials::new("AKIAEXAMPLE", "wJalrXUtnFEMI/K7MDENG", "eu-west-1")
    }

    #[test]
    fn test_connection_string_fields_in_order() {
        assert_eq!(
            credentials().to_connection().to_string(),
            "AccountKey=AKIAEXAMPLE;SecretKey=wJalrXUtnFEMI/K7MDENG;S3Endpoint=eu-west-1"
        );
    }

    #[test]
    fn test_connection_round_trip() {
        let original = credentials();
        let parsed =
            ConnectionString::parse(&original.to_connection().to_string()).unwrap();
        assert_eq!(AwsCredentials::from_connection(&parsed).unwrap(), original);
    }

    #[test]
    fn test_implicit_credentials_serialize_empty_keys() {
        let creds = AwsCredentials::implicit("us-west-2");
        assert!(creds.is_implicit());
        assert_eq!(
            creds.to_connection().to_string(),
            "AccountKey=;SecretKey=;S3Endpoint=us-west-2"
        );

        let parsed = ConnectionString::parse("AccountKey=;SecretKey=;S3Endpoint=us-west-2").unwrap();
        assert_eq!(AwsCredentials::from_connection(&parsed).unwrap(), creds);
    }

    #[test]
    fn test_endpoint_url_forces_default_region() {
        let creds = AwsCredentials::new("minio", "minio123", "http://localhost:9000");
        assert_eq!(creds.endpoint_url(), Some("http://localhost:9000"));
        assert_eq!(creds.region(), "us-east-1");

        assert_eq!(AwsCredentials::implicit("").region(), "us-east-1");
        assert_eq!(credentials().endpoint_url(), None);
    }

    #[tokio::test]
    async fn test_operations_before_open_fail() {
        let storage = AwsStorage::new(credentials());
        let err = storage.list_folders().await.unwrap_err();
        assert!(matches!(err, Error::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_folders_filtered_by_region() {
        let client = MemoryClient::new()
            .with_region("eu-west-1")
            .with_bucket("home", Some("eu-west-1"))
            .with_bucket("abroad", Some("us-east-1"))
            .with_bucket("unknown", None);
        let mut storage = AwsStorage::with_client(credentials(), Arc::new(client));
        storage.open().await.unwrap();

        let folders = storage.list_folders().await.unwrap();
        let names: Vec<_> = folders.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["home"]);
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_open() {
        let client = MemoryClient::new().rejecting_credentials();
        let mut storage = AwsStorage::with_client(credentials(), Arc::new(client));

        let err = storage.open().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert!(storage.client().is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut storage = AwsStorage::with_client(credentials(), Arc::new(MemoryClient::new()));
        storage.close().await.unwrap();
        storage.open().await.unwrap();
        storage.close().await.unwrap();
        storage.close().await.unwrap();
        assert!(storage.client().is_err());
    }

    proptest! {
        #[test]
        fn prop_credentials_round_trip(
            access_key in "[A-Z0-9]{16,20}",
            secret_key in "[A-Za-z0-9/+=]{20,40}",
            endpoint in prop_oneof![
                "[a-z]{2}-[a-z]{4,9}-[1-9]",
                "https?://[a-z]{3,10}(:[1-9][0-9]{3})?",
            ],
        ) {
            let original = AwsCredentials::new(&access_key, &secret_key, &endpoint);
            let parsed = ConnectionString::parse(&original.to_connection().to_string()).unwrap();
            prop_assert_eq!(AwsCredentials::from_connection(&parsed).unwrap(), original);
        }
    }
}
