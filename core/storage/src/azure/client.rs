//! Azure Blob Storage client over the Azure SDK.

use async_trait::async_trait;
use azure_core::error::ErrorKind;
use azure_storage::StorageCredentials;
use azure_storage_blobs::prelude::*;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::num::NonZeroU32;

use polycloud_common::{Error, Result};

use super::provider::AzureCredentials;
use crate::entity::{PlatformHandle, SINGLE_PAGE_LIMIT};
use crate::provider::{BucketEntry, ObjectClient, ObjectEntry};

/// Blob service client for one storage account.
pub struct AzureBlobClient {
    service: BlobServiceClient,
    account: String,
}

impl AzureBlobClient {
    /// Build a client authenticated with the account's shared key.
    pub fn connect(credentials: &AzureCredentials) -> Self {
        let account = credentials.account_name().to_string();
        let storage_credentials = StorageCredentials::access_key(
            account.clone(),
            credentials.account_key().expose().to_string(),
        );
        Self {
            service: BlobServiceClient::new(account.clone(), storage_credentials),
            account,
        }
    }

    /// Build a client against a custom blob endpoint such as an emulator.
    #[cfg(test)]
    pub(crate) fn at_endpoint(account: &str, account_key: &str, uri: &str) -> Self {
        let location = azure_storage::CloudLocation::Custom {
            account: account.to_string(),
            uri: uri.to_string(),
        };
        let credentials =
            StorageCredentials::access_key(account.to_string(), account_key.to_string());
        Self {
            service: ClientBuilder::with_location(location, credentials).blob_service_client(),
            account: account.to_string(),
        }
    }

    fn blob_url(&self, container: &str, blob: &str) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}/{}",
            self.account, container, blob
        )
    }
}

#[async_trait]
impl ObjectClient for AzureBlobClient {
    fn name(&self) -> &str {
        "azure-blob"
    }

    async fn verify(&self) -> Result<()> {
        match self.service.list_containers().into_stream().next().await {
            Some(Err(e)) => Err(classify("Failed to verify credentials", e)),
            _ => Ok(()),
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketEntry>> {
        let page = match self
            .service
            .list_containers()
            .max_results(page_size())
            .into_stream()
            .next()
            .await
        {
            Some(page) => page.map_err(|e| classify("Failed to list containers", e))?,
            None => return Ok(Vec::new()),
        };

        Ok(page
            .containers
            .into_iter()
            .map(|container| BucketEntry {
                handle: PlatformHandle::Azure {
                    container: container.name.clone(),
                    blob: None,
                    url: None,
                },
                created: to_chrono(
                    container.last_modified.unix_timestamp(),
                    container.last_modified.nanosecond(),
                ),
                region: None,
                name: container.name,
            })
            .collect())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.service
            .container_client(bucket)
            .create()
            .await
            .map(|_| ())
            .map_err(|e| classify(&format!("Failed to create container {}", bucket), e))
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.service
            .container_client(bucket)
            .delete()
            .await
            .map(|_| ())
            .map_err(|e| classify(&format!("Failed to delete container {}", bucket), e))
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectEntry>> {
        let mut pages = self
            .service
            .container_client(bucket)
            .list_blobs()
            .max_results(page_size())
            .into_stream();
        let page = match pages.next().await {
            Some(page) => {
                page.map_err(|e| classify(&format!("Failed to list blobs in {}", bucket), e))?
            }
            None => return Ok(Vec::new()),
        };

        Ok(page
            .blobs
            .blobs()
            .map(|blob| {
                let created = blob.properties.creation_time;
                ObjectEntry {
                    key: blob.name.clone(),
                    size: blob.properties.content_length,
                    content_type: Some(blob.properties.content_type.clone())
                        .filter(|t| !t.is_empty()),
                    created: to_chrono(created.unix_timestamp(), created.nanosecond()),
                    etag: Some(blob.properties.etag.to_string()),
                    handle: PlatformHandle::Azure {
                        container: bucket.to_string(),
                        blob: Some(blob.name.clone()),
                        url: Some(self.blob_url(bucket, &blob.name)),
                    },
                }
            })
            .collect())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.service
            .container_client(bucket)
            .blob_client(key)
            .put_block_blob(Bytes::from(data))
            .content_type("application/octet-stream")
            .await
            .map(|_| ())
            .map_err(|e| classify(&format!("Failed to upload {}/{}", bucket, key), e))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.service
            .container_client(bucket)
            .blob_client(key)
            .get_content()
            .await
            .map_err(|e| classify(&format!("Failed to download {}/{}", bucket, key), e))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.service
            .container_client(bucket)
            .blob_client(key)
            .delete()
            .await
            .map(|_| ())
            .map_err(|e| classify(&format!("Failed to delete {}/{}", bucket, key), e))
    }
}

/// Page size requested from the Blob service.
fn page_size() -> NonZeroU32 {
    NonZeroU32::new(SINGLE_PAGE_LIMIT as u32).unwrap_or(NonZeroU32::MIN)
}

fn to_chrono(secs: i64, nanos: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, nanos)
}

/// Classify an Azure SDK failure into the storage error taxonomy.
pub(crate) fn classify(context: &str, err: azure_core::Error) -> Error {
    let detail = format!("{}: {}", context, err);
    match err.kind() {
        ErrorKind::HttpResponse { status, error_code } => {
            classify_code(error_code.as_deref(), u16::from(*status), detail)
        }
        ErrorKind::Io => Error::Transport(detail),
        ErrorKind::Credential => Error::Authentication(detail),
        _ => Error::Platform(detail),
    }
}

/// Classify by Blob service error code, falling back to the HTTP status.
pub(crate) fn classify_code(code: Option<&str>, status: u16, detail: String) -> Error {
    match code {
        Some(
            "AuthenticationFailed" | "AuthorizationFailure" | "InvalidAuthenticationInfo"
            | "AuthorizationPermissionMismatch",
        ) => Error::Authentication(detail),
        Some("ContainerNotFound" | "BlobNotFound" | "ResourceNotFound") => Error::NotFound(detail),
        Some("ContainerAlreadyExists" | "BlobAlreadyExists") => Error::AlreadyExists(detail),
        Some("ContainerBeingDeleted" | "ServerBusy" | "OperationTimedOut") => {
            Error::Transport(detail)
        }
        _ => match status {
            401 | 403 => Error::Authentication(detail),
            404 => Error::NotFound(detail),
            500..=599 => Error::Transport(detail),
            _ => Error::Platform(detail),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EMPTY_LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="http://127.0.0.1/acme" ContainerName="docs">
  <MaxResults>1000</MaxResults>
  <Blobs />
  <NextMarker />
</EnumerationResults>"#;

    #[test]
    fn test_classify_codes() {
        assert!(matches!(
            classify_code(Some("AuthenticationFailed"), 403, String::new()),
            Error::Authentication(_)
        ));
        assert!(matches!(
            classify_code(Some("ContainerNotFound"), 404, String::new()),
            Error::NotFound(_)
        ));
        assert!(matches!(
            classify_code(Some("ContainerAlreadyExists"), 409, String::new()),
            Error::AlreadyExists(_)
        ));
        assert!(matches!(
            classify_code(Some("ContainerBeingDeleted"), 409, String::new()),
            Error::Transport(_)
        ));
    }

    #[test]
    fn test_classify_falls_back_to_status() {
        assert!(matches!(classify_code(None, 503, String::new()), Error::Transport(_)));
        assert!(matches!(classify_code(None, 400, String::new()), Error::Platform(_)));
    }

    #[test]
    fn test_io_errors_are_transport() {
        let err = azure_core::Error::message(ErrorKind::Io, "connection refused");
        assert!(matches!(classify("list", err), Error::Transport(_)));
    }

    #[test]
    fn test_blob_url() {
        let creds = AzureCredentials::new("acme", "a2V5");
        let client = AzureBlobClient::connect(&creds);
        assert_eq!(
            client.blob_url("docs", "a.txt"),
            "https://acme.blob.core.windows.net/docs/a.txt"
        );
    }

    #[tokio::test]
    async fn test_blob_listing_asks_service_for_one_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/docs"))
            .and(query_param("restype", "container"))
            .and(query_param("comp", "list"))
            .and(query_param("maxresults", "1000"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ms-request-id", "5f3c2f0e-5e6b-4a59-9d1d-3c1f2a7b9e10")
                    .insert_header("date", "Mon, 02 Oct 2023 20:00:31 GMT")
                    .set_body_raw(EMPTY_LISTING, "application/xml"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let uri = format!("{}/acme", server.uri());
        let client = AzureBlobClient::at_endpoint("acme", "a2V5a2V5a2V5", &uri);
        assert!(client.list_objects("docs").await.unwrap().is_empty());
    }
}
