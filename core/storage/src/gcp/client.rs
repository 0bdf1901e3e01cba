//! Cloud Storage JSON API client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use polycloud_common::{Error, Result};

use super::auth::TokenManager;
use crate::entity::{PlatformHandle, SINGLE_PAGE_LIMIT};
use crate::provider::{BucketEntry, ObjectClient, ObjectEntry};

/// Cloud Storage API base URL.
const STORAGE_API_BASE: &str = "https://storage.googleapis.com/storage/v1";
/// Cloud Storage upload API base URL.
const STORAGE_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";

/// Characters left unescaped in an object name path segment.
const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Bucket resource from the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsBucket {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub self_link: Option<String>,
}

/// Object resource from the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsObject {
    pub name: String,
    pub bucket: String,
    /// Size in bytes, encoded as a decimal string.
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub generation: Option<String>,
    #[serde(default)]
    pub self_link: Option<String>,
}

impl GcsObject {
    /// Get size as u64.
    pub fn size_bytes(&self) -> u64 {
        self.size.as_ref().and_then(|s| s.parse().ok()).unwrap_or(0)
    }
}

/// One page of a list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Cloud Storage API client scoped to one project.
pub struct GcsClient {
    http: Client,
    token_manager: Arc<TokenManager>,
    project_id: String,
}

impl GcsClient {
    /// Create a new Cloud Storage client.
    pub fn new(http: Client, token_manager: Arc<TokenManager>, project_id: impl Into<String>) -> Self {
        Self {
            http,
            token_manager,
            project_id: project_id.into(),
        }
    }

    /// Build the HTTP client shared by the token manager and the API client.
    pub fn http_client() -> Result<Client> {
        Client::builder()
            .user_agent(concat!("PolyCloud/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Get authorization header.
    async fn auth_header(&self) -> Result<String> {
        let token = self.token_manager.get_access_token().await?;
        Ok(format!("Bearer {}", token))
    }

    fn object_url(bucket: &str, name: &str) -> String {
        format!(
            "{}/b/{}/o/{}",
            STORAGE_API_BASE,
            bucket,
            utf8_percent_encode(name, OBJECT_NAME)
        )
    }

    async fn list_bucket_page(&self, max_results: usize) -> Result<Vec<GcsBucket>> {
        let url = format!("{}/b", STORAGE_API_BASE);
        let auth = self.auth_header().await?;
        let max_results = max_results.to_string();

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[
                ("project", self.project_id.as_str()),
                ("maxResults", max_results.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to list buckets: {}", e)))?;

        let page: ListResponse<GcsBucket> = handle_response(response).await?;
        Ok(page.items)
    }
}

#[async_trait]
impl ObjectClient for GcsClient {
    fn name(&self) -> &str {
        "gcs"
    }

    async fn verify(&self) -> Result<()> {
        self.list_bucket_page(1).await.map(|_| ())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketEntry>> {
        let buckets = self.list_bucket_page(SINGLE_PAGE_LIMIT).await?;

        Ok(buckets
            .into_iter()
            .map(|bucket| BucketEntry {
                handle: PlatformHandle::Gcp {
                    bucket: bucket.name.clone(),
                    object: None,
                    generation: None,
                    self_link: bucket.self_link,
                },
                region: bucket.location,
                created: bucket.time_created,
                name: bucket.name,
            })
            .collect())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let url = format!("{}/b", STORAGE_API_BASE);
        let auth = self.auth_header().await?;

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("project", self.project_id.as_str())])
            .json(&serde_json::json!({ "name": bucket }))
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to create bucket: {}", e)))?;

        let _: GcsBucket = handle_response(response).await?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let url = format!("{}/b/{}", STORAGE_API_BASE, bucket);
        let auth = self.auth_header().await?;

        let response = self
            .http
            .delete(&url)
            .header(header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to delete bucket: {}", e)))?;

        handle_empty(response).await
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectEntry>> {
        let url = format!("{}/b/{}/o", STORAGE_API_BASE, bucket);
        let auth = self.auth_header().await?;
        let max_results = SINGLE_PAGE_LIMIT.to_string();

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("maxResults", max_results.as_str())])
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to list objects: {}", e)))?;

        let page: ListResponse<GcsObject> = handle_response(response).await?;
        Ok(page
            .items
            .into_iter()
            .map(|object| ObjectEntry {
                size: object.size_bytes(),
                handle: PlatformHandle::Gcp {
                    bucket: object.bucket,
                    object: Some(object.name.clone()),
                    generation: object.generation,
                    self_link: object.self_link,
                },
                key: object.name,
                content_type: object.content_type,
                created: object.time_created,
                etag: object.etag,
            })
            .collect())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let url = format!("{}/b/{}/o", STORAGE_UPLOAD_BASE, bucket);
        let auth = self.auth_header().await?;

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .query(&[("uploadType", "media"), ("name", key)])
            .body(data)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to upload object: {}", e)))?;

        let _: GcsObject = handle_response(response).await?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = Self::object_url(bucket, key);
        let auth = self.auth_header().await?;

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to download object: {}", e)))?;

        let response = check_status(response).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::Transport(format!("Failed to read download response: {}", e)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let url = Self::object_url(bucket, key);
        let auth = self.auth_header().await?;

        let response = self
            .http
            .delete(&url)
            .header(header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to delete object: {}", e)))?;

        handle_empty(response).await
    }
}

/// Handle API response, deserializing the body on success.
async fn handle_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    check_status(response)
        .await?
        .json()
        .await
        .map_err(|e| Error::Transport(format!("Failed to parse response: {}", e)))
}

async fn handle_empty(response: reqwest::Response) -> Result<()> {
    check_status(response).await.map(|_| ())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

/// Classify a failed API status into the storage error taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> Error {
    let detail = format!("{} - {}", status, api_message(body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication(detail),
        StatusCode::NOT_FOUND => Error::NotFound(detail),
        StatusCode::CONFLICT if body.contains("not empty") => Error::Platform(detail),
        StatusCode::CONFLICT => Error::AlreadyExists(detail),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => Error::Transport(detail),
        _ => Error::Platform(detail),
    }
}

/// Error message from a JSON API error body, or the body itself.
fn api_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ApiError,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}
