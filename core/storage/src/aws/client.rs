//! S3 client over the AWS SDK.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime as SmithyDateTime};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use chrono::{DateTime, Utc};
use tracing::debug;

use polycloud_common::{Error, Result};

use super::provider::AwsCredentials;
use crate::entity::{PlatformHandle, SINGLE_PAGE_LIMIT};
use crate::provider::{BucketEntry, ObjectClient, ObjectEntry};

/// Region S3 reports as an empty location constraint.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Provider name attached to explicit key credentials.
const CREDENTIALS_PROVIDER: &str = "polycloud";

/// S3 API client bound to one region (or one custom endpoint).
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    region: String,
    custom_endpoint: bool,
}

impl S3Client {
    /// Build a client from credentials.
    ///
    /// Without an access key the SDK's default credential chain (environment,
    /// profile, instance metadata) is used.
    ///
    /// # Errors
    /// - `Authentication` when an access key is given without a secret key
    pub async fn connect(credentials: &AwsCredentials) -> Result<Self> {
        let region = credentials.region();
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.clone()));

        if let Some(access_key) = credentials.access_key() {
            let secret = credentials.secret_key().ok_or_else(|| {
                Error::Authentication(format!("No secret key given for access key {}", access_key))
            })?;
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret.expose(),
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        } else {
            debug!("No access key configured; using the default AWS credential chain");
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        let custom_endpoint = match credentials.endpoint_url() {
            Some(url) => {
                builder = builder.endpoint_url(url).force_path_style(true);
                true
            }
            None => false,
        };

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(builder.build()),
            region,
            custom_endpoint,
        })
    }

    /// Resolve a bucket's region with `GetBucketLocation`.
    ///
    /// Returns `None` when the bucket was deleted after it was listed.
    ///
    /// # Errors
    /// - Any other lookup failure, classified like every S3 call
    async fn bucket_region(&self, bucket: &str) -> Result<Option<String>> {
        match self.inner.get_bucket_location().bucket(bucket).send().await {
            Ok(output) => Ok(Some(normalize_location(
                output.location_constraint().map(|c| c.as_str()),
            ))),
            Err(err) => {
                let context = format!("Failed to resolve location of bucket {}", bucket);
                match classify(&context, err) {
                    Error::NotFound(detail) => {
                        debug!("Skipping vanished bucket: {}", detail);
                        Ok(None)
                    }
                    other => Err(other),
                }
            }
        }
    }
}

#[async_trait]
impl ObjectClient for S3Client {
    fn name(&self) -> &str {
        "s3"
    }

    async fn verify(&self) -> Result<()> {
        self.inner
            .list_buckets()
            .max_buckets(1)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("Failed to verify credentials", e))
    }

    async fn list_buckets(&self) -> Result<Vec<BucketEntry>> {
        let output = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify("Failed to list buckets", e))?;

        let mut entries = Vec::new();
        for bucket in output.buckets() {
            let Some(name) = bucket.name() else {
                continue;
            };
            let region = match bucket.bucket_region() {
                Some(region) => normalize_location(Some(region)),
                None => match self.bucket_region(name).await? {
                    Some(region) => region,
                    None => continue,
                },
            };
            entries.push(BucketEntry {
                name: name.to_string(),
                created: bucket.creation_date().and_then(to_chrono),
                handle: PlatformHandle::Aws {
                    bucket: name.to_string(),
                    key: None,
                    region: Some(region.clone()),
                    storage_class: None,
                },
                region: Some(region),
            });
        }
        Ok(entries)
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut request = self.inner.create_bucket().bucket(bucket);
        if !self.custom_endpoint && self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify(&format!("Failed to create bucket {}", bucket), e))
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.inner
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify(&format!("Failed to delete bucket {}", bucket), e))
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectEntry>> {
        let output = self
            .inner
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(SINGLE_PAGE_LIMIT as i32)
            .send()
            .await
            .map_err(|e| classify(&format!("Failed to list objects in {}", bucket), e))?;

        Ok(output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(ObjectEntry {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    content_type: None,
                    created: object.last_modified().and_then(to_chrono),
                    etag: object.e_tag().map(|tag| tag.trim_matches('"').to_string()),
                    handle: PlatformHandle::Aws {
                        bucket: bucket.to_string(),
                        key: Some(key.to_string()),
                        region: Some(self.region.clone()),
                        storage_class: object.storage_class().map(|c| c.as_str().to_string()),
                    },
                })
            })
            .collect())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("application/octet-stream")
            .body(ByteStream::from(data))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify(&format!("Failed to upload {}/{}", bucket, key), e))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let output = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(&format!("Failed to download {}/{}", bucket, key), e))?;

        let body = output.body.collect().await.map_err(|e| {
            Error::Transport(format!("Failed to read {}/{}: {}", bucket, key, e))
        })?;
        Ok(body.into_bytes().to_vec())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify(&format!("Failed to delete {}/{}", bucket, key), e))
    }
}

/// Map a bucket location constraint to a region name.
///
/// S3 reports `us-east-1` as an empty constraint and the legacy `EU` value
/// for `eu-west-1`.
pub fn normalize_location(constraint: Option<&str>) -> String {
    match constraint {
        None | Some("") => DEFAULT_REGION.to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

fn to_chrono(time: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

/// Classify an SDK failure into the storage error taxonomy.
pub(crate) fn classify<E>(context: &str, err: SdkError<E, HttpResponse>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let detail = format!("{}: {}", context, DisplayErrorContext(&err));
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
            Error::Transport(detail)
        }
        SdkError::ServiceError(service) => classify_code(
            err.code(),
            Some(service.raw().status().as_u16()),
            detail,
        ),
        _ => Error::Platform(detail),
    }
}

/// Classify by S3 error code, falling back to the HTTP status.
pub(crate) fn classify_code(code: Option<&str>, status: Option<u16>, detail: String) -> Error {
    match code {
        Some(
            "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "AccessDenied" | "ExpiredToken"
            | "InvalidToken" | "TokenRefreshRequired",
        ) => Error::Authentication(detail),
        Some("NoSuchBucket" | "NoSuchKey" | "NotFound") => Error::NotFound(detail),
        Some("BucketAlreadyExists" | "BucketAlreadyOwnedByYou") => Error::AlreadyExists(detail),
        Some("BucketNotEmpty") => Error::Platform(detail),
        Some("SlowDown" | "ServiceUnavailable" | "RequestTimeout") => Error::Transport(detail),
        _ => match status {
            Some(401 | 403) => Error::Authentication(detail),
            Some(404) => Error::NotFound(detail),
            Some(409) => Error::AlreadyExists(detail),
            Some(500..=599) => Error::Transport(detail),
            _ => Error::Platform(detail),
        },
    }
}
