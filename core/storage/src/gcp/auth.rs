//! Service-account authentication and token management for Cloud Storage.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;

use polycloud_common::{Error, Result, SecretString};

/// OAuth2 token endpoint used when the key file does not name one.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Grant type for the JWT bearer flow.
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Cloud Storage OAuth2 scope.
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.full_control";
/// Lifetime requested for each assertion (the maximum Google accepts).
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Service-account key file as downloaded from the Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(deserialize_with = "deserialize_secret")]
    pub private_key: SecretString,
    pub client_email: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::new)
}

impl ServiceAccountKey {
    /// Read a key file.
    ///
    /// # Errors
    /// - `NotFound` when the file does not exist
    /// - `Authentication` when it is not a service-account key
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("Credentials file not found: {}", path.display()))
            }
            _ => Error::Io(format!("Failed to read {}: {}", path.display(), e)),
        })?;
        Self::parse(&raw)
    }

    /// Parse key file contents.
    pub fn parse(raw: &str) -> Result<Self> {
        let key: Self = serde_json::from_str(raw)
            .map_err(|e| Error::Authentication(format!("Invalid service account key: {}", e)))?;
        match key.key_type.as_deref() {
            None | Some("service_account") => Ok(key),
            Some(other) => Err(Error::Authentication(format!(
                "Credentials of type '{}' are not a service account key",
                other
            ))),
        }
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URL)
    }
}

/// Claims of the signed assertion exchanged for an access token.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Sign a JWT bearer assertion for `key`.
///
/// # Errors
/// - `Authentication` when the private key cannot be used for RS256
pub fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String> {
    let claims = Claims {
        iss: key.client_email.clone(),
        scope: STORAGE_SCOPE.to_string(),
        aud: key.token_uri().to_string(),
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.expose().as_bytes())
        .map_err(|e| Error::Authentication(format!("Invalid private key: {}", e)))?;

    jsonwebtoken::encode(&header, &claims, &encoding_key)
        .map_err(|e| Error::Authentication(format!("Failed to sign assertion: {}", e)))
}

/// Access token with expiration tracking.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Check if the token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        // Consider expired if less than 5 minutes remaining
        self.expires_at < Utc::now() + Duration::minutes(5)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Token manager that fetches a new access token when the current one expires.
pub struct TokenManager {
    key: ServiceAccountKey,
    http: Client,
    token: tokio::sync::RwLock<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(key: ServiceAccountKey, http: Client) -> Self {
        Self {
            key,
            http,
            token: tokio::sync::RwLock::new(None),
        }
    }

    /// Project named in the key file.
    pub fn project_id(&self) -> Option<&str> {
        self.key.project_id.as_deref()
    }

    /// Get a valid access token, fetching a new one if necessary.
    ///
    /// # Errors
    /// - `Authentication` when the token endpoint rejects the assertion
    /// - `Transport` when the token endpoint cannot be reached
    pub async fn get_access_token(&self) -> Result<String> {
        let token = self.token.read().await;

        if let Some(current) = token.as_ref().filter(|t| !t.is_expired()) {
            return Ok(current.token.expose().to_string());
        }

        drop(token);

        let mut token = self.token.write().await;

        // Double-check after acquiring write lock
        if let Some(current) = token.as_ref().filter(|t| !t.is_expired()) {
            return Ok(current.token.expose().to_string());
        }

        tracing::info!("Requesting access token for {}", self.key.client_email);

        let fresh = self.request_token().await?;
        let value = fresh.token.expose().to_string();
        *token = Some(fresh);

        Ok(value)
    }

    async fn request_token(&self) -> Result<AccessToken> {
        let now = Utc::now();
        let assertion = sign_assertion(&self.key, now)?;

        let response = self
            .http
            .post(self.key.token_uri())
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to reach token endpoint: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authentication(format!(
                "Token request rejected: {} - {}",
                status, body
            )));
        }
        if !status.is_success() {
            return Err(Error::Transport(format!("Token endpoint returned {}", status)));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("Failed to parse token response: {}", e)))?;

        Ok(AccessToken {
            token: SecretString::new(parsed.access_token),
            expires_at: now
                + Duration::seconds(parsed.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS)),
        })
    }
}
