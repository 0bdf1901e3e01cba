//! Common types used throughout PolyCloud.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Storage platform an account is bound to.
///
/// The set is closed: a platform is picked once when an account is built and
/// never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    /// No platform selected yet; accounts with this tag carry no backend.
    #[serde(rename = "select")]
    Select,
    /// Amazon Web Services S3.
    #[serde(rename = "AWS")]
    Aws,
    /// Microsoft Azure Blob Storage.
    #[serde(rename = "Azure")]
    Azure,
    /// Google Cloud Storage.
    #[serde(rename = "GCP")]
    Gcp,
}

impl Platform {
    /// Display label, also used as the platform tag.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Select => "select",
            Platform::Aws => "AWS",
            Platform::Azure => "Azure",
            Platform::Gcp => "GCP",
        }
    }

    /// Platforms that have a storage backend.
    pub fn backends() -> [Platform; 3] {
        [Platform::Aws, Platform::Azure, Platform::Gcp]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Platform {
    type Err = crate::Error;

    fn from_str(tag: &str) -> crate::Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(Platform::Select),
            "aws" | "s3" => Ok(Platform::Aws),
            "azure" => Ok(Platform::Azure),
            "gcp" | "gcs" => Ok(Platform::Gcp),
            _ => Err(crate::Error::Unsupported(format!(
                "Unknown storage platform '{}'",
                tag
            ))),
        }
    }
}

/// Ordered `key=value` pairs joined by `;`.
///
/// Values run up to the next `;`, so everything after the first `=` of a
/// segment belongs to the value (base64 padding survives). Key lookup is
/// case-insensitive; serialization keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pairs: Vec<(String, String)>,
}

impl ConnectionString {
    /// Create an empty connection string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    /// Parse a serialized connection string.
    ///
    /// # Errors
    /// - A non-empty segment has no `=`
    /// - A segment has an empty key
    pub fn parse(input: &str) -> crate::Result<Self> {
        let mut pairs = Vec::new();
        for segment in input.split(';') {
            if segment.trim().is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                crate::Error::InvalidInput(format!(
                    "Connection string segment '{}' is not key=value",
                    segment
                ))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(crate::Error::InvalidInput(
                    "Connection string key cannot be empty".to_string(),
                ));
            }
            pairs.push((key.to_string(), value.to_string()));
        }
        Ok(Self { pairs })
    }

    /// Look up a value by key, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Look up a value that must be present and non-empty.
    pub fn require(&self, key: &str) -> crate::Result<&str> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(crate::Error::InvalidInput(format!(
                "Connection string is missing '{}'",
                key
            ))),
        }
    }

    /// Look up a value, treating an empty value as absent.
    pub fn optional(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    /// Iterate over pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

impl FromStr for ConnectionString {
    type Err = crate::Error;

    fn from_str(input: &str) -> crate::Result<Self> {
        Self::parse(input)
    }
}

/// Secret text (account keys, secret keys) that zeroizes on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Expose the secret for use in a request or connection string.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED; {} chars])", self.0.len())
    }
}
