//! Remote folders and files as seen through the storage contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use polycloud_common::{Error, Platform, Result};

/// Platform listings are capped at a single page of this many items.
pub const SINGLE_PAGE_LIMIT: usize = 1000;

/// Backend-native reference carried by an entity.
///
/// Only the backend that produced a handle can interpret it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PlatformHandle {
    /// Entity created by name, or by a client without native handles.
    #[default]
    None,
    /// S3 bucket or object.
    Aws {
        bucket: String,
        key: Option<String>,
        region: Option<String>,
        storage_class: Option<String>,
    },
    /// Azure container or blob.
    Azure {
        container: String,
        blob: Option<String>,
        url: Option<String>,
    },
    /// Cloud Storage bucket or object.
    Gcp {
        bucket: String,
        object: Option<String>,
        generation: Option<String>,
        self_link: Option<String>,
    },
}

impl PlatformHandle {
    /// Platform that produced this handle, if any.
    pub fn platform(&self) -> Option<Platform> {
        match self {
            PlatformHandle::None => None,
            PlatformHandle::Aws { .. } => Some(Platform::Aws),
            PlatformHandle::Azure { .. } => Some(Platform::Azure),
            PlatformHandle::Gcp { .. } => Some(Platform::Gcp),
        }
    }

    /// Bucket/container named by the handle.
    pub fn container(&self) -> Option<&str> {
        match self {
            PlatformHandle::None => None,
            PlatformHandle::Aws { bucket, .. } => Some(bucket),
            PlatformHandle::Azure { container, .. } => Some(container),
            PlatformHandle::Gcp { bucket, .. } => Some(bucket),
        }
    }
}

/// A remote object (S3/GCS object, Azure blob).
///
/// Snapshot taken at listing time; it never changes afterwards and dropping
/// it has no remote effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudFile {
    name: String,
    size: u64,
    content_type: Option<String>,
    created: Option<DateTime<Utc>>,
    etag: Option<String>,
    #[serde(default)]
    handle: PlatformHandle,
    folder: Option<String>,
}

impl CloudFile {
    /// Reference a remote object by name, without listing it.
    ///
    /// # Errors
    /// - Name is empty
    pub fn new(folder: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidInput("File name cannot be empty".to_string()));
        }
        Ok(Self {
            name,
            size: 0,
            content_type: None,
            created: None,
            etag: None,
            handle: PlatformHandle::None,
            folder: Some(folder.into()),
        })
    }

    pub(crate) fn listed(
        folder: &str,
        name: String,
        size: u64,
        content_type: Option<String>,
        created: Option<DateTime<Utc>>,
        etag: Option<String>,
        handle: PlatformHandle,
    ) -> Self {
        Self {
            name,
            size,
            content_type,
            created,
            etag,
            handle,
            folder: Some(folder.to_string()),
        }
    }

    /// Object name; may contain a `/`-separated prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last segment of the object name.
    pub fn base_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Size in bytes; zero unless the file came from a listing.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Creation (or last-modified, where the platform only reports that) time.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn handle(&self) -> &PlatformHandle {
        &self.handle
    }

    /// Name of the folder holding this file.
    pub fn folder(&self) -> Option<&str> {
        self.folder.as_deref()
    }
}

/// A remote container (S3/GCS bucket, Azure container).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudFolder {
    name: String,
    items_loaded: bool,
    items: Vec<CloudFile>,
    #[serde(default)]
    handle: PlatformHandle,
    account: Option<String>,
}

impl CloudFolder {
    /// Reference a folder by name, e.g. one that is about to be created.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items_loaded: false,
            items: Vec::new(),
            handle: PlatformHandle::None,
            account: None,
        }
    }

    pub(crate) fn listed(name: String, account: Option<&str>, handle: PlatformHandle) -> Self {
        Self {
            name,
            items_loaded: false,
            items: Vec::new(),
            handle,
            account: account.map(str::to_string),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the item list reflects a successful listing.
    pub fn items_loaded(&self) -> bool {
        self.items_loaded
    }

    /// Items from the last listing; `None` while the folder is unlisted.
    pub fn items(&self) -> Option<&[CloudFile]> {
        if self.items_loaded {
            Some(&self.items)
        } else {
            None
        }
    }

    /// Replace the item list wholesale and mark it loaded.
    pub fn replace_items(&mut self, items: Vec<CloudFile>) {
        self.items = items;
        self.items_loaded = true;
    }

    /// Forget the item list; it becomes unknown again.
    pub fn unload(&mut self) {
        self.items.clear();
        self.items_loaded = false;
    }

    pub fn handle(&self) -> &PlatformHandle {
        &self.handle
    }

    /// Name of the account this folder was listed from.
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Item count for display: empty when unlisted, `(1000+)` at the page cap.
    pub fn item_count_label(&self) -> String {
        if !self.items_loaded {
            String::new()
        } else if self.items.len() >= SINGLE_PAGE_LIMIT {
            format!("({}+)", SINGLE_PAGE_LIMIT)
        } else {
            format!("({})", self.items.len())
        }
    }
}
