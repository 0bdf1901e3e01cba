//! Local filesystem side of uploads and downloads.
//!
//! Remote object names are derived from local paths by keeping the final
//! segment only; both `/` and `\` count as separators regardless of the host
//! platform, so paths written on Windows behave the same everywhere.

use std::path::{Path, PathBuf};
use tokio::fs;

use polycloud_common::{Error, Result};

const SEPARATORS: [char; 2] = ['/', '\\'];

/// Remote object name for a local file: the path with directories stripped.
///
/// # Errors
/// - The path ends in a separator or is empty
pub fn object_name(local_path: &Path) -> Result<String> {
    let raw = local_path.to_string_lossy();
    let name = match raw.rfind(SEPARATORS) {
        Some(pos) => &raw[pos + 1..],
        None => &raw[..],
    };
    if name.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Cannot derive an object name from '{}'",
            raw
        )));
    }
    Ok(name.to_string())
}

/// Local target file for downloading `object` to `output`.
///
/// The trailing segment of `output` is dropped to get a directory and the
/// object's base name is written there. An `output` without any separator is
/// used as the target file itself.
pub fn download_target(output: &Path, object: &str) -> PathBuf {
    let raw = output.to_string_lossy();
    match raw.rfind(SEPARATORS) {
        Some(pos) => {
            let base = object.rsplit(SEPARATORS).next().unwrap_or(object);
            let dir = &raw[..pos];
            if dir.is_empty() {
                // "/name" keeps the root directory
                PathBuf::from(&raw[..=pos]).join(base)
            } else {
                PathBuf::from(dir).join(base)
            }
        }
        None => output.to_path_buf(),
    }
}

/// Read a local file for upload.
pub async fn read_upload(local_path: &Path) -> Result<Vec<u8>> {
    fs::read(local_path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            Error::NotFound(format!("Local file not found: {}", local_path.display()))
        }
        _ => Error::Io(format!("Failed to read {}: {}", local_path.display(), e)),
    })
}

/// Write downloaded bytes, creating the target directory when missing.
pub async fn write_download(target: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(target, data)
        .await
        .map_err(|e| Error::Io(format!("Failed to write {}: {}", target.display(), e)))
}
