//! Common error types for PolyCloud.

use thiserror::Error;

/// Top-level error type for storage operations.
///
/// The type is `Clone` so a failure can be kept in a storage client's
/// last-error slot and handed back to the caller at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Credentials were rejected or could not be resolved.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Referenced folder or object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network or platform unavailability.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Folder delete removed some objects and then failed.
    #[error("Partial delete of folder '{folder}' ({deleted} object(s) removed): {reason}")]
    PartialDelete {
        /// Folder being deleted.
        folder: String,
        /// Objects removed before the failure.
        deleted: usize,
        /// Underlying failure.
        reason: String,
    },

    /// The platform or account cannot perform the request.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// An operation was issued before the client was opened.
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Local I/O operation failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Any other failure reported by the platform.
    #[error("Platform error: {0}")]
    Platform(String),
}

impl Error {
    /// Short, stable name of the error category.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Authentication(_) => "authentication",
            Error::NotFound(_) => "not-found",
            Error::Transport(_) => "transport",
            Error::PartialDelete { .. } => "partial-delete",
            Error::Unsupported(_) => "unsupported",
            Error::NotConnected(_) => "not-connected",
            Error::AlreadyExists(_) => "already-exists",
            Error::InvalidInput(_) => "invalid-input",
            Error::Io(_) => "io",
            Error::Platform(_) => "platform",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(err.to_string()),
            _ => Error::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidInput(format!("Malformed JSON: {}", err))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "missing.txt").into();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_other_io_errors_map_to_io() {
        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.category(), "io");
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_partial_delete_display() {
        let err = Error::PartialDelete {
            folder: "photos".to_string(),
            deleted: 3,
            reason: "container is locked".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Partial delete of folder 'photos' (3 object(s) removed): container is locked"
        );
    }

    #[test]
    fn test_errors_clone_equal() {
        let err = Error::Authentication("bad key".to_string());
        assert_eq!(err.clone(), err);
    }
}
