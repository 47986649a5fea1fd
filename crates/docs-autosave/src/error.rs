//! Autosave error types.
//!
//! All fallible operations return structured errors that provide
//! user-friendly messages and optional remediation hints.

use std::path::PathBuf;
use thiserror::Error;

/// Autosave operation error.
#[derive(Debug, Error)]
pub enum AutosaveError {
    /// The document handle cannot name a persisted document.
    #[error("Invalid document handle {handle:?}: {reason}")]
    InvalidHandle { handle: String, reason: &'static str },

    /// File I/O error.
    #[error("Failed to {operation} file: {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Atomic write failed (temp file couldn't be renamed).
    #[error("Failed to complete save operation")]
    AtomicWriteFailed {
        temp_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored file is not a document file.
    #[error("Invalid document file format")]
    InvalidFormat { path: PathBuf, reason: String },

    /// Stored file was written by a newer format version.
    #[error("Document file version {found} is not supported (maximum: {max_supported})")]
    UnsupportedVersion {
        found: u32,
        max_supported: u32,
        path: PathBuf,
    },

    /// No document has been persisted under this handle.
    #[error("Document not found: {handle}")]
    NotFound { handle: String },

    /// The shared document could not produce a persistable state.
    #[error("Failed to encode document state")]
    Encode {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The persistence backend rejected or failed the request.
    #[error("Save request failed: {message}")]
    Remote { message: String },

    /// Configuration file could not be read or parsed.
    #[error("Invalid autosave configuration: {path}")]
    Config {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration values the coordinator cannot run with.
    #[error("Invalid autosave configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The coordinator's event loop has already shut down.
    #[error("Autosave coordinator is closed")]
    Closed,
}

impl AutosaveError {
    /// Get a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidHandle { handle, reason } => {
                format!("'{handle}' cannot be used as a document id: {reason}")
            }
            Self::Io {
                operation, path, ..
            } => {
                format!("Could not {} the file at {}", operation, path.display())
            }
            Self::AtomicWriteFailed { target_path, .. } => {
                format!(
                    "Could not save the document to {}. Please check disk space and permissions.",
                    target_path.display()
                )
            }
            Self::InvalidFormat { path, reason } => {
                format!(
                    "The file at {} is not a valid document file: {}",
                    path.display(),
                    reason
                )
            }
            Self::UnsupportedVersion {
                found,
                max_supported,
                ..
            } => {
                format!(
                    "This document was saved by a newer version (file version {found}, \
                    this version supports up to {max_supported})."
                )
            }
            Self::NotFound { handle } => {
                format!("No saved copy of document '{handle}' exists yet.")
            }
            Self::Encode { .. } => "The document content could not be prepared for saving.".into(),
            Self::Remote { message } => format!("Your latest changes were not saved: {message}"),
            Self::Config { path, .. } => {
                format!("The autosave settings in {} could not be read.", path.display())
            }
            Self::InvalidConfig { reason } => format!("The autosave settings are invalid: {reason}"),
            Self::Closed => "Autosave has already stopped for this document.".into(),
        }
    }

    /// Get a suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::InvalidHandle { .. } => {
                Some("Use a non-empty id without path separators.".into())
            }
            Self::Io { operation, .. } => {
                if *operation == "read" {
                    Some("Check that the file exists and you have permission to read it.".into())
                } else {
                    Some("Check that you have permission to write to this location.".into())
                }
            }
            Self::AtomicWriteFailed { .. } => {
                Some("Free up disk space or choose a different store directory.".into())
            }
            Self::InvalidFormat { .. } | Self::UnsupportedVersion { .. } => {
                Some("Make sure the store directory only contains document files.".into())
            }
            Self::NotFound { .. } => None,
            Self::Encode { .. } => None,
            Self::Remote { .. } => {
                Some("Keep editing; the next change will trigger another save.".into())
            }
            Self::Config { .. } | Self::InvalidConfig { .. } => {
                Some("Fix the file or remove it to use defaults.".into())
            }
            Self::Closed => None,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. } | Self::Io { .. } | Self::AtomicWriteFailed { .. }
        )
    }
}

/// Result type alias for autosave operations.
pub type Result<T> = std::result::Result<T, AutosaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_is_transient() {
        let err = AutosaveError::Remote {
            message: "502 Bad Gateway".into(),
        };
        assert!(err.is_transient());
        assert!(err.user_message().contains("502 Bad Gateway"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_closed_is_not_transient() {
        assert!(!AutosaveError::Closed.is_transient());
        assert!(AutosaveError::Closed.suggestion().is_none());
    }
}
