//! Document handles.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AutosaveError, Result};

/// Opaque identifier of the remote document a coordinator persists to.
///
/// Handles are validated on construction so they can double as file names
/// in [`FileStore`](crate::FileStore).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DocumentHandle(String);

impl DocumentHandle {
    /// Create a handle, rejecting ids that cannot name a stored document.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let invalid = |reason| AutosaveError::InvalidHandle {
            handle: id.clone(),
            reason,
        };

        if id.trim().is_empty() {
            return Err(invalid("id is empty"));
        }
        if id.contains(['/', '\\']) {
            return Err(invalid("id contains a path separator"));
        }
        if id == "." || id == ".." {
            return Err(invalid("id is a relative path component"));
        }
        if id.chars().any(char::is_control) {
            return Err(invalid("id contains control characters"));
        }

        Ok(Self(id))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for DocumentHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_uuid_like_ids() {
        let handle = DocumentHandle::new("4f1c2a9e-8d7b-4b7e-9c53-2f0e6d1a7b10").unwrap();
        assert_eq!(handle.as_str(), "4f1c2a9e-8d7b-4b7e-9c53-2f0e6d1a7b10");
        assert_eq!(handle.to_string(), handle.as_str());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            DocumentHandle::new("   "),
            Err(AutosaveError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_rejects_path_like_ids() {
        assert!(DocumentHandle::new("../etc/passwd").is_err());
        assert!(DocumentHandle::new("a\\b").is_err());
        assert!(DocumentHandle::new("..").is_err());
        assert!(DocumentHandle::new("doc\n1").is_err());
    }
}
