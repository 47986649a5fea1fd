//! Persistence backends.
//!
//! This module handles:
//! - The [`DocumentStore`] contract the coordinator saves through
//! - An in-memory store with a request log and failure injection
//! - A file store with atomic writes and monotonic revisions

mod file;
mod hash;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::handle::DocumentHandle;

pub use file::{FILE_FORMAT_VERSION, FILE_MAGIC, FileStore, StoredDocument};
pub use hash::content_digest;
pub use memory::{MemoryStore, SaveRequest};

/// Persistence API used by the coordinator.
///
/// Implementations must tolerate repeated calls with the same or newer
/// content, and must order concurrent saves for the same handle themselves.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save(&self, handle: &DocumentHandle, content: Vec<u8>) -> Result<SaveReceipt>;
}

/// Acknowledgement of a persisted document state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub handle: DocumentHandle,
    /// Monotonic per handle, starting at 1.
    pub revision: u64,
    /// SHA-256 of the persisted content, hex encoded.
    pub digest: String,
    pub bytes: usize,
    pub saved_at: DateTime<Utc>,
}

impl SaveReceipt {
    pub(crate) fn new(handle: DocumentHandle, revision: u64, content: &[u8]) -> Self {
        Self {
            handle,
            revision,
            digest: content_digest(content),
            bytes: content.len(),
            saved_at: Utc::now(),
        }
    }

    /// First 12 hex characters of the digest, for display.
    pub fn short_digest(&self) -> &str {
        &self.digest[..self.digest.len().min(12)]
    }
}
