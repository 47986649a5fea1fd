//! Shared document contract.
//!
//! The coordinator never owns document content. It subscribes to update
//! notifications and asks the document for a persistable encoding when a
//! save is due. Real editors back this with a CRDT replica; [`MemoryDocument`]
//! is a plain-text stand-in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;

use crate::error::Result;

/// Capacity of the update notification channel.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Where a document mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    /// Authored by this client's own editing session.
    Local,
    /// Merged in from a remote collaborator.
    Remote,
}

impl UpdateOrigin {
    #[inline]
    pub fn is_local(self) -> bool {
        matches!(self, Self::Local)
    }
}

/// Notification emitted once per applied mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentUpdate {
    pub origin: UpdateOrigin,
    /// Content length in bytes after the mutation.
    pub len: usize,
}

/// A document replica that other collaborators mutate concurrently.
pub trait SharedDocument: Send + Sync + 'static {
    /// Subscribe to update notifications. Dropping the receiver unsubscribes.
    fn subscribe_updates(&self) -> broadcast::Receiver<DocumentUpdate>;

    /// Number of local mutations applied so far. Never decreases, and is
    /// bumped before the matching update notification is sent.
    ///
    /// Lets a subscriber that missed notifications tell whether any of them
    /// were local.
    fn local_revision(&self) -> u64;

    /// Serialize the current content to its persisted representation.
    fn encode_state(&self) -> Result<Vec<u8>>;
}

/// In-memory text document.
#[derive(Debug)]
pub struct MemoryDocument {
    content: RwLock<String>,
    local_revision: AtomicU64,
    updates: broadcast::Sender<DocumentUpdate>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new("")
    }
}

impl MemoryDocument {
    pub fn new(initial: impl Into<String>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            content: RwLock::new(initial.into()),
            local_revision: AtomicU64::new(0),
            updates,
        }
    }

    /// Apply an edit authored by this client.
    pub fn edit_local(&self, edit: impl FnOnce(&mut String)) {
        self.apply(UpdateOrigin::Local, edit);
    }

    /// Apply an edit received from a remote collaborator.
    pub fn merge_remote(&self, edit: impl FnOnce(&mut String)) {
        self.apply(UpdateOrigin::Remote, edit);
    }

    pub fn content(&self) -> String {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of live update subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }

    fn apply(&self, origin: UpdateOrigin, edit: impl FnOnce(&mut String)) {
        let len = {
            let mut content = self.content.write().unwrap_or_else(PoisonError::into_inner);
            edit(&mut content);
            if origin.is_local() {
                self.local_revision.fetch_add(1, Ordering::SeqCst);
            }
            content.len()
        };
        // No subscribers is fine; nobody is waiting to save.
        let _ = self.updates.send(DocumentUpdate { origin, len });
    }
}

impl SharedDocument for MemoryDocument {
    fn subscribe_updates(&self) -> broadcast::Receiver<DocumentUpdate> {
        self.updates.subscribe()
    }

    fn local_revision(&self) -> u64 {
        self.local_revision.load(Ordering::SeqCst)
    }

    fn encode_state(&self) -> Result<Vec<u8>> {
        Ok(self.content().into_bytes())
    }
}
