//! Debounced, event-driven autosave for collaboratively edited documents.
//!
//! A coordinator watches a shared document replica for edits made by this
//! client, and persists them through a [`DocumentStore`] on a recurring
//! timer, when the host is about to navigate away or unload, and when the
//! view is torn down. Edits merged in from remote collaborators never
//! trigger a save.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docs_autosave::{AutosaveCoordinator, DocumentHandle, HostSignals, MemoryDocument, MemoryStore};
//!
//! let document = Arc::new(MemoryDocument::new(""));
//! let signals = HostSignals::new();
//! let coordinator = AutosaveCoordinator::builder(
//!     DocumentHandle::new("doc-42")?,
//!     Arc::clone(&document),
//!     Arc::new(MemoryStore::new()),
//! )
//! .signals(&signals)
//! .spawn()?;
//!
//! document.edit_local(|text| text.push_str("Hello"));
//! signals.navigate("/home"); // saves immediately
//! coordinator.shutdown().await?;
//! ```
//!
//! # Architecture
//!
//! The crate is organized into:
//!
//! - `autosave/` - Dirty tracking, configuration and the coordinator loop
//! - `document.rs` - Shared document contract and an in-memory replica
//! - `signals.rs` - Host navigation/unload signals
//! - `store/` - Persistence contract, memory and file stores
//! - `throttle.rs` - Per-document throttling of post-save work
//! - `error.rs` - Error types with user-friendly messages

mod autosave;
mod document;
mod error;
mod handle;
mod signals;
mod store;
mod throttle;

// Re-export main types
pub use autosave::{
    AutoSaveConfig, AutosaveCoordinator, AutosaveStatus, CoordinatorBuilder, DirtyTracker,
    RetryPolicy, SaveEvent, TeardownReport, Trigger,
};
pub use document::{DocumentUpdate, MemoryDocument, SharedDocument, UpdateOrigin};
pub use error::{AutosaveError, Result};
pub use handle::DocumentHandle;
pub use signals::{HostSignal, HostSignals, SignalSource};
pub use store::{
    DocumentStore, FILE_FORMAT_VERSION, FILE_MAGIC, FileStore, MemoryStore, SaveReceipt,
    SaveRequest, StoredDocument, content_digest,
};
pub use throttle::{SaveHook, Throttle, ThrottledHook};
