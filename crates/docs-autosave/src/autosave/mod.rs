//! Auto-save functionality for documents.
//!
//! Provides:
//! - `DirtyTracker` - Tracks unsaved local edits and save eligibility
//! - `AutoSaveConfig` - Timer interval, exit flushes and retry settings
//! - `AutosaveCoordinator` - Event loop wiring the tracker to triggers

mod config;
mod coordinator;
mod tracker;

pub use config::{AutoSaveConfig, RetryPolicy};
pub use coordinator::{
    AutosaveCoordinator, AutosaveStatus, CoordinatorBuilder, SaveEvent, TeardownReport, Trigger,
};
pub use tracker::DirtyTracker;
