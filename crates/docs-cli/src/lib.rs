//! CLI library components for the document autosave replay tool.

pub mod logging;
pub mod script;
pub mod session;
pub mod summary;
