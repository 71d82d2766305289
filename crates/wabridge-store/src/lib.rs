//! # wabridge-store
//!
//! Append-only on-disk artifacts: the daily JSON-lines event log and the
//! per-message archive.

pub mod archive;
pub mod event_log;

pub use archive::MessageArchive;
pub use event_log::{EventKind, EventLogger, LogEntry};
