//! Heap event trace decoding.
//!
//! This crate provides:
//! - `TraceFile`: a buffered, replayable trace that decodes lazily into [`TraceEvent`]s
//! - `render_pretty`: human-readable rendering of decoded events
//! - `parse_watch_list`: the `objectId,timestamp` watch-list format used for access paths
//!
//! [`TraceEvent`]: lifetime_types::TraceEvent

pub mod decoder;
pub mod error;
pub mod pretty;
pub mod watch;

pub use decoder::{parse_line, TraceEvents, TraceFile};
pub use error::TraceError;
pub use pretty::{pretty_print, render_pretty};
pub use watch::parse_watch_list;
