//! Shared types for the lifetime-analysis workspace.
//!
//! This crate provides the vocabulary used by the trace decoder, the heap
//! engine and the record channels, so that none of them depends on another
//! just to name an object or a timestamp.
//!
//! ## Event Types
//!
//! The [`event`] module contains the decoded trace events replayed by the engine:
//! - [`TraceEvent`](event::TraceEvent) - one heap-mutating event with its logical time
//! - [`OwnerRef`](event::OwnerRef) - the owner of a reference write as named in the trace
//!
//! ## Record Types
//!
//! The [`records`] module contains the per-object records exchanged between the
//! staleness pass and the allocation-site pass.

pub mod event;
pub mod ids;
pub mod records;

// Re-export commonly used types at crate root
pub use event::{EventKind, OwnerRef, TraceEvent};
pub use ids::{FrameId, Incarnation, ObjectId, Owner, SiteId, Timestamp};
pub use records::{LastUseRecord, SiteUpdateRecord, StalenessRecord, UnreachableRecord};
