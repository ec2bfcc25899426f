//! Decoded trace events.
//!
//! Every event carries the logical time at which it happened. The
//! [`Display`](std::fmt::Display) implementation renders the canonical trace
//! line, so `event.to_string()` parses back to the same event.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{FrameId, ObjectId, SiteId, Timestamp};

/// Owner of a reference write as it appears in the trace.
///
/// `Innermost` is resolved by the engine against the root stack at the time
/// the write is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerRef {
    /// The innermost active scope (top frame, else module, else global).
    Innermost,
    Global,
    Module,
    Frame(FrameId),
    Object(ObjectId),
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerRef::Innermost => f.write_str("root"),
            OwnerRef::Global => f.write_str("global"),
            OwnerRef::Module => f.write_str("module"),
            OwnerRef::Frame(frame) => write!(f, "frame:{}", frame),
            OwnerRef::Object(object) => write!(f, "{}", object),
        }
    }
}

/// Discriminant of a [`TraceEvent`], used for counting and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Allocate,
    WriteRef,
    Access,
    ScopeEnter,
    ScopeExit,
    UpdateSite,
    Flush,
}

impl EventKind {
    /// Keyword used for this kind in the trace format.
    pub fn keyword(&self) -> &'static str {
        match self {
            EventKind::Allocate => "alloc",
            EventKind::WriteRef => "write",
            EventKind::Access => "access",
            EventKind::ScopeEnter => "enter",
            EventKind::ScopeExit => "exit",
            EventKind::UpdateSite => "site",
            EventKind::Flush => "flush",
        }
    }
}

/// One heap-mutating event from an instrumented run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// A new heap object was created at `site`.
    Allocate {
        object: ObjectId,
        site: SiteId,
        time: Timestamp,
    },
    /// `owner.slot = target`, replacing whatever the slot held before.
    WriteRef {
        owner: OwnerRef,
        slot: String,
        target: Option<ObjectId>,
        time: Timestamp,
    },
    /// A read or use of the object that does not change any reference.
    Access { object: ObjectId, time: Timestamp },
    /// A scope frame became active; its slots act as roots.
    ScopeEnter { frame: FrameId, time: Timestamp },
    /// The innermost scope frame was popped.
    ScopeExit { frame: FrameId, time: Timestamp },
    /// The object is re-attributed to another allocation site.
    UpdateSite {
        object: ObjectId,
        site: SiteId,
        time: Timestamp,
    },
    /// End of a top-level script chunk: releases objects allocated at top level.
    Flush { time: Timestamp },
}

impl TraceEvent {
    pub fn time(&self) -> Timestamp {
        match self {
            TraceEvent::Allocate { time, .. }
            | TraceEvent::WriteRef { time, .. }
            | TraceEvent::Access { time, .. }
            | TraceEvent::ScopeEnter { time, .. }
            | TraceEvent::ScopeExit { time, .. }
            | TraceEvent::UpdateSite { time, .. }
            | TraceEvent::Flush { time } => *time,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            TraceEvent::Allocate { .. } => EventKind::Allocate,
            TraceEvent::WriteRef { .. } => EventKind::WriteRef,
            TraceEvent::Access { .. } => EventKind::Access,
            TraceEvent::ScopeEnter { .. } => EventKind::ScopeEnter,
            TraceEvent::ScopeExit { .. } => EventKind::ScopeExit,
            TraceEvent::UpdateSite { .. } => EventKind::UpdateSite,
            TraceEvent::Flush { .. } => EventKind::Flush,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = self.kind().keyword();
        match self {
            TraceEvent::Allocate { object, site, time } => {
                write!(f, "{} {} {} {}", keyword, object, site, time)
            }
            TraceEvent::WriteRef {
                owner,
                slot,
                target,
                time,
            } => match target {
                Some(target) => write!(f, "{} {} {} {} {}", keyword, owner, slot, target, time),
                None => write!(f, "{} {} {} null {}", keyword, owner, slot, time),
            },
            TraceEvent::Access { object, time } => write!(f, "{} {} {}", keyword, object, time),
            TraceEvent::ScopeEnter { frame, time } | TraceEvent::ScopeExit { frame, time } => {
                write!(f, "{} {} {}", keyword, frame, time)
            }
            TraceEvent::UpdateSite { object, site, time } => {
                write!(f, "{} {} {} {}", keyword, object, site, time)
            }
            TraceEvent::Flush { time } => write!(f, "{} {}", keyword, time),
        }
    }
}
