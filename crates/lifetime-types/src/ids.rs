//! Identifiers for heap objects, scope frames, allocation sites and reference owners.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical trace time. Events are replayed in non-decreasing order.
pub type Timestamp = u64;

/// Identity of a heap object as assigned by the instrumentation.
///
/// Ids are unique among live objects; an id may be reused once the previous
/// object carrying it has become unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a scope frame (e.g. one function activation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocation site: a static location in the instrumented program.
///
/// Sites are opaque tokens (typically `file:line:column`); the analysis only
/// compares and groups them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub String);

impl SiteId {
    pub fn new(site: impl Into<String>) -> Self {
        Self(site.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One lifetime of an object id: the id plus the time it was allocated.
///
/// Record channels key every row by incarnation so that a later pass can join
/// them without depending on record order, even when ids are reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Incarnation {
    pub object: ObjectId,
    pub created: Timestamp,
}

impl Incarnation {
    pub fn new(object: ObjectId, created: Timestamp) -> Self {
        Self { object, created }
    }
}

/// Source of a reference edge: a root or a heap object.
///
/// The derived ordering (global, module, frames by id, objects by id) is the
/// deterministic tie-break used wherever owners compete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// The fixed global frame.
    Global,
    /// The synthetic module frame (only when module scope is modeled).
    Module,
    /// An active scope frame.
    Frame(FrameId),
    /// A heap object.
    Object(ObjectId),
}

impl Owner {
    /// Roots are every owner except heap objects.
    pub fn is_root(&self) -> bool {
        !matches!(self, Owner::Object(_))
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Global => f.write_str("global"),
            Owner::Module => f.write_str("module"),
            Owner::Frame(frame) => write!(f, "frame:{}", frame),
            Owner::Object(object) => write!(f, "#{}", object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_ordering_puts_roots_first() {
        let mut owners = vec![
            Owner::Object(ObjectId(1)),
            Owner::Frame(FrameId(9)),
            Owner::Global,
            Owner::Frame(FrameId(2)),
            Owner::Module,
        ];
        owners.sort();
        assert_eq!(
            owners,
            vec![
                Owner::Global,
                Owner::Module,
                Owner::Frame(FrameId(2)),
                Owner::Frame(FrameId(9)),
                Owner::Object(ObjectId(1)),
            ]
        );
        assert!(owners[..4].iter().all(Owner::is_root));
        assert!(!owners[4].is_root());
    }

    #[test]
    fn test_owner_display() {
        assert_eq!(Owner::Global.to_string(), "global");
        assert_eq!(Owner::Frame(FrameId(3)).to_string(), "frame:3");
        assert_eq!(Owner::Object(ObjectId(42)).to_string(), "#42");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&ObjectId(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&SiteId::new("a.js:1:2")).unwrap(),
            "\"a.js:1:2\""
        );
    }
}
