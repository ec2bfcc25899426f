use thiserror::Error;

use lifetime_types::{FrameId, ObjectId, Owner, Timestamp};

/// Malformed events detected while applying a trace to the heap graph.
///
/// Each of these means the trace is corrupt; the engine never attempts to
/// repair the graph because every later timestamp would be suspect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("t={time}: object {object} was never allocated")]
    UnknownObject { object: ObjectId, time: Timestamp },

    #[error("t={time}: object {object} allocated while an object with that id is still live")]
    DuplicateAllocation { object: ObjectId, time: Timestamp },

    #[error("t={time}: object {object} reallocated at the creation time of its previous incarnation")]
    AmbiguousIncarnation { object: ObjectId, time: Timestamp },

    #[error("t={time}: {owner} is not an active root")]
    InactiveRoot { owner: Owner, time: Timestamp },

    #[error("t={time}: frame {frame} entered while already active")]
    FrameAlreadyActive { frame: FrameId, time: Timestamp },

    #[error("t={time}: exit of frame {frame} but the innermost active frame is {innermost}")]
    ScopeMismatch {
        frame: FrameId,
        innermost: FrameId,
        time: Timestamp,
    },
}
