//! Root set bookkeeping: the global frame, the optional module frame and the
//! stack of active scope frames.
//!
//! Each root frame owns its slots (edges into the heap) and the list of
//! objects allocated while it was the innermost scope that have not yet been
//! stored anywhere ("anchored" objects). Anchored objects are released when
//! the frame goes away.

use std::collections::BTreeMap;

use lifetime_types::{FrameId, Incarnation, Owner, OwnerRef, Timestamp};

use crate::error::HeapError;
use crate::graph::{Slot, SlotEdge};

/// One root: a set of named slots that are always reachable while active.
#[derive(Debug, Clone)]
pub struct RootFrame {
    owner: Owner,
    entered: Timestamp,
    pub(crate) slots: BTreeMap<Slot, SlotEdge>,
    pub(crate) anchored: Vec<Incarnation>,
}

impl RootFrame {
    fn new(owner: Owner, entered: Timestamp) -> Self {
        Self {
            owner,
            entered,
            slots: BTreeMap::new(),
            anchored: Vec::new(),
        }
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn entered(&self) -> Timestamp {
        self.entered
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// The active root set.
#[derive(Debug, Clone)]
pub struct RootStack {
    global: RootFrame,
    module: Option<RootFrame>,
    frames: Vec<RootFrame>,
    max_depth: usize,
    frames_entered: u64,
}

impl RootStack {
    /// Create the root set. With `module_scope`, top-level code runs inside a
    /// synthetic module frame instead of writing to the global frame directly.
    pub fn new(module_scope: bool) -> Self {
        Self {
            global: RootFrame::new(Owner::Global, 0),
            module: module_scope.then(|| RootFrame::new(Owner::Module, 0)),
            frames: Vec::new(),
            max_depth: 0,
            frames_entered: 0,
        }
    }

    /// Number of active scope frames (global and module excluded).
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn frames_entered(&self) -> u64 {
        self.frames_entered
    }

    pub fn has_module_scope(&self) -> bool {
        self.module.is_some()
    }

    /// The scope that owns top-level code: module when modeled, else global.
    pub fn top_level(&self) -> Owner {
        if self.module.is_some() {
            Owner::Module
        } else {
            Owner::Global
        }
    }

    /// The innermost active scope.
    pub fn innermost(&self) -> Owner {
        match self.frames.last() {
            Some(frame) => frame.owner,
            None => self.top_level(),
        }
    }

    pub fn is_active(&self, owner: Owner) -> bool {
        self.frame(owner).is_some()
    }

    /// Resolve an owner as named in the trace against the current root set.
    ///
    /// Objects pass through unchanged; their existence is checked by the graph.
    pub fn resolve(&self, owner: OwnerRef, time: Timestamp) -> Result<Owner, HeapError> {
        let resolved = match owner {
            OwnerRef::Innermost => return Ok(self.innermost()),
            OwnerRef::Object(object) => return Ok(Owner::Object(object)),
            OwnerRef::Global => Owner::Global,
            OwnerRef::Module => Owner::Module,
            OwnerRef::Frame(frame) => Owner::Frame(frame),
        };
        if self.is_active(resolved) {
            Ok(resolved)
        } else {
            Err(HeapError::InactiveRoot {
                owner: resolved,
                time,
            })
        }
    }

    pub fn enter(&mut self, frame: FrameId, time: Timestamp) -> Result<(), HeapError> {
        if self.is_active(Owner::Frame(frame)) {
            return Err(HeapError::FrameAlreadyActive { frame, time });
        }
        self.frames.push(RootFrame::new(Owner::Frame(frame), time));
        self.frames_entered += 1;
        self.max_depth = self.max_depth.max(self.frames.len());
        Ok(())
    }

    /// Pop the innermost frame, which must be `frame`.
    pub fn exit(&mut self, frame: FrameId, time: Timestamp) -> Result<RootFrame, HeapError> {
        let owner = Owner::Frame(frame);
        match self.frames.pop() {
            Some(top) if top.owner == owner => Ok(top),
            Some(top) => {
                let innermost = top.owner;
                self.frames.push(top);
                match innermost {
                    Owner::Frame(innermost) if self.is_active(owner) => Err(HeapError::ScopeMismatch {
                        frame,
                        innermost,
                        time,
                    }),
                    _ => Err(HeapError::InactiveRoot { owner, time }),
                }
            }
            None => Err(HeapError::InactiveRoot { owner, time }),
        }
    }

    /// Deactivate the module frame (end of the module's lifetime).
    pub fn close_module(&mut self) -> Option<RootFrame> {
        self.module.take()
    }

    /// Active root frames, outermost first.
    pub fn active(&self) -> impl Iterator<Item = &RootFrame> {
        std::iter::once(&self.global)
            .chain(self.module.iter())
            .chain(self.frames.iter())
    }

    pub(crate) fn frame(&self, owner: Owner) -> Option<&RootFrame> {
        match owner {
            Owner::Global => Some(&self.global),
            Owner::Module => self.module.as_ref(),
            Owner::Frame(id) => self
                .frames
                .iter()
                .rev()
                .find(|f| f.owner == Owner::Frame(id)),
            Owner::Object(_) => None,
        }
    }

    pub(crate) fn frame_mut(&mut self, owner: Owner) -> Option<&mut RootFrame> {
        match owner {
            Owner::Global => Some(&mut self.global),
            Owner::Module => self.module.as_mut(),
            Owner::Frame(id) => self
                .frames
                .iter_mut()
                .rev()
                .find(|f| f.owner == Owner::Frame(id)),
            Owner::Object(_) => None,
        }
    }
}
