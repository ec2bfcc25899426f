//! Heap reference graph.
//!
//! Objects live in an arena indexed by [`NodeIndex`]; edges are stored twice,
//! as outgoing slots on the source and as back-references on the target, so
//! both directions can be walked without scanning the heap.
//!
//! Reachability is maintained incrementally:
//!
//! - A new object is anchored to the scope that allocated it. The anchor is
//!   dropped once the object is stored by a root, or by an object that stays
//!   live without it. Otherwise the anchor holds until the scope is released.
//! - An object whose incoming edge set becomes empty (and that is not anchored)
//!   is unreachable immediately, and its own outgoing edges are retired in turn.
//! - An object that loses an edge but still has other incoming edges becomes a
//!   sweep candidate. At the end of the event each candidate gets a backward
//!   search over its incoming edges that stops as soon as it meets a root, an
//!   anchored object or an object with a valid liveness proof. If the search
//!   runs dry every object it visited is garbage (a cycle cut off from the
//!   roots) and all of them are reported together.
//!
//! Liveness proofs are cached on the nodes of each successful search and stay
//! valid until the next edge removal, so growing a structure one node at a time
//! costs one visit per node.
//!
//! Dead objects keep only a tombstone so later status queries stay answerable.

use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use lifetime_types::{Incarnation, ObjectId, Owner, OwnerRef, SiteId, Timestamp, TraceEvent};

use crate::error::HeapError;
use crate::roots::{RootFrame, RootStack};

pub(crate) type NodeIndex = usize;

/// Slot names are interned per edge and shared between both edge directions.
pub type Slot = Arc<str>;

#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotEdge {
    pub(crate) target: NodeIndex,
    pub(crate) created: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Source {
    Root(Owner),
    Node(NodeIndex),
}

/// What a successful backward search ended on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Support {
    Root,
    /// An anchored object, identified by arena slot and allocation serial.
    Anchor { idx: NodeIndex, serial: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Proof {
    epoch: u64,
    support: Support,
}

#[derive(Debug, Clone)]
struct HeapObject {
    id: ObjectId,
    serial: u64,
    site: SiteId,
    created: Timestamp,
    last_access: Timestamp,
    /// Scope that keeps the object alive until something independent holds it.
    anchor: Option<Owner>,
    proof: Option<Proof>,
    outgoing: BTreeMap<Slot, SlotEdge>,
    incoming: BTreeSet<(Source, Slot)>,
}

#[derive(Debug, Clone)]
struct Tombstone {
    created: Timestamp,
    unreachable: Timestamp,
}

// ============================================================================
// Public result types
// ============================================================================

/// Why an object became unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreachableCause {
    /// Its last incoming edge was removed.
    Released,
    /// A sweep found it only held by other unreachable objects.
    Swept,
    /// It was never stored anywhere and its allocating scope ended.
    ScopeEnd,
}

/// Notification that an object went from Live to Unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityChange {
    pub object: ObjectId,
    pub site: SiteId,
    pub created: Timestamp,
    pub last_access: Timestamp,
    pub unreachable_at: Timestamp,
    pub cause: UnreachableCause,
}

impl ReachabilityChange {
    pub fn staleness(&self) -> u64 {
        self.unreachable_at.saturating_sub(self.last_access)
    }
}

/// An object was re-attributed to another allocation site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteUpdate {
    pub object: ObjectId,
    pub created: Timestamp,
    pub previous: SiteId,
    pub site: SiteId,
    pub time: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    AccessAfterUnreachable,
    WriteFromUnreachable,
    WriteToUnreachable,
    SiteUpdateOfUnreachable,
}

/// A benign inconsistency in the trace: an event touching a dead object.
///
/// The graph never resurrects objects; the event is recorded and otherwise
/// ignored (a write into a dead target stores `null`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub object: ObjectId,
    pub time: Timestamp,
}

/// Everything one event did to the graph, in delivery order.
#[derive(Debug, Clone, Default)]
pub struct EventEffects {
    pub accessed: SmallVec<[ObjectId; 2]>,
    pub site_update: Option<SiteUpdate>,
    pub anomaly: Option<Anomaly>,
    /// Ascending object id.
    pub changes: Vec<ReachabilityChange>,
}

/// One reference edge as seen by queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: Owner,
    pub slot: String,
    pub target: ObjectId,
    pub created: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    Live,
    Unreachable { since: Timestamp },
    Unknown,
}

/// Snapshot of a live object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub site: SiteId,
    pub created: Timestamp,
    pub last_access: Timestamp,
    pub anchored_to: Option<Owner>,
    pub in_degree: usize,
    pub out_degree: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub events: u64,
    pub allocated: u64,
    pub released: u64,
    pub swept: u64,
    pub scope_released: u64,
    pub sweeps: u64,
    pub sweep_visits: u64,
    pub anomalies: u64,
    pub peak_live: usize,
}

impl GraphStats {
    pub fn unreachable(&self) -> u64 {
        self.released + self.swept + self.scope_released
    }
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone)]
pub struct HeapGraph {
    arena: Vec<Option<HeapObject>>,
    free: Vec<NodeIndex>,
    index: HashMap<ObjectId, NodeIndex>,
    tombstones: HashMap<ObjectId, Tombstone>,
    roots: RootStack,
    suspects: BTreeSet<NodeIndex>,
    /// Bumped on every edge removal; older proofs are void.
    epoch: u64,
    stats: GraphStats,
}

impl HeapGraph {
    /// Create an empty heap. `module_scope` models a module frame between the
    /// global frame and function frames, released by [`HeapGraph::finish`].
    pub fn new(module_scope: bool) -> Self {
        Self {
            arena: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            tombstones: HashMap::new(),
            roots: RootStack::new(module_scope),
            suspects: BTreeSet::new(),
            epoch: 0,
            stats: GraphStats::default(),
        }
    }

    /// Apply one event and return the objects that became unreachable because
    /// of it, in ascending id order.
    pub fn ingest(&mut self, event: &TraceEvent) -> Result<Vec<ReachabilityChange>, HeapError> {
        Ok(self.apply(event)?.changes)
    }

    /// Apply one event and return all of its effects.
    pub fn apply(&mut self, event: &TraceEvent) -> Result<EventEffects, HeapError> {
        let mut effects = EventEffects::default();
        match event {
            TraceEvent::Allocate { object, site, time } => {
                self.allocate(*object, site, *time)?;
            }
            TraceEvent::WriteRef {
                owner,
                slot,
                target,
                time,
            } => {
                self.write(*owner, slot, *target, *time, &mut effects)?;
            }
            TraceEvent::Access { object, time } => match self.lookup(*object, *time)? {
                Some(idx) => {
                    if let Some(node) = self.node_mut(idx) {
                        node.last_access = *time;
                    }
                    effects.accessed.push(*object);
                }
                None => {
                    effects.anomaly =
                        Some(self.anomaly(AnomalyKind::AccessAfterUnreachable, *object, *time));
                }
            },
            TraceEvent::UpdateSite { object, site, time } => {
                match self.lookup(*object, *time)? {
                    Some(idx) => {
                        if let Some(node) = self.node_mut(idx) {
                            let previous = std::mem::replace(&mut node.site, site.clone());
                            effects.site_update = Some(SiteUpdate {
                                object: *object,
                                created: node.created,
                                previous,
                                site: site.clone(),
                                time: *time,
                            });
                        }
                    }
                    None => {
                        effects.anomaly = Some(self.anomaly(
                            AnomalyKind::SiteUpdateOfUnreachable,
                            *object,
                            *time,
                        ));
                    }
                }
            }
            TraceEvent::ScopeEnter { frame, time } => self.roots.enter(*frame, *time)?,
            TraceEvent::ScopeExit { frame, time } => {
                let popped = self.roots.exit(*frame, *time)?;
                self.release_frame(popped, *time, &mut effects.changes);
            }
            TraceEvent::Flush { time } => {
                let top = self.roots.top_level();
                let anchored = self
                    .roots
                    .frame_mut(top)
                    .map(|frame| std::mem::take(&mut frame.anchored))
                    .unwrap_or_default();
                let mut pending = Vec::new();
                self.release_anchors(top, &anchored, *time, &mut pending, &mut effects.changes);
                self.drain(&mut pending, *time, &mut effects.changes);
                self.sweep(*time, &mut effects.changes);
            }
        }
        self.stats.events += 1;
        effects.changes.sort_by_key(|c| c.object);
        Ok(effects)
    }

    /// End of trace: release the module scope, if one is modeled.
    ///
    /// Objects still referenced from the global frame stay live.
    pub fn finish(&mut self, end: Timestamp) -> Vec<ReachabilityChange> {
        let mut changes = Vec::new();
        if let Some(module) = self.roots.close_module() {
            debug!(end, slots = module.slot_count(), "releasing module scope");
            self.release_frame(module, end, &mut changes);
        }
        changes.sort_by_key(|c| c.object);
        changes
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// True while the object is live (including objects only held by their
    /// allocating scope). Unknown and dead objects are not reachable.
    pub fn is_reachable(&self, object: ObjectId) -> bool {
        self.index.contains_key(&object)
    }

    pub fn status(&self, object: ObjectId) -> ObjectStatus {
        if self.index.contains_key(&object) {
            ObjectStatus::Live
        } else if let Some(tomb) = self.tombstones.get(&object) {
            ObjectStatus::Unreachable {
                since: tomb.unreachable,
            }
        } else {
            ObjectStatus::Unknown
        }
    }

    /// Creation time of the object's current or last incarnation.
    pub fn created_at(&self, object: ObjectId) -> Option<Timestamp> {
        match self.index.get(&object) {
            Some(&idx) => self.node(idx).map(|n| n.created),
            None => self.tombstones.get(&object).map(|t| t.created),
        }
    }

    /// Edges pointing at a live object, ordered by source then slot.
    pub fn edges_into(&self, object: ObjectId) -> Vec<Edge> {
        let Some(node) = self.index.get(&object).and_then(|&idx| self.node(idx)) else {
            return Vec::new();
        };
        let mut edges: Vec<Edge> = node
            .incoming
            .iter()
            .filter_map(|(source, slot)| {
                let (owner, edge) = match *source {
                    Source::Root(owner) => (owner, self.roots.frame(owner)?.slots.get(slot)?),
                    Source::Node(idx) => {
                        let holder = self.node(idx)?;
                        (Owner::Object(holder.id), holder.outgoing.get(slot)?)
                    }
                };
                Some(Edge {
                    source: owner,
                    slot: slot.to_string(),
                    target: object,
                    created: edge.created,
                })
            })
            .collect();
        edges.sort_by(|a, b| (a.source, &a.slot).cmp(&(b.source, &b.slot)));
        edges
    }

    /// Outgoing edges of a live object, ordered by slot.
    pub fn edges_from(&self, object: ObjectId) -> Vec<Edge> {
        self.edges_from_owner(Owner::Object(object))
    }

    /// Outgoing edges of an object or an active root, ordered by slot.
    pub fn edges_from_owner(&self, owner: Owner) -> Vec<Edge> {
        let slots = match owner {
            Owner::Object(object) => match self.index.get(&object).and_then(|&i| self.node(i)) {
                Some(node) => &node.outgoing,
                None => return Vec::new(),
            },
            root => match self.roots.frame(root) {
                Some(frame) => &frame.slots,
                None => return Vec::new(),
            },
        };
        slots
            .iter()
            .filter_map(|(slot, edge)| {
                Some(Edge {
                    source: owner,
                    slot: slot.to_string(),
                    target: self.node(edge.target)?.id,
                    created: edge.created,
                })
            })
            .collect()
    }

    pub fn object(&self, object: ObjectId) -> Option<ObjectInfo> {
        let node = self.index.get(&object).and_then(|&idx| self.node(idx))?;
        Some(ObjectInfo {
            id: node.id,
            site: node.site.clone(),
            created: node.created,
            last_access: node.last_access,
            anchored_to: node.anchor,
            in_degree: node.incoming.len(),
            out_degree: node.outgoing.len(),
        })
    }

    /// All live objects in ascending id order.
    pub fn live_objects(&self) -> Vec<ObjectInfo> {
        let mut ids: Vec<ObjectId> = self.index.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.object(id)).collect()
    }

    pub fn live_count(&self) -> usize {
        self.index.len()
    }

    pub fn roots(&self) -> &RootStack {
        &self.roots
    }

    pub fn stats(&self) -> &GraphStats {
        &self.stats
    }

    // ------------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------------

    fn allocate(&mut self, object: ObjectId, site: &SiteId, time: Timestamp) -> Result<(), HeapError> {
        if self.index.contains_key(&object) {
            return Err(HeapError::DuplicateAllocation { object, time });
        }
        if let Some(tomb) = self.tombstones.get(&object) {
            if tomb.created == time {
                return Err(HeapError::AmbiguousIncarnation { object, time });
            }
            trace!(%object, time, "object id reused");
            self.tombstones.remove(&object);
        }
        let scope = self.roots.innermost();
        let node = HeapObject {
            id: object,
            serial: self.stats.allocated,
            site: site.clone(),
            created: time,
            last_access: time,
            anchor: Some(scope),
            proof: None,
            outgoing: BTreeMap::new(),
            incoming: BTreeSet::new(),
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.arena[idx] = Some(node);
                idx
            }
            None => {
                self.arena.push(Some(node));
                self.arena.len() - 1
            }
        };
        self.index.insert(object, idx);
        if let Some(frame) = self.roots.frame_mut(scope) {
            frame.anchored.push(Incarnation::new(object, time));
        }
        self.stats.allocated += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.index.len());
        Ok(())
    }

    fn write(
        &mut self,
        owner: OwnerRef,
        slot: &str,
        target: Option<ObjectId>,
        time: Timestamp,
        effects: &mut EventEffects,
    ) -> Result<(), HeapError> {
        let owner = self.roots.resolve(owner, time)?;
        let source = match owner {
            Owner::Object(object) => match self.lookup(object, time)? {
                Some(idx) => Source::Node(idx),
                None => {
                    effects.anomaly =
                        Some(self.anomaly(AnomalyKind::WriteFromUnreachable, object, time));
                    return Ok(());
                }
            },
            root => Source::Root(root),
        };
        let target = match target {
            Some(object) => match self.lookup(object, time)? {
                Some(idx) => Some(idx),
                None => {
                    effects.anomaly =
                        Some(self.anomaly(AnomalyKind::WriteToUnreachable, object, time));
                    None
                }
            },
            None => None,
        };

        if let Source::Node(idx) = source {
            if let Some(node) = self.node_mut(idx) {
                node.last_access = time;
                effects.accessed.push(node.id);
            }
        }

        let slot: Slot = Arc::from(slot);
        let previous = self.slot_edge(source, &slot);
        if previous.map(|e| e.target) == target {
            return Ok(());
        }

        if let Some(target) = target {
            self.set_slot(source, slot.clone(), SlotEdge { target, created: time });
            if let Some(node) = self.node_mut(target) {
                node.incoming.insert((source, slot.clone()));
            }
        } else {
            self.clear_slot(source, &slot);
        }

        if let Some(old) = previous {
            self.epoch += 1;
            let mut pending = Vec::new();
            self.retire(source, &slot, old.target, &mut pending);
            self.drain(&mut pending, time, &mut effects.changes);
            self.sweep(time, &mut effects.changes);
        }
        if let Some(target) = target {
            self.settle_anchor(source, target);
        }
        Ok(())
    }

    /// Drop `target`'s anchor if `source` keeps it live on its own.
    ///
    /// A holder only reachable through `target` (itself, or something
    /// `target` holds) leaves the anchor in place until the scope ends.
    fn settle_anchor(&mut self, source: Source, target: NodeIndex) {
        if !self.node(target).is_some_and(|n| n.anchor.is_some()) {
            return;
        }
        let support = match source {
            Source::Root(_) => Some(Support::Root),
            Source::Node(holder) => self.find_support(holder, Some(target)).ok(),
        };
        let Some(support) = support else {
            return;
        };
        let epoch = self.epoch;
        if let Some(node) = self.node_mut(target) {
            node.anchor = None;
            node.proof = Some(Proof { epoch, support });
        }
    }

    /// Retire a root frame: drop its slot edges, then release the objects that
    /// were anchored to it.
    fn release_frame(&mut self, frame: RootFrame, time: Timestamp, changes: &mut Vec<ReachabilityChange>) {
        let owner = frame.owner();
        let mut pending = Vec::new();
        if !frame.slots.is_empty() {
            self.epoch += 1;
        }
        for (slot, edge) in &frame.slots {
            self.retire(Source::Root(owner), slot, edge.target, &mut pending);
        }
        self.drain(&mut pending, time, changes);
        self.release_anchors(owner, &frame.anchored, time, &mut pending, changes);
        self.drain(&mut pending, time, changes);
        self.sweep(time, changes);
    }

    fn release_anchors(
        &mut self,
        owner: Owner,
        anchored: &[Incarnation],
        time: Timestamp,
        pending: &mut Vec<NodeIndex>,
        changes: &mut Vec<ReachabilityChange>,
    ) {
        for incarnation in anchored {
            let Some(&idx) = self.index.get(&incarnation.object) else {
                continue;
            };
            let Some(node) = self.node_mut(idx) else {
                continue;
            };
            if node.created != incarnation.created || node.anchor != Some(owner) {
                continue;
            }
            node.anchor = None;
            if node.incoming.is_empty() {
                self.kill(idx, time, UnreachableCause::ScopeEnd, pending, changes);
            } else {
                self.suspects.insert(idx);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reachability maintenance
    // ------------------------------------------------------------------------

    /// Remove one back-reference and queue the target for a count check.
    fn retire(&mut self, source: Source, slot: &Slot, target: NodeIndex, pending: &mut Vec<NodeIndex>) {
        if let Some(node) = self.node_mut(target) {
            node.incoming.remove(&(source, slot.clone()));
            pending.push(target);
        }
    }

    /// Kill every queued object whose count reached zero, cascading through
    /// their outgoing edges. Survivors that lost an edge become sweep
    /// candidates.
    fn drain(&mut self, pending: &mut Vec<NodeIndex>, time: Timestamp, changes: &mut Vec<ReachabilityChange>) {
        while let Some(idx) = pending.pop() {
            let Some(node) = self.node(idx) else {
                continue;
            };
            if node.anchor.is_some() {
                continue;
            }
            if node.incoming.is_empty() {
                self.kill(idx, time, UnreachableCause::Released, pending, changes);
            } else {
                self.suspects.insert(idx);
            }
        }
    }

    /// Resolve every sweep candidate queued by this event.
    fn sweep(&mut self, time: Timestamp, changes: &mut Vec<ReachabilityChange>) {
        let mut pending = Vec::new();
        while let Some(start) = self.suspects.pop_first() {
            if !self.node(start).is_some_and(|n| n.anchor.is_none()) {
                continue;
            }
            self.stats.sweeps += 1;
            let Err(garbage) = self.find_support(start, None) else {
                continue;
            };
            debug!(time, objects = garbage.len(), "sweep collected unrooted cycle");
            let buried: Vec<(NodeIndex, HeapObject)> = garbage
                .into_iter()
                .filter_map(|idx| Some((idx, self.bury(idx, time, UnreachableCause::Swept, changes)?)))
                .collect();
            for (idx, node) in buried {
                for (slot, edge) in &node.outgoing {
                    self.retire(Source::Node(idx), slot, edge.target, &mut pending);
                }
                self.free.push(idx);
            }
            self.drain(&mut pending, time, changes);
        }
    }

    /// Backward search from `start` over incoming edges, never passing through
    /// `skip`.
    ///
    /// Stops at a root edge, an anchored object other than `skip`, or an object
    /// whose proof is still valid, and records that support on every object of
    /// the chain down to `start`. If nothing supports the neighborhood, returns
    /// all of it; none of it is live.
    fn find_support(&mut self, start: NodeIndex, skip: Option<NodeIndex>) -> Result<Support, Vec<NodeIndex>> {
        let mut held_by: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut seen: HashSet<NodeIndex> = HashSet::from([start]);
        let mut visited = Vec::new();
        let mut queue = VecDeque::from([start]);
        let mut visits = 0u64;
        let mut found = None;

        'search: while let Some(idx) = queue.pop_front() {
            visits += 1;
            visited.push(idx);
            let Some(node) = self.node(idx) else {
                continue;
            };
            if let Some(support) = self.own_support(idx, node, skip) {
                found = Some((idx, support));
                break;
            }
            for (source, _) in &node.incoming {
                match *source {
                    Source::Root(_) => {
                        found = Some((idx, Support::Root));
                        break 'search;
                    }
                    Source::Node(holder) => {
                        if Some(holder) != skip && seen.insert(holder) {
                            held_by.insert(holder, idx);
                            queue.push_back(holder);
                        }
                    }
                }
            }
        }
        self.stats.sweep_visits += visits;

        let Some((mut idx, support)) = found else {
            return Err(visited);
        };
        let proof = Proof {
            epoch: self.epoch,
            support,
        };
        loop {
            if let Some(node) = self.node_mut(idx) {
                node.proof = Some(proof);
            }
            match held_by.get(&idx) {
                Some(&next) => idx = next,
                None => break,
            }
        }
        Ok(support)
    }

    /// Support an object provides by itself: its anchor, or a proof from this
    /// epoch whose anchor still holds.
    fn own_support(&self, idx: NodeIndex, node: &HeapObject, skip: Option<NodeIndex>) -> Option<Support> {
        if node.anchor.is_some() && Some(idx) != skip {
            return Some(Support::Anchor {
                idx,
                serial: node.serial,
            });
        }
        let proof = node.proof.filter(|p| p.epoch == self.epoch)?;
        match proof.support {
            Support::Root => Some(Support::Root),
            Support::Anchor { idx: anchor, serial } => {
                let holds = Some(anchor) != skip
                    && self
                        .node(anchor)
                        .is_some_and(|a| a.serial == serial && a.anchor.is_some());
                holds.then_some(proof.support)
            }
        }
    }

    fn kill(
        &mut self,
        idx: NodeIndex,
        time: Timestamp,
        cause: UnreachableCause,
        pending: &mut Vec<NodeIndex>,
        changes: &mut Vec<ReachabilityChange>,
    ) {
        if let Some(node) = self.bury(idx, time, cause, changes) {
            for (slot, edge) in &node.outgoing {
                self.retire(Source::Node(idx), slot, edge.target, pending);
            }
            self.free.push(idx);
        }
    }

    /// Take a node out of the arena, leave a tombstone and report it.
    ///
    /// The caller retires the returned node's outgoing edges and frees its
    /// index.
    fn bury(
        &mut self,
        idx: NodeIndex,
        time: Timestamp,
        cause: UnreachableCause,
        changes: &mut Vec<ReachabilityChange>,
    ) -> Option<HeapObject> {
        let node = self.arena.get_mut(idx)?.take()?;
        self.index.remove(&node.id);
        self.suspects.remove(&idx);
        self.tombstones.insert(
            node.id,
            Tombstone {
                created: node.created,
                unreachable: time,
            },
        );
        match cause {
            UnreachableCause::Released => self.stats.released += 1,
            UnreachableCause::Swept => self.stats.swept += 1,
            UnreachableCause::ScopeEnd => self.stats.scope_released += 1,
        }
        trace!(object = %node.id, time, ?cause, "object unreachable");
        changes.push(ReachabilityChange {
            object: node.id,
            site: node.site.clone(),
            created: node.created,
            last_access: node.last_access,
            unreachable_at: time,
            cause,
        });
        Some(node)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// `Ok(Some(idx))` for live objects, `Ok(None)` for dead ones, and an
    /// error for ids that were never allocated.
    fn lookup(&self, object: ObjectId, time: Timestamp) -> Result<Option<NodeIndex>, HeapError> {
        if let Some(&idx) = self.index.get(&object) {
            Ok(Some(idx))
        } else if self.tombstones.contains_key(&object) {
            Ok(None)
        } else {
            Err(HeapError::UnknownObject { object, time })
        }
    }

    fn anomaly(&mut self, kind: AnomalyKind, object: ObjectId, time: Timestamp) -> Anomaly {
        self.stats.anomalies += 1;
        debug!(%object, time, ?kind, "event touches an unreachable object");
        Anomaly { kind, object, time }
    }

    fn node(&self, idx: NodeIndex) -> Option<&HeapObject> {
        self.arena.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: NodeIndex) -> Option<&mut HeapObject> {
        self.arena.get_mut(idx).and_then(Option::as_mut)
    }

    fn slot_edge(&self, source: Source, slot: &Slot) -> Option<SlotEdge> {
        match source {
            Source::Root(owner) => self.roots.frame(owner)?.slots.get(slot).copied(),
            Source::Node(idx) => self.node(idx)?.outgoing.get(slot).copied(),
        }
    }

    fn set_slot(&mut self, source: Source, slot: Slot, edge: SlotEdge) {
        let slots = match source {
            Source::Root(owner) => self.roots.frame_mut(owner).map(|f| &mut f.slots),
            Source::Node(idx) => self.node_mut(idx).map(|n| &mut n.outgoing),
        };
        if let Some(slots) = slots {
            slots.insert(slot, edge);
        }
    }

    fn clear_slot(&mut self, source: Source, slot: &Slot) {
        let slots = match source {
            Source::Root(owner) => self.roots.frame_mut(owner).map(|f| &mut f.slots),
            Source::Node(idx) => self.node_mut(idx).map(|n| &mut n.outgoing),
        };
        if let Some(slots) = slots {
            slots.remove(slot);
        }
    }
}
