//! Access paths: why is this object still alive at time T?
//!
//! A path is the shortest chain of references (by edge count) from an active
//! root to the object. Among equally short chains the one with the
//! lexicographically smallest sequence of slot names wins.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::io::Write;

use lifetime_types::{ObjectId, Owner, Timestamp};

use crate::graph::{HeapGraph, ObjectStatus};
use crate::observer::HeapObserver;

/// One watch-list entry: resolve `object` once time `time` has been reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub object: ObjectId,
    pub time: Timestamp,
}

/// Immutable set of triggers, ordered by time (input order among equal times).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchList {
    triggers: Vec<Trigger>,
}

impl WatchList {
    pub fn new(entries: impl IntoIterator<Item = (ObjectId, Timestamp)>) -> Self {
        let mut triggers: Vec<Trigger> = entries
            .into_iter()
            .map(|(object, time)| Trigger { object, time })
            .collect();
        triggers.sort_by_key(|t| t.time);
        Self { triggers }
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub owner: Owner,
    pub slot: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPath {
    /// First step starts at a root; each later step's owner is the previous
    /// step's target.
    pub steps: Vec<PathStep>,
    pub target: ObjectId,
}

impl AccessPath {
    pub fn root(&self) -> Option<Owner> {
        self.steps.first().map(|s| s.owner)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{}.{} -> ", step.owner, step.slot)?;
        }
        write!(f, "#{}", self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPathResult {
    Path(AccessPath),
    Unreachable { since: Timestamp },
    /// Live, but only held by the scope that allocated it.
    Detached,
    Unknown,
}

impl fmt::Display for AccessPathResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPathResult::Path(path) => path.fmt(f),
            AccessPathResult::Unreachable { since } => {
                write!(f, "no path (unreachable since t={})", since)
            }
            AccessPathResult::Detached => f.write_str("no path (live but not referenced from any root)"),
            AccessPathResult::Unknown => f.write_str("no path (object never allocated)"),
        }
    }
}

/// Resolve the access path of `object` against the graph's current state.
pub fn resolve_access_path(graph: &HeapGraph, object: ObjectId) -> AccessPathResult {
    match graph.status(object) {
        ObjectStatus::Unknown => return AccessPathResult::Unknown,
        ObjectStatus::Unreachable { since } => return AccessPathResult::Unreachable { since },
        ObjectStatus::Live => {}
    }
    match shortest_path(graph, object) {
        Some(path) => AccessPathResult::Path(path),
        None => AccessPathResult::Detached,
    }
}

fn shortest_path(graph: &HeapGraph, object: ObjectId) -> Option<AccessPath> {
    // Backward BFS: distance (in edges) from each holder to the target, until
    // the first level that touches a root.
    let mut dist: HashMap<ObjectId, usize> = HashMap::from([(object, 0)]);
    let mut queue = VecDeque::from([object]);
    let mut root_depth: Option<usize> = None;
    let mut root_owners: BTreeSet<Owner> = BTreeSet::new();

    while let Some(current) = queue.pop_front() {
        let depth = dist.get(&current).copied()?;
        if root_depth.is_some_and(|r| depth > r) {
            break;
        }
        for edge in graph.edges_into(current) {
            match edge.source {
                Owner::Object(holder) => {
                    if !dist.contains_key(&holder) {
                        dist.insert(holder, depth + 1);
                        queue.push_back(holder);
                    }
                }
                root => {
                    root_depth.get_or_insert(depth);
                    root_owners.insert(root);
                }
            }
        }
    }
    let depth = root_depth?;

    // Forward pass: at every level take the smallest slot that still leads
    // one step closer to the target.
    let mut frontier = root_owners;
    let mut via: HashMap<ObjectId, PathStep> = HashMap::new();
    for remaining in (0..=depth).rev() {
        let candidates: Vec<_> = frontier
            .iter()
            .flat_map(|owner| graph.edges_from_owner(*owner))
            .filter(|edge| dist.get(&edge.target) == Some(&remaining))
            .collect();
        let slot = candidates.iter().map(|edge| edge.slot.as_str()).min()?.to_string();
        let mut next = BTreeSet::new();
        for edge in candidates.into_iter().filter(|edge| edge.slot == slot) {
            via.entry(edge.target).or_insert_with(|| PathStep {
                owner: edge.source,
                slot: slot.clone(),
            });
            next.insert(Owner::Object(edge.target));
        }
        frontier = next;
    }

    let mut steps = Vec::with_capacity(depth + 1);
    let mut current = object;
    loop {
        let step = via.get(&current)?.clone();
        let owner = step.owner;
        steps.push(step);
        match owner {
            Owner::Object(holder) => current = holder,
            _ => break,
        }
    }
    steps.reverse();
    Some(AccessPath {
        steps,
        target: object,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessPathStats {
    pub resolved: u64,
    pub paths: u64,
    pub unreachable: u64,
    pub detached: u64,
    pub unknown: u64,
}

/// Access-path sink: answers watch-list triggers as the replay passes them.
///
/// A trigger at time T is resolved right before the first event later than T,
/// so it sees every event at T. Triggers past the end of the trace are
/// resolved against the final state.
pub struct AccessPathResolver<W: Write> {
    watch: WatchList,
    next: usize,
    out: W,
    stats: AccessPathStats,
}

impl<W: Write> AccessPathResolver<W> {
    pub fn new(watch: WatchList, out: W) -> Self {
        Self {
            watch,
            next: 0,
            out,
            stats: AccessPathStats::default(),
        }
    }

    pub fn stats(&self) -> &AccessPathStats {
        &self.stats
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn fire_until(&mut self, graph: &HeapGraph, limit: Option<Timestamp>) -> Result<()> {
        while let Some(trigger) = self.watch.triggers.get(self.next).copied() {
            if limit.is_some_and(|limit| trigger.time >= limit) {
                break;
            }
            self.next += 1;
            let result = resolve_access_path(graph, trigger.object);
            self.stats.resolved += 1;
            match result {
                AccessPathResult::Path(_) => self.stats.paths += 1,
                AccessPathResult::Unreachable { .. } => self.stats.unreachable += 1,
                AccessPathResult::Detached => self.stats.detached += 1,
                AccessPathResult::Unknown => self.stats.unknown += 1,
            }
            writeln!(self.out, "{},{}: {}", trigger.object, trigger.time, result)
                .context("Failed to write access path")?;
        }
        Ok(())
    }
}

impl<W: Write> HeapObserver for AccessPathResolver<W> {
    fn before_event(&mut self, graph: &HeapGraph, next_time: Timestamp) -> Result<()> {
        self.fire_until(graph, Some(next_time))
    }

    fn finish(&mut self, graph: &HeapGraph, _end: Timestamp) -> Result<()> {
        self.fire_until(graph, None)?;
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        self.out.flush().context("Failed to flush access paths")
    }
}
