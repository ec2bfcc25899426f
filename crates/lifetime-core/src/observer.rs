//! Capability interface for analyses that ride on a replay.
//!
//! The [`Replay`](crate::replay::Replay) driver owns the graph and one
//! observer. For every event it first calls [`HeapObserver::before_event`],
//! applies the event, then delivers the event's effects in this order:
//! accesses, site update, anomaly, reachability changes (ascending id).

use anyhow::Result;

use lifetime_types::{ObjectId, Timestamp};

use crate::graph::{Anomaly, HeapGraph, ReachabilityChange, SiteUpdate};

pub trait HeapObserver {
    fn object_accessed(&mut self, _object: ObjectId, _time: Timestamp) -> Result<()> {
        Ok(())
    }

    fn site_updated(&mut self, _update: &SiteUpdate) -> Result<()> {
        Ok(())
    }

    fn anomaly(&mut self, _anomaly: &Anomaly) -> Result<()> {
        Ok(())
    }

    fn unreachable(&mut self, _change: &ReachabilityChange) -> Result<()> {
        Ok(())
    }

    /// Called with the graph state after every event earlier than `next_time`
    /// has been applied.
    fn before_event(&mut self, _graph: &HeapGraph, _next_time: Timestamp) -> Result<()> {
        Ok(())
    }

    /// Called once after the last event (and after end-of-trace releases).
    fn finish(&mut self, _graph: &HeapGraph, _end: Timestamp) -> Result<()> {
        Ok(())
    }

    /// Flush and release any outputs. Must be safe to call more than once.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Reachability bookkeeping only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl HeapObserver for NoopObserver {}
