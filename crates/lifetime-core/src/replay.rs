//! Replay driver: feeds a decoded trace through the heap graph and one
//! observer, strictly in trace order.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use lifetime_trace::TraceFile;
use lifetime_types::{Timestamp, TraceEvent};

use crate::graph::{EventEffects, HeapGraph, ReachabilityChange};
use crate::observer::HeapObserver;
use crate::roots::RootStack;

// ============================================================================
// Progress
// ============================================================================

/// Receives replay progress. Implementations use interior mutability so a
/// monitor can be shared by reference.
pub trait ProgressMonitor {
    fn start(&self, total: u64);
    fn tick(&self, done: u64);
    fn finish(&self);
}

/// Progress monitor that reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressMonitor for SilentProgress {
    fn start(&self, _total: u64) {}
    fn tick(&self, _done: u64) {}
    fn finish(&self) {}
}

// ============================================================================
// Summaries
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub events: u64,
    pub allocated: u64,
    pub unreachable: u64,
    pub released: u64,
    pub swept: u64,
    pub scope_released: u64,
    pub sweeps: u64,
    pub anomalies: u64,
    pub peak_live: usize,
    pub live_at_end: usize,
    pub max_depth: usize,
    pub end_time: Timestamp,
}

/// Result of a context-only replay (root stack bookkeeping, no heap).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextSummary {
    pub events: u64,
    pub frames_entered: u64,
    pub max_depth: usize,
    pub end_time: Timestamp,
}

// ============================================================================
// Replay
// ============================================================================

pub struct Replay<O: HeapObserver> {
    graph: HeapGraph,
    observer: O,
    last_time: Timestamp,
}

impl<O: HeapObserver> Replay<O> {
    pub fn new(module_scope: bool, observer: O) -> Self {
        Self {
            graph: HeapGraph::new(module_scope),
            observer,
            last_time: 0,
        }
    }

    pub fn graph(&self) -> &HeapGraph {
        &self.graph
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Apply one event and deliver its effects to the observer.
    pub fn step(&mut self, event: &TraceEvent) -> Result<()> {
        self.observer.before_event(&self.graph, event.time())?;
        let effects = self
            .graph
            .apply(event)
            .with_context(|| format!("Malformed event '{}'", event))?;
        self.last_time = event.time();
        self.deliver(effects)
    }

    /// End of trace: final releases, then the observer's `finish`.
    pub fn finish(&mut self) -> Result<ReplaySummary> {
        let end = self.last_time;
        for change in self.graph.finish(end) {
            self.observer.unreachable(&change)?;
        }
        self.observer.finish(&self.graph, end)?;
        Ok(self.summary())
    }

    /// Replay the whole trace. The observer is closed on every exit path; the
    /// first error is returned.
    pub fn run(&mut self, trace: &TraceFile, progress: &dyn ProgressMonitor) -> Result<ReplaySummary> {
        let result = self.run_events(trace, progress);
        let closed = self.observer.close();
        match (result, closed) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!("failed to close outputs after error: {:#}", close_err);
                }
                Err(e)
            }
        }
    }

    fn run_events(&mut self, trace: &TraceFile, progress: &dyn ProgressMonitor) -> Result<ReplaySummary> {
        let total = trace.event_count() as u64;
        info!(origin = trace.origin(), events = total, "replaying trace");
        progress.start(total);
        let mut done = 0u64;
        for event in trace.events() {
            let event = event?;
            self.step(&event)
                .with_context(|| format!("{}: event {}", trace.origin(), done + 1))?;
            done += 1;
            progress.tick(done);
        }
        progress.finish();
        let summary = self.finish()?;
        debug!(?summary, "replay finished");
        Ok(summary)
    }

    fn deliver(&mut self, effects: EventEffects) -> Result<()> {
        let EventEffects {
            accessed,
            site_update,
            anomaly,
            changes,
        } = effects;
        for object in accessed {
            self.observer.object_accessed(object, self.last_time)?;
        }
        if let Some(update) = site_update {
            self.observer.site_updated(&update)?;
        }
        if let Some(anomaly) = anomaly {
            self.observer.anomaly(&anomaly)?;
        }
        changes
            .iter()
            .try_for_each(|change: &ReachabilityChange| self.observer.unreachable(change))
    }

    fn summary(&self) -> ReplaySummary {
        let stats = self.graph.stats();
        ReplaySummary {
            events: stats.events,
            allocated: stats.allocated,
            unreachable: stats.unreachable(),
            released: stats.released,
            swept: stats.swept,
            scope_released: stats.scope_released,
            sweeps: stats.sweeps,
            anomalies: stats.anomalies,
            peak_live: stats.peak_live,
            live_at_end: self.graph.live_count(),
            max_depth: self.graph.roots().max_depth(),
            end_time: self.last_time,
        }
    }
}

/// Replay only scope entry and exit, validating frame nesting.
pub fn replay_context(trace: &TraceFile, module_scope: bool, progress: &dyn ProgressMonitor) -> Result<ContextSummary> {
    let mut roots = RootStack::new(module_scope);
    let mut summary = ContextSummary::default();
    progress.start(trace.event_count() as u64);
    for event in trace.events() {
        let event = event?;
        let applied = match &event {
            TraceEvent::ScopeEnter { frame, time } => roots.enter(*frame, *time),
            TraceEvent::ScopeExit { frame, time } => roots.exit(*frame, *time).map(|_| ()),
            _ => Ok(()),
        };
        applied.with_context(|| format!("{}: malformed event '{}'", trace.origin(), event))?;
        summary.events += 1;
        summary.end_time = event.time();
        progress.tick(summary.events);
    }
    progress.finish();
    summary.frames_entered = roots.frames_entered();
    summary.max_depth = roots.max_depth();
    Ok(summary)
}
