//! Object lifetime analysis engine.
//!
//! Replays a heap trace through an incremental reference graph and derives
//! per-object facts from it:
//!
//! - [`graph`]: the heap reference graph with reference counting plus local
//!   cycle sweeps.
//! - [`roots`]: global, module and scope frames.
//! - [`observer`]: the capability interface analyses plug into.
//! - [`staleness`]: staleness, last-use, unreachable and site-update records.
//! - [`access_path`]: shortest root-to-object reference chains on demand.
//! - [`site_stats`]: per-allocation-site aggregation of a staleness run.
//! - [`replay`]: the driver tying a trace, the graph and an observer together.

pub mod access_path;
pub mod channels;
pub mod error;
pub mod graph;
pub mod observer;
pub mod replay;
pub mod roots;
pub mod site_stats;
pub mod staleness;

pub use access_path::{
    resolve_access_path, AccessPath, AccessPathResolver, AccessPathResult, AccessPathStats, PathStep,
    Trigger, WatchList,
};
pub use channels::{ChannelSet, RecordChannels};
pub use error::HeapError;
pub use graph::{
    Anomaly, AnomalyKind, Edge, EventEffects, GraphStats, HeapGraph, ObjectInfo, ObjectStatus,
    ReachabilityChange, SiteUpdate, UnreachableCause,
};
pub use observer::{HeapObserver, NoopObserver};
pub use replay::{replay_context, ContextSummary, ProgressMonitor, Replay, ReplaySummary, SilentProgress};
pub use roots::{RootFrame, RootStack};
pub use site_stats::{aggregate, aggregate_directory, write_site_stats, SiteStatsReport, SiteSummary};
pub use staleness::{StalenessStats, StalenessTracker};
