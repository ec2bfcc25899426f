//! Staleness tracker: turns reachability changes into per-object records.

use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use tracing::debug;

use lifetime_types::{
    LastUseRecord, ObjectId, SiteUpdateRecord, StalenessRecord, Timestamp, UnreachableRecord,
};

use crate::channels::RecordChannels;
use crate::graph::{Anomaly, HeapGraph, ReachabilityChange, SiteUpdate};
use crate::observer::HeapObserver;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StalenessStats {
    /// Staleness records written (one per unreachable object).
    pub records: u64,
    pub accesses: u64,
    pub site_updates: u64,
    pub anomalies: u64,
    /// Objects still live at the end of the trace.
    pub live_at_end: u64,
    pub total_staleness: u128,
    pub max_staleness: u64,
}

impl StalenessStats {
    pub fn mean_staleness(&self) -> Option<f64> {
        (self.records > 0).then(|| self.total_staleness as f64 / self.records as f64)
    }
}

/// Staleness sink: writes the four record channels.
pub struct StalenessTracker<W: Write> {
    channels: RecordChannels<W>,
    stats: StalenessStats,
}

impl<W: Write> StalenessTracker<W> {
    pub fn new(channels: RecordChannels<W>) -> Self {
        Self {
            channels,
            stats: StalenessStats::default(),
        }
    }

    pub fn stats(&self) -> &StalenessStats {
        &self.stats
    }

    /// Flush and return the channels (used to inspect in-memory output).
    pub fn into_channels(self) -> RecordChannels<W> {
        self.channels
    }
}

impl<W: Write> HeapObserver for StalenessTracker<W> {
    fn object_accessed(&mut self, _object: ObjectId, _time: Timestamp) -> Result<()> {
        self.stats.accesses += 1;
        Ok(())
    }

    fn site_updated(&mut self, update: &SiteUpdate) -> Result<()> {
        self.stats.site_updates += 1;
        self.channels.write_site_update(&SiteUpdateRecord {
            object: update.object,
            created: update.created,
            site: update.site.clone(),
            time: update.time,
        })
    }

    fn anomaly(&mut self, _anomaly: &Anomaly) -> Result<()> {
        self.stats.anomalies += 1;
        Ok(())
    }

    fn unreachable(&mut self, change: &ReachabilityChange) -> Result<()> {
        let staleness = change.staleness();
        self.stats.records += 1;
        self.stats.total_staleness += u128::from(staleness);
        self.stats.max_staleness = self.stats.max_staleness.max(staleness);

        self.channels.write_staleness(&StalenessRecord {
            object: change.object,
            created: change.created,
            site: change.site.clone(),
            last_use: change.last_access,
            unreachable: change.unreachable_at,
            staleness,
        })?;
        self.channels.write_last_use(&LastUseRecord {
            object: change.object,
            created: change.created,
            last_use: change.last_access,
        })?;
        self.channels.write_unreachable(&UnreachableRecord {
            object: change.object,
            created: change.created,
            unreachable: change.unreachable_at,
        })
    }

    /// Objects that never became unreachable still get a last-use record.
    fn finish(&mut self, graph: &HeapGraph, end: Timestamp) -> Result<()> {
        for object in graph.live_objects() {
            self.stats.live_at_end += 1;
            self.channels.write_last_use(&LastUseRecord {
                object: object.id,
                created: object.created,
                last_use: object.last_access,
            })?;
        }
        debug!(
            end,
            records = self.stats.records,
            live_at_end = self.stats.live_at_end,
            "staleness tracking finished"
        );
        self.channels.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.channels.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelSet;
    use crate::graph::UnreachableCause;
    use lifetime_types::{SiteId, TraceEvent};

    fn tracker() -> StalenessTracker<Vec<u8>> {
        StalenessTracker::new(RecordChannels::from_writers(ChannelSet {
            staleness: Vec::new(),
            last_use: Vec::new(),
            unreachable: Vec::new(),
            site_updates: Vec::new(),
        }))
    }

    #[test]
    fn test_unreachable_writes_three_channels() -> Result<()> {
        let mut tracker = tracker();
        tracker.unreachable(&ReachabilityChange {
            object: ObjectId(4),
            site: SiteId::new("s"),
            created: 1,
            last_access: 5,
            unreachable_at: 9,
            cause: UnreachableCause::Released,
        })?;
        assert_eq!(tracker.stats().max_staleness, 4);
        assert_eq!(tracker.stats().mean_staleness(), Some(4.0));

        let out = tracker.into_channels().into_inner()?;
        assert_eq!(String::from_utf8(out.staleness)?, "4,1,s,5,9,4\n");
        assert_eq!(String::from_utf8(out.last_use)?, "4,1,5\n");
        assert_eq!(String::from_utf8(out.unreachable)?, "4,1,9\n");
        assert!(out.site_updates.is_empty());
        Ok(())
    }

    #[test]
    fn test_finish_reports_live_objects() -> Result<()> {
        let mut graph = HeapGraph::new(false);
        for (object, time) in [(3, 0), (1, 1)] {
            graph.ingest(&TraceEvent::Allocate {
                object: ObjectId(object),
                site: SiteId::new("s"),
                time,
            })?;
        }
        graph.ingest(&TraceEvent::Access {
            object: ObjectId(3),
            time: 6,
        })?;

        let mut tracker = tracker();
        tracker.finish(&graph, 10)?;
        assert_eq!(tracker.stats().live_at_end, 2);
        let out = tracker.into_channels().into_inner()?;
        assert_eq!(String::from_utf8(out.last_use)?, "1,1,1\n3,0,6\n");
        assert!(out.staleness.is_empty());
        Ok(())
    }

    #[test]
    fn test_site_update_record() -> Result<()> {
        let mut tracker = tracker();
        tracker.site_updated(&SiteUpdate {
            object: ObjectId(2),
            created: 0,
            previous: SiteId::new("old"),
            site: SiteId::new("new"),
            time: 7,
        })?;
        let out = tracker.into_channels().into_inner()?;
        assert_eq!(String::from_utf8(out.site_updates)?, "2,0,new,7\n");
        Ok(())
    }
}
