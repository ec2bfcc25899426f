//! Allocation-site aggregation over the record channels of a staleness run.
//!
//! Records are joined per incarnation (object id plus creation time), so the
//! result does not depend on the order rows appear in any channel.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use lifetime_trace::TraceFile;
use lifetime_types::{
    Incarnation, LastUseRecord, SiteId, SiteUpdateRecord, Timestamp, TraceEvent, UnreachableRecord,
};

use crate::channels::{atomic_write_json, read_records, ChannelSet, SITE_STATS_FILE};

/// An allocation as seen in the trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub incarnation: Incarnation,
    pub site: SiteId,
}

/// Per-site summary written to `siteStats.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSummary {
    pub objects: u64,
    pub unreachable: u64,
    pub live_at_end: u64,
    pub mean_staleness: Option<f64>,
    pub max_staleness: Option<u64>,
    pub earliest_creation: Timestamp,
    pub latest_creation: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteStatsReport {
    pub sites: BTreeMap<SiteId, SiteSummary>,
    /// Channel rows naming an incarnation the trace never allocated.
    pub orphan_records: u64,
}

/// All allocations in the trace, in trace order.
///
/// Two allocations of one id at the same time cannot be told apart in the
/// channels, so they are rejected.
pub fn collect_allocations(trace: &TraceFile) -> Result<Vec<Allocation>> {
    let mut allocations = Vec::new();
    let mut seen = HashSet::new();
    for event in trace.events() {
        if let TraceEvent::Allocate { object, site, time } = event? {
            let incarnation = Incarnation::new(object, time);
            if !seen.insert(incarnation) {
                bail!(
                    "{}: object {} allocated twice at t={}; its records cannot be told apart",
                    trace.origin(),
                    object,
                    time
                );
            }
            allocations.push(Allocation { incarnation, site });
        }
    }
    Ok(allocations)
}

#[derive(Debug, Clone)]
struct ObjectFacts {
    site: SiteId,
    created: Timestamp,
    last_use: Option<Timestamp>,
    unreachable: Option<Timestamp>,
    latest_update: Option<(Timestamp, SiteId)>,
}

impl ObjectFacts {
    fn effective_site(&self) -> &SiteId {
        match &self.latest_update {
            Some((_, site)) => site,
            None => &self.site,
        }
    }

    fn staleness(&self) -> Option<u64> {
        Some(self.unreachable?.saturating_sub(self.last_use?))
    }
}

#[derive(Debug, Clone, Default)]
struct SiteAccumulator {
    objects: u64,
    unreachable: u64,
    live_at_end: u64,
    staleness_samples: u64,
    staleness_sum: u128,
    max_staleness: Option<u64>,
    earliest_creation: Option<Timestamp>,
    latest_creation: Option<Timestamp>,
}

impl SiteAccumulator {
    fn add(&mut self, facts: &ObjectFacts) {
        self.objects += 1;
        if facts.unreachable.is_some() {
            self.unreachable += 1;
        } else {
            self.live_at_end += 1;
        }
        if let Some(staleness) = facts.staleness() {
            self.staleness_samples += 1;
            self.staleness_sum += u128::from(staleness);
            self.max_staleness = self.max_staleness.max(Some(staleness));
        }
        self.earliest_creation = Some(min_opt(self.earliest_creation, facts.created));
        self.latest_creation = self.latest_creation.max(Some(facts.created));
    }

    fn merge(mut self, other: Self) -> Self {
        self.objects += other.objects;
        self.unreachable += other.unreachable;
        self.live_at_end += other.live_at_end;
        self.staleness_samples += other.staleness_samples;
        self.staleness_sum += other.staleness_sum;
        self.max_staleness = self.max_staleness.max(other.max_staleness);
        self.earliest_creation = match (self.earliest_creation, other.earliest_creation) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.latest_creation = self.latest_creation.max(other.latest_creation);
        self
    }

    fn summary(&self) -> SiteSummary {
        SiteSummary {
            objects: self.objects,
            unreachable: self.unreachable,
            live_at_end: self.live_at_end,
            mean_staleness: (self.staleness_samples > 0)
                .then(|| self.staleness_sum as f64 / self.staleness_samples as f64),
            max_staleness: self.max_staleness,
            earliest_creation: self.earliest_creation.unwrap_or_default(),
            latest_creation: self.latest_creation.unwrap_or_default(),
        }
    }
}

fn min_opt(current: Option<Timestamp>, value: Timestamp) -> Timestamp {
    current.map_or(value, |c| c.min(value))
}

type SiteMap = BTreeMap<SiteId, SiteAccumulator>;

/// Join the channels onto the trace's allocations and group by effective site.
pub fn aggregate(
    allocations: &[Allocation],
    last_use: &[LastUseRecord],
    unreachable: &[UnreachableRecord],
    site_updates: &[SiteUpdateRecord],
) -> SiteStatsReport {
    let mut facts: HashMap<Incarnation, ObjectFacts> = allocations
        .iter()
        .map(|a| {
            (
                a.incarnation,
                ObjectFacts {
                    site: a.site.clone(),
                    created: a.incarnation.created,
                    last_use: None,
                    unreachable: None,
                    latest_update: None,
                },
            )
        })
        .collect();

    let mut orphan_records = 0u64;
    for record in last_use {
        match facts.get_mut(&record.incarnation()) {
            Some(f) => f.last_use = f.last_use.max(Some(record.last_use)),
            None => orphan_records += 1,
        }
    }
    for record in unreachable {
        match facts.get_mut(&record.incarnation()) {
            Some(f) => f.unreachable = Some(min_opt(f.unreachable, record.unreachable)),
            None => orphan_records += 1,
        }
    }
    for record in site_updates {
        match facts.get_mut(&record.incarnation()) {
            Some(f) => {
                let update = (record.time, record.site.clone());
                if f.latest_update.as_ref().map_or(true, |latest| update > *latest) {
                    f.latest_update = Some(update);
                }
            }
            None => orphan_records += 1,
        }
    }
    if orphan_records > 0 {
        warn!(orphan_records, "channel records name objects missing from the trace");
    }

    let grouped: SiteMap = facts
        .par_iter()
        .fold(SiteMap::new, |mut acc, (_, f)| {
            acc.entry(f.effective_site().clone()).or_default().add(f);
            acc
        })
        .reduce(SiteMap::new, |mut left, right| {
            for (site, acc) in right {
                let merged = match left.remove(&site) {
                    Some(existing) => existing.merge(acc),
                    None => acc,
                };
                left.insert(site, merged);
            }
            left
        });

    SiteStatsReport {
        sites: grouped
            .iter()
            .map(|(site, acc)| (site.clone(), acc.summary()))
            .collect(),
        orphan_records,
    }
}

/// Aggregate a trace directory produced by a staleness run.
///
/// Fails before reading anything if a required channel is missing.
pub fn aggregate_directory(trace: &TraceFile, dir: &Path) -> Result<SiteStatsReport> {
    let paths = ChannelSet::existing(dir)?;
    let allocations = collect_allocations(trace)
        .with_context(|| format!("Failed to decode trace {}", trace.origin()))?;
    let last_use: Vec<LastUseRecord> = read_records(&paths.last_use)?;
    let unreachable: Vec<UnreachableRecord> = read_records(&paths.unreachable)?;
    let site_updates: Vec<SiteUpdateRecord> = read_records(&paths.site_updates)?;
    info!(
        allocations = allocations.len(),
        last_use = last_use.len(),
        unreachable = unreachable.len(),
        site_updates = site_updates.len(),
        "aggregating allocation sites"
    );
    Ok(aggregate(&allocations, &last_use, &unreachable, &site_updates))
}

/// Write `siteStats.json` into `dir` and return its path.
pub fn write_site_stats(dir: &Path, report: &SiteStatsReport) -> Result<PathBuf> {
    let path = dir.join(SITE_STATS_FILE);
    atomic_write_json(&path, &report.sites)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifetime_types::ObjectId;

    fn alloc(object: u64, created: Timestamp, site: &str) -> Allocation {
        Allocation {
            incarnation: Incarnation::new(ObjectId(object), created),
            site: SiteId::new(site),
        }
    }

    fn last_use(object: u64, created: Timestamp, last_use: Timestamp) -> LastUseRecord {
        LastUseRecord {
            object: ObjectId(object),
            created,
            last_use,
        }
    }

    fn unreachable(object: u64, created: Timestamp, at: Timestamp) -> UnreachableRecord {
        UnreachableRecord {
            object: ObjectId(object),
            created,
            unreachable: at,
        }
    }

    #[test]
    fn test_per_site_summary() {
        let allocations = vec![alloc(1, 0, "a"), alloc(2, 1, "a"), alloc(3, 2, "b")];
        let report = aggregate(
            &allocations,
            &[last_use(1, 0, 2), last_use(2, 1, 3), last_use(3, 2, 2)],
            &[unreachable(1, 0, 3), unreachable(2, 1, 9)],
            &[],
        );
        let a = &report.sites[&SiteId::new("a")];
        assert_eq!(a.objects, 2);
        assert_eq!(a.unreachable, 2);
        assert_eq!(a.live_at_end, 0);
        assert_eq!(a.mean_staleness, Some(3.5));
        assert_eq!(a.max_staleness, Some(6));
        assert_eq!((a.earliest_creation, a.latest_creation), (0, 1));

        let b = &report.sites[&SiteId::new("b")];
        assert_eq!(b.live_at_end, 1);
        assert_eq!(b.mean_staleness, None);
        assert_eq!(report.orphan_records, 0);
    }

    #[test]
    fn test_site_update_moves_object() {
        let allocations = vec![alloc(1, 0, "a")];
        let updates = vec![
            SiteUpdateRecord {
                object: ObjectId(1),
                created: 0,
                site: SiteId::new("c"),
                time: 5,
            },
            SiteUpdateRecord {
                object: ObjectId(1),
                created: 0,
                site: SiteId::new("b"),
                time: 2,
            },
        ];
        let report = aggregate(&allocations, &[], &[], &updates);
        assert_eq!(report.sites.keys().collect::<Vec<_>>(), vec![&SiteId::new("c")]);
    }

    #[test]
    fn test_orphans_and_reused_ids() {
        let allocations = vec![alloc(1, 0, "a"), alloc(1, 5, "b")];
        let report = aggregate(
            &allocations,
            &[last_use(1, 0, 1), last_use(1, 5, 6), last_use(9, 0, 0)],
            &[unreachable(1, 0, 4)],
            &[],
        );
        assert_eq!(report.orphan_records, 1);
        assert_eq!(report.sites[&SiteId::new("a")].max_staleness, Some(3));
        assert_eq!(report.sites[&SiteId::new("b")].live_at_end, 1);
    }

    #[test]
    fn test_same_time_reallocation_is_rejected() {
        let trace = TraceFile::from_string(
            "alloc 1 siteA 0\nwrite global x 1 0\nwrite global x null 0\nalloc 1 siteA 0\n",
            "clash",
        );
        let err = collect_allocations(&trace).unwrap_err();
        assert!(err.to_string().contains("object 1 allocated twice at t=0"));

        let trace = TraceFile::from_string("alloc 1 siteA 0\nalloc 1 siteA 1\n", "reuse");
        assert_eq!(collect_allocations(&trace).unwrap().len(), 2);
    }
}
