//! End-to-end properties of the replay engine: staleness records, cycle
//! sweeps, determinism, access paths and aggregation order independence.

use anyhow::Result;
use std::path::Path;
use tempfile::TempDir;

use lifetime_core::channels::{read_records, ChannelSet};
use lifetime_core::site_stats::collect_allocations;
use lifetime_core::{
    aggregate, aggregate_directory, resolve_access_path, AccessPathResolver, AccessPathResult,
    HeapGraph, NoopObserver, RecordChannels, Replay, SilentProgress, StalenessTracker, WatchList,
};
use lifetime_trace::TraceFile;
use lifetime_types::{
    LastUseRecord, ObjectId, Owner, SiteId, SiteUpdateRecord, StalenessRecord, UnreachableRecord,
};

const LINKED_LIST: &str = "\
# a list built in a frame, partially dropped, plus a cycle
enter 1 0
alloc 1 list.js:1:1 1
alloc 2 list.js:2:1 2
alloc 3 list.js:2:1 3
write global head 1 4
write 1 next 2 5
write 2 next 3 6
write 3 prev 2 7
access 3 8
site 3 list.js:9:9 9
alloc 4 tmp.js:1:1 10
exit 1 11
write 1 next null 12
access 1 13
alloc 5 cyc.js:1:1 14
alloc 6 cyc.js:1:1 14
write global a 5 15
write 5 peer 6 16
write 6 peer 5 17
write global a null 18
";

fn staleness_run(trace: &TraceFile, dir: &Path) -> Result<()> {
    let channels = RecordChannels::create(dir)?;
    let mut replay = Replay::new(false, StalenessTracker::new(channels));
    replay.run(trace, &SilentProgress)?;
    Ok(())
}

#[test]
fn test_concrete_scenario() -> Result<()> {
    let trace = TraceFile::from_string(
        "alloc 1 siteA 0\nwrite root x 1 1\naccess 1 2\nwrite root x null 3\n",
        "scenario",
    );
    let dir = TempDir::new()?;
    staleness_run(&trace, dir.path())?;

    let paths = ChannelSet::in_dir(dir.path());
    let records: Vec<StalenessRecord> = read_records(&paths.staleness)?;
    assert_eq!(
        records,
        vec![StalenessRecord {
            object: ObjectId(1),
            created: 0,
            site: SiteId::new("siteA"),
            last_use: 2,
            unreachable: 3,
            staleness: 1,
        }]
    );
    Ok(())
}

#[test]
fn test_cycle_reported_in_one_sweep() -> Result<()> {
    let trace = TraceFile::from_string(
        "alloc 1 A 0\nalloc 2 B 0\nwrite root a 1 1\nwrite root b 2 1\n\
         write 1 to 2 2\nwrite 2 to 1 3\nwrite root a null 4\nwrite root b null 5\n",
        "cycle",
    );
    let dir = TempDir::new()?;
    staleness_run(&trace, dir.path())?;

    let unreachable: Vec<UnreachableRecord> =
        read_records(&ChannelSet::in_dir(dir.path()).unreachable)?;
    let rows: Vec<(u64, u64)> = unreachable.iter().map(|r| (r.object.0, r.unreachable)).collect();
    assert_eq!(rows, vec![(1, 5), (2, 5)]);
    Ok(())
}

#[test]
fn test_lifetime_ordering_invariant() -> Result<()> {
    let trace = TraceFile::from_string(LINKED_LIST, "list");
    let dir = TempDir::new()?;
    staleness_run(&trace, dir.path())?;

    let records: Vec<StalenessRecord> = read_records(&ChannelSet::in_dir(dir.path()).staleness)?;
    assert!(!records.is_empty());
    for record in &records {
        assert!(record.unreachable >= record.last_use, "{:?}", record);
        assert!(record.last_use >= record.created, "{:?}", record);
        assert_eq!(record.staleness, record.unreachable - record.last_use);
    }
    Ok(())
}

#[test]
fn test_unreachable_is_final() -> Result<()> {
    let trace = TraceFile::from_string(LINKED_LIST, "list");
    let mut graph = HeapGraph::new(false);
    let mut dead = Vec::new();
    for event in trace.events() {
        dead.extend(graph.ingest(&event?)?.into_iter().map(|c| c.object));
        for object in &dead {
            assert!(!graph.is_reachable(*object), "object {} came back", object);
        }
    }
    // 4 dies with its frame, 2 and 3 once the list is cut, 5 and 6 as a cycle.
    dead.sort();
    assert_eq!(dead, vec![ObjectId(2), ObjectId(3), ObjectId(4), ObjectId(5), ObjectId(6)]);
    assert!(graph.is_reachable(ObjectId(1)));
    Ok(())
}

#[test]
fn test_channels_are_deterministic() -> Result<()> {
    let trace = TraceFile::from_string(LINKED_LIST, "list");
    let first = TempDir::new()?;
    let second = TempDir::new()?;
    staleness_run(&trace, first.path())?;
    staleness_run(&trace, second.path())?;

    for name in ["staleness-trace", "lastuse-trace", "unreachable-trace", "updiid-trace"] {
        let a = std::fs::read(first.path().join(name))?;
        let b = std::fs::read(second.path().join(name))?;
        assert_eq!(a, b, "{} differs between runs", name);
    }
    let updates = std::fs::read_to_string(first.path().join("updiid-trace"))?;
    assert_eq!(updates, "3,3,list.js:9:9,9\n");
    Ok(())
}

#[test]
fn test_access_paths_start_at_roots_and_end_at_target() -> Result<()> {
    let trace = TraceFile::from_string(LINKED_LIST, "list");
    let mut graph = HeapGraph::new(false);
    for event in trace.events() {
        let event = event?;
        let time = event.time();
        graph.ingest(&event)?;
        for id in 1..=6 {
            let object = ObjectId(id);
            match resolve_access_path(&graph, object) {
                AccessPathResult::Path(path) => {
                    assert!(graph.is_reachable(object));
                    assert_eq!(path.target, object);
                    let root = path.root().expect("non-empty path");
                    assert!(root.is_root() && graph.roots().is_active(root), "t={}", time);
                    for pair in path.steps.windows(2) {
                        assert!(matches!(pair[1].owner, Owner::Object(_)));
                    }
                }
                AccessPathResult::Unreachable { since } => {
                    assert!(!graph.is_reachable(object));
                    assert!(since <= time);
                }
                AccessPathResult::Detached | AccessPathResult::Unknown => {}
            }
        }
    }
    Ok(())
}

#[test]
fn test_watch_list_replay() -> Result<()> {
    let trace = TraceFile::from_string(LINKED_LIST, "list");
    let watch = WatchList::new([(ObjectId(3), 8), (ObjectId(3), 12), (ObjectId(5), 16), (ObjectId(9), 99)]);
    let mut replay = Replay::new(false, AccessPathResolver::new(watch, Vec::new()));
    replay.run(&trace, &SilentProgress)?;
    let output = String::from_utf8(replay.into_observer().into_inner())?;
    assert_eq!(
        output.lines().collect::<Vec<_>>(),
        vec![
            "3,8: global.head -> #1.next -> #2.next -> #3",
            "3,12: no path (unreachable since t=12)",
            "5,16: global.a -> #5",
            "9,99: no path (object never allocated)",
        ]
    );
    Ok(())
}

#[test]
fn test_aggregation_ignores_record_order() -> Result<()> {
    let trace = TraceFile::from_string(LINKED_LIST, "list");
    let dir = TempDir::new()?;
    staleness_run(&trace, dir.path())?;

    let paths = ChannelSet::in_dir(dir.path());
    let allocations = collect_allocations(&trace)?;
    let mut last_use: Vec<LastUseRecord> = read_records(&paths.last_use)?;
    let mut unreachable: Vec<UnreachableRecord> = read_records(&paths.unreachable)?;
    let mut updates: Vec<SiteUpdateRecord> = read_records(&paths.site_updates)?;

    let expected = aggregate(&allocations, &last_use, &unreachable, &updates);
    let from_dir = aggregate_directory(&trace, dir.path())?;
    assert_eq!(expected, from_dir);

    last_use.reverse();
    unreachable.rotate_left(2);
    updates.reverse();
    let mut shuffled_allocations = allocations.clone();
    shuffled_allocations.rotate_right(3);
    let shuffled = aggregate(&shuffled_allocations, &last_use, &unreachable, &updates);
    assert_eq!(expected, shuffled);

    let moved = &expected.sites[&SiteId::new("list.js:9:9")];
    assert_eq!(moved.objects, 1);
    let list = &expected.sites[&SiteId::new("list.js:1:1")];
    assert_eq!(list.live_at_end, 1);
    assert_eq!(expected.sites[&SiteId::new("cyc.js:1:1")].unreachable, 2);
    Ok(())
}

#[test]
fn test_reference_count_only_replay() -> Result<()> {
    let trace = TraceFile::from_string(LINKED_LIST, "list");
    let mut replay = Replay::new(false, NoopObserver);
    let summary = replay.run(&trace, &SilentProgress)?;
    assert_eq!(summary.allocated, 6);
    assert_eq!(summary.unreachable, 5);
    // 2 and 3 hold each other once the list is cut; 5 and 6 are a cycle.
    assert_eq!(summary.swept, 4);
    assert_eq!(summary.scope_released, 1);
    assert_eq!(summary.live_at_end, 1);
    assert_eq!(summary.max_depth, 1);
    Ok(())
}

#[test]
fn test_records_before_malformed_event_are_flushed() -> Result<()> {
    let trace = TraceFile::from_string(
        "alloc 1 s 0\nwrite global x 1 1\nwrite global x null 2\naccess 9 3\n",
        "broken",
    );
    let dir = TempDir::new()?;
    let err = staleness_run(&trace, dir.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("broken: event 4"));

    let paths = ChannelSet::in_dir(dir.path());
    assert_eq!(std::fs::read_to_string(&paths.staleness)?, "1,0,s,0,2,2\n");
    assert_eq!(std::fs::read_to_string(&paths.unreachable)?, "1,0,2\n");
    assert_eq!(std::fs::read_to_string(&paths.last_use)?, "1,0,0\n");
    Ok(())
}

#[test]
fn test_same_time_reallocation_stops_the_run() -> Result<()> {
    let trace = TraceFile::from_string(
        "alloc 1 siteA 0\nwrite global x 1 0\nwrite global x null 0\nalloc 1 siteA 0\nwrite global y 1 0\n",
        "clash",
    );
    let mut replay = Replay::new(false, NoopObserver);
    let err = replay.run(&trace, &SilentProgress).unwrap_err();
    assert!(format!("{:#}", err).contains("reallocated at the creation time"));
    Ok(())
}
