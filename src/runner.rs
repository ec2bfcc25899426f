//! Mode runners for the CLI.
//!
//! Each runner takes a decoded trace plus [`AnalysisOptions`] and returns a
//! summary; [`run`] wires them to the parsed arguments and prints the result.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use lifetime_core::channels::ChannelSet;
use lifetime_core::{
    aggregate_directory, replay_context, write_site_stats, AccessPathResolver, AccessPathStats,
    ContextSummary, NoopObserver, RecordChannels, Replay, ReplaySummary, StalenessStats,
    StalenessTracker, WatchList,
};
use lifetime_trace::{parse_watch_list, pretty_print, TraceFile};

use crate::args::{AnalysisOptions, Args, Mode};
use crate::progress::progress_monitor;

const STDIN_ORIGIN: &str = "<stdin>";

/// Run the mode selected by `args`.
pub fn run(args: &Args) -> Result<()> {
    let options = AnalysisOptions::from_args(args);
    let mode = args.mode();
    info!(mode = mode.name(), directory = %options.directory.display(), "starting");

    // Fail on missing channels before reading anything.
    if mode == Mode::SiteStats {
        ChannelSet::existing(&options.directory)?;
    }
    let trace = load_trace(args.trace.as_deref())?;

    let summary = match mode {
        Mode::ReferenceCount => {
            let replay = run_reference_count(&trace, &options)?;
            json!({ "mode": mode.name(), "replay": replay })
        }
        Mode::Context => {
            let context = run_context(&trace, &options)?;
            json!({ "mode": mode.name(), "context": context })
        }
        Mode::Staleness => {
            let (replay, records) = run_staleness(&trace, &options)?;
            json!({
                "mode": mode.name(),
                "directory": options.directory.display().to_string(),
                "replay": replay,
                "records": records,
                "mean_staleness": records.mean_staleness(),
            })
        }
        Mode::SiteStats => {
            let (path, sites, orphans) = run_site_stats(&trace, &options)?;
            json!({
                "mode": mode.name(),
                "output": path.display().to_string(),
                "sites": sites,
                "orphan_records": orphans,
            })
        }
        Mode::AccessPaths => {
            let watch = load_watch_list(args.watch.as_deref())?;
            let out = open_output(args.output.as_deref())?;
            let (replay, paths) = run_access_paths(&trace, watch, out, &options)?;
            info!(resolved = paths.resolved, events = replay.events, "access paths resolved");
            return Ok(());
        }
        Mode::PrettyPrint => {
            let mut out = open_output(args.output.as_deref())?;
            let count = pretty_print(&trace, &mut out)?;
            info!(events = count, "trace printed");
            return Ok(());
        }
    };

    print_summary(&summary, args.json)
}

// ============================================================================
// Inputs and outputs
// ============================================================================

/// Read the trace from `path`, or from stdin in streaming mode.
pub fn load_trace(path: Option<&Path>) -> Result<TraceFile> {
    let trace = match path {
        Some(path) => TraceFile::open(path)?,
        None => TraceFile::from_reader(io::stdin().lock(), STDIN_ORIGIN)?,
    };
    Ok(trace)
}

pub fn load_watch_list(path: Option<&Path>) -> Result<WatchList> {
    let entries = match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open watch-list {}", path.display()))?;
            parse_watch_list(BufReader::new(file), &path.display().to_string())?
        }
        None => parse_watch_list(io::stdin().lock(), STDIN_ORIGIN)?,
    };
    Ok(WatchList::new(entries))
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

// ============================================================================
// Runners
// ============================================================================

/// Reachability bookkeeping with no analysis attached.
pub fn run_reference_count(trace: &TraceFile, options: &AnalysisOptions) -> Result<ReplaySummary> {
    let progress = progress_monitor(options.progress);
    let mut replay = Replay::new(options.module_scope, NoopObserver);
    let summary = replay.run(trace, progress.as_ref())?;
    warn_anomalies(&summary);
    Ok(summary)
}

pub fn run_context(trace: &TraceFile, options: &AnalysisOptions) -> Result<ContextSummary> {
    let progress = progress_monitor(options.progress);
    replay_context(trace, options.module_scope, progress.as_ref())
}

/// Full pipeline: replay with the staleness tracker writing into the options'
/// directory.
pub fn run_staleness(
    trace: &TraceFile,
    options: &AnalysisOptions,
) -> Result<(ReplaySummary, StalenessStats)> {
    let channels = RecordChannels::create(&options.directory)?;
    let progress = progress_monitor(options.progress);
    let mut replay = Replay::new(options.module_scope, StalenessTracker::new(channels));
    let summary = replay.run(trace, progress.as_ref())?;
    warn_anomalies(&summary);
    Ok((summary, replay.observer().stats().clone()))
}

/// Aggregate the channels of a previous staleness run; returns the written
/// path, the number of sites and the orphan record count.
pub fn run_site_stats(trace: &TraceFile, options: &AnalysisOptions) -> Result<(PathBuf, usize, u64)> {
    let report = aggregate_directory(trace, &options.directory)?;
    let path = write_site_stats(&options.directory, &report)?;
    Ok((path, report.sites.len(), report.orphan_records))
}

pub fn run_access_paths<W: Write>(
    trace: &TraceFile,
    watch: WatchList,
    out: W,
    options: &AnalysisOptions,
) -> Result<(ReplaySummary, AccessPathStats)> {
    let progress = progress_monitor(options.progress);
    let mut replay = Replay::new(options.module_scope, AccessPathResolver::new(watch, out));
    let summary = replay.run(trace, progress.as_ref())?;
    Ok((summary, replay.observer().stats().clone()))
}

fn warn_anomalies(summary: &ReplaySummary) {
    if summary.anomalies > 0 {
        warn!(
            anomalies = summary.anomalies,
            "trace touched objects after they became unreachable"
        );
    }
}

// ============================================================================
// Summary output
// ============================================================================

fn print_summary(summary: &Value, as_json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if as_json {
        serde_json::to_writer_pretty(&mut out, summary).context("Failed to write summary")?;
        writeln!(out)?;
    } else {
        for (key, value) in flatten(summary) {
            writeln!(out, "{}: {}", key, value)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// `key: value` lines for nested objects, with dotted keys.
fn flatten(value: &Value) -> Vec<(String, String)> {
    fn walk(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let key = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    walk(&key, child, out);
                }
            }
            Value::String(s) => out.push((prefix.to_string(), s.clone())),
            Value::Null => out.push((prefix.to_string(), "-".to_string())),
            other => out.push((prefix.to_string(), other.to_string())),
        }
    }
    let mut out = Vec::new();
    walk("", value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(dir: &Path) -> AnalysisOptions {
        AnalysisOptions {
            module_scope: false,
            progress: false,
            directory: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_staleness_then_site_stats() -> Result<()> {
        let dir = TempDir::new()?;
        let trace = TraceFile::from_string(
            "alloc 1 siteA 0\nwrite root x 1 1\naccess 1 2\nwrite root x null 3\nalloc 2 siteB 4\n",
            "t",
        );
        let (replay, records) = run_staleness(&trace, &options(dir.path()))?;
        assert_eq!(replay.unreachable, 1);
        assert_eq!(records.records, 1);
        assert_eq!(records.live_at_end, 1);

        let (path, sites, orphans) = run_site_stats(&trace, &options(dir.path()))?;
        assert_eq!((sites, orphans), (2, 0));
        let stats: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        assert_eq!(stats["siteA"]["mean_staleness"], 1.0);
        assert_eq!(stats["siteB"]["live_at_end"], 1);
        Ok(())
    }

    #[test]
    fn test_site_stats_without_channels_fails() -> Result<()> {
        let dir = TempDir::new()?;
        let trace = TraceFile::from_string("alloc 1 s 0\n", "t");
        let err = run_site_stats(&trace, &options(dir.path())).unwrap_err();
        assert!(err.to_string().contains("missing record channel"));
        assert!(!dir.path().join("siteStats.json").exists());
        Ok(())
    }

    #[test]
    fn test_access_paths_runner() -> Result<()> {
        let dir = TempDir::new()?;
        let trace = TraceFile::from_string("alloc 1 s 0\nwrite global g 1 1\n", "t");
        let watch = WatchList::new([(lifetime_types::ObjectId(1), 1)]);
        let mut out = Vec::new();
        let (_, stats) = run_access_paths(&trace, watch, &mut out, &options(dir.path()))?;
        assert_eq!(stats.paths, 1);
        assert_eq!(String::from_utf8(out)?, "1,1: global.g -> #1\n");
        Ok(())
    }

    #[test]
    fn test_flatten_summary() {
        let value = json!({"mode": "ref", "replay": {"events": 3, "mean": null}});
        assert_eq!(
            flatten(&value),
            vec![
                ("mode".to_string(), "ref".to_string()),
                ("replay.events".to_string(), "3".to_string()),
                ("replay.mean".to_string(), "-".to_string()),
            ]
        );
    }
}
