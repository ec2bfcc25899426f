use clap::{ArgGroup, Parser};
use std::path::{Path, PathBuf};

/// Environment variable that disables the progress bar (any non-empty value
/// other than `0`).
pub const NO_PROGRESS_ENV: &str = "LIFETIME_ANALYSIS_NO_PROGRESS";

/// Analysis to run over the trace. Exactly one is selected per invocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    ReferenceCount,
    Context,
    Staleness,
    SiteStats,
    AccessPaths,
    PrettyPrint,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::ReferenceCount => "ref",
            Mode::Context => "context",
            Mode::Staleness => "staleness",
            Mode::SiteStats => "site-stats",
            Mode::AccessPaths => "access-paths",
            Mode::PrettyPrint => "pretty-print",
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Object lifetime and staleness analysis over heap traces")]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .multiple(false)
        .args(["reference_count", "context", "staleness", "site_stats", "access_paths", "pretty_print"])
))]
pub struct Args {
    /// Replay reachability bookkeeping only (no records written).
    #[arg(long = "ref")]
    pub reference_count: bool,

    /// Replay scope entry/exit only, validating frame nesting.
    #[arg(long)]
    pub context: bool,

    /// Full pipeline: write staleness, last-use, unreachable and site-update
    /// records into the trace directory.
    #[arg(long)]
    pub staleness: bool,

    /// Aggregate the records of a previous `--staleness` run per allocation
    /// site into `siteStats.json`.
    #[arg(long)]
    pub site_stats: bool,

    /// Resolve access paths for the objects in the watch-list.
    #[arg(long)]
    pub access_paths: bool,

    /// Decode the trace and print it in human-readable form.
    #[arg(long)]
    pub pretty_print: bool,

    /// Trace file. When omitted the trace is read from stdin.
    #[arg(long, value_name = "PATH")]
    pub trace: Option<PathBuf>,

    /// Directory for record channels and `siteStats.json` (default: the
    /// trace's directory). Required when the trace comes from stdin.
    #[arg(long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Watch-list for `--access-paths` (`objectId,timestamp` per line).
    /// Defaults to stdin.
    #[arg(long, value_name = "PATH")]
    pub watch: Option<PathBuf>,

    /// Write `--access-paths` or `--pretty-print` output to a file instead of stdout.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Model a module scope around top-level code, released at end of trace.
    #[arg(long, default_value_t = false)]
    pub nodejs: bool,

    /// Do not draw the progress bar.
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    /// Print the run summary as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Debug logging on stderr (overrides RUST_LOG).
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    pub fn mode(&self) -> Mode {
        if self.reference_count {
            Mode::ReferenceCount
        } else if self.context {
            Mode::Context
        } else if self.staleness {
            Mode::Staleness
        } else if self.site_stats {
            Mode::SiteStats
        } else if self.access_paths {
            Mode::AccessPaths
        } else {
            Mode::PrettyPrint
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        // Streaming mode has no trace path to derive the output directory from
        if self.trace.is_none() && self.directory.is_none() {
            return Err("In streaming mode you must provide a directory (--directory)".to_string());
        }

        let mode = self.mode();
        if self.watch.is_some() && mode != Mode::AccessPaths {
            return Err("--watch is only valid with --access-paths".to_string());
        }
        if self.output.is_some() && !matches!(mode, Mode::AccessPaths | Mode::PrettyPrint) {
            return Err("--output is only valid with --access-paths or --pretty-print".to_string());
        }
        if mode == Mode::AccessPaths && self.trace.is_none() && self.watch.is_none() {
            return Err(
                "--access-paths with a trace on stdin requires --watch for the watch-list".to_string(),
            );
        }
        if self.json && matches!(mode, Mode::AccessPaths | Mode::PrettyPrint) {
            return Err(format!("--json has no summary to print with --{}", mode.name()));
        }
        Ok(())
    }
}

/// Settings threaded into every runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub module_scope: bool,
    pub progress: bool,
    /// Where record channels are written and read.
    pub directory: PathBuf,
}

impl AnalysisOptions {
    pub fn from_args(args: &Args) -> Self {
        let env_disabled = std::env::var(NO_PROGRESS_ENV)
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false);
        Self {
            module_scope: args.nodejs,
            progress: !args.no_progress && !env_disabled,
            directory: channel_directory(args.directory.as_deref(), args.trace.as_deref()),
        }
    }
}

fn channel_directory(directory: Option<&Path>, trace: Option<&Path>) -> PathBuf {
    if let Some(dir) = directory {
        return dir.to_path_buf();
    }
    match trace.and_then(Path::parent) {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("lifetime-analysis").chain(argv.iter().copied()))
    }

    #[test]
    fn test_exactly_one_mode() {
        assert!(parse(&["--trace", "t"]).is_err());
        assert!(parse(&["--trace", "t", "--ref", "--staleness"]).is_err());
        let args = parse(&["--trace", "t", "--ref"]).unwrap();
        assert_eq!(args.mode(), Mode::ReferenceCount);
        let args = parse(&["--trace", "t", "--site-stats"]).unwrap();
        assert_eq!(args.mode(), Mode::SiteStats);
    }

    #[test]
    fn test_streaming_requires_directory() {
        let args = parse(&["--staleness"]).unwrap();
        assert_eq!(
            args.validate().unwrap_err(),
            "In streaming mode you must provide a directory (--directory)"
        );
        let args = parse(&["--staleness", "--directory", "out"]).unwrap();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_flag_combinations() {
        let args = parse(&["--trace", "t", "--staleness", "--watch", "w"]).unwrap();
        assert!(args.validate().is_err());
        let args = parse(&["--directory", "d", "--access-paths"]).unwrap();
        assert!(args.validate().unwrap_err().contains("--watch"));
        let args = parse(&["--trace", "t", "--pretty-print", "--output", "o"]).unwrap();
        assert!(args.validate().is_ok());
        let args = parse(&["--trace", "t", "--pretty-print", "--json"]).unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_channel_directory_defaults_to_trace_dir() {
        assert_eq!(
            channel_directory(None, Some(Path::new("runs/app/trace"))),
            PathBuf::from("runs/app")
        );
        assert_eq!(channel_directory(None, Some(Path::new("trace"))), PathBuf::from("."));
        assert_eq!(
            channel_directory(Some(Path::new("out")), Some(Path::new("runs/trace"))),
            PathBuf::from("out")
        );
    }
}
