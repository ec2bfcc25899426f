//! `lifetime-analysis`: object lifetime and staleness analysis over heap traces.
//!
//! **Modes** (exactly one)
//! - `--ref`: reachability bookkeeping only
//! - `--context`: scope nesting only
//! - `--staleness`: write per-object record channels next to the trace
//! - `--site-stats`: aggregate those channels into `siteStats.json`
//! - `--access-paths`: explain watch-listed objects at given times
//! - `--pretty-print`: human-readable trace
//!
//! Without `--trace` the trace is read from stdin and `--directory` is required.
use clap::Parser;
use std::process::ExitCode;

use lifetime_analysis::args::Args;
use lifetime_analysis::logging::init_logging;
use lifetime_analysis::runner;

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(message) = args.validate() {
        eprintln!("error: {}", message);
        return ExitCode::FAILURE;
    }
    init_logging(args.verbose);

    match runner::run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
