//! Object lifetime analysis CLI
//!
//! Replays heap event traces to answer lifetime questions about the objects a
//! program allocated:
//!
//! - **Staleness**: how long each object stayed reachable after its last use
//! - **Allocation-site statistics**: staleness and survival grouped by site
//! - **Access paths**: which chain of references keeps an object alive
//!
//! The engine lives in `lifetime-core`; this crate holds the command-line
//! surface: [`args`] for flags, [`runner`] for the modes, plus [`progress`]
//! and [`logging`].

pub mod args;
pub mod logging;
pub mod progress;
pub mod runner;
