//! Terminal progress bar for long replays.

use parking_lot::Mutex;
use std::io::Write;

use lifetime_core::{ProgressMonitor, SilentProgress};

const BAR_CELLS: u64 = 50;

#[derive(Debug, Default)]
struct BarState {
    total: u64,
    /// Last percentage drawn.
    percent: Option<u64>,
}

/// Fixed-width bar on stderr: `[#####.....]    42%   (420/1000)`.
///
/// Redraws only when the integer percentage increases.
#[derive(Debug, Default)]
pub struct TerminalProgress {
    state: Mutex<BarState>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Render one bar line (without the leading carriage return).
pub fn render_bar(done: u64, total: u64) -> String {
    let percent = percent(done, total);
    let filled = (percent * BAR_CELLS / 100) as usize;
    format!(
        "[{}{}]    {}%   ({}/{})",
        "#".repeat(filled),
        ".".repeat(BAR_CELLS as usize - filled),
        percent,
        done,
        total
    )
}

fn percent(done: u64, total: u64) -> u64 {
    if total == 0 {
        100
    } else {
        (done.min(total) * 100) / total
    }
}

impl ProgressMonitor for TerminalProgress {
    fn start(&self, total: u64) {
        let mut state = self.state.lock();
        state.total = total;
        state.percent = None;
    }

    fn tick(&self, done: u64) {
        let mut state = self.state.lock();
        let now = percent(done, state.total);
        if state.percent.is_some_and(|drawn| drawn >= now) {
            return;
        }
        state.percent = Some(now);
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r{}", render_bar(done, state.total));
        let _ = err.flush();
    }

    fn finish(&self) {
        let state = self.state.lock();
        if state.percent.is_some() {
            let _ = writeln!(std::io::stderr());
        }
    }
}

/// The bar when `enabled`, otherwise a silent monitor.
pub fn progress_monitor(enabled: bool) -> Box<dyn ProgressMonitor> {
    if enabled {
        Box::new(TerminalProgress::new())
    } else {
        Box::new(SilentProgress)
    }
}
