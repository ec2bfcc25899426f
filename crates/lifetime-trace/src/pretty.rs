//! Human-readable rendering of decoded traces.

use std::io::Write;

use lifetime_types::{OwnerRef, TraceEvent};

use crate::decoder::TraceFile;
use crate::error::TraceError;

/// Render one event for humans, e.g. `[t=3]   write  global.x := null`.
pub fn render_pretty(event: &TraceEvent) -> String {
    let body = match event {
        TraceEvent::Allocate { object, site, .. } => format!("alloc  #{} @ {}", object, site),
        TraceEvent::WriteRef {
            owner,
            slot,
            target,
            ..
        } => {
            let owner = match owner {
                OwnerRef::Innermost => "<scope>".to_string(),
                OwnerRef::Object(object) => format!("#{}", object),
                other => other.to_string(),
            };
            let target = target
                .map(|t| format!("#{}", t))
                .unwrap_or_else(|| "null".to_string());
            format!("write  {}.{} := {}", owner, slot, target)
        }
        TraceEvent::Access { object, .. } => format!("use    #{}", object),
        TraceEvent::ScopeEnter { frame, .. } => format!("enter  frame {}", frame),
        TraceEvent::ScopeExit { frame, .. } => format!("exit   frame {}", frame),
        TraceEvent::UpdateSite { object, site, .. } => format!("site   #{} -> {}", object, site),
        TraceEvent::Flush { .. } => "flush  top level".to_string(),
    };
    format!("[t={:>6}] {}", event.time(), body)
}

/// Decode the whole trace and write one pretty line per event.
///
/// Returns the number of events written. Decoding stops at the first error.
pub fn pretty_print<W: Write>(trace: &TraceFile, out: &mut W) -> Result<usize, TraceError> {
    let io_err = |source| TraceError::Io {
        origin: "output".to_string(),
        source,
    };
    let mut count = 0;
    for event in trace.events() {
        let event = event?;
        writeln!(out, "{}", render_pretty(&event)).map_err(io_err)?;
        count += 1;
    }
    out.flush().map_err(io_err)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_pretty() {
        let trace = TraceFile::from_string("alloc 1 a.js:1:1 0\nwrite root x 1 12\n", "t");
        let mut out = Vec::new();
        let count = pretty_print(&trace, &mut out).unwrap();
        assert_eq!(count, 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "[t=     0] alloc  #1 @ a.js:1:1");
        assert_eq!(lines[1], "[t=    12] write  <scope>.x := #1");
    }
}
