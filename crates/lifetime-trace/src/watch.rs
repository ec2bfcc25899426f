//! Watch-list decoding for access-path queries.
//!
//! One `objectId,timestamp` pair per line. Blank lines and `#` comments are
//! skipped; the same object may appear on several lines.

use std::io::BufRead;

use lifetime_types::{ObjectId, Timestamp};

use crate::error::TraceError;

/// Parse every `(object, trigger time)` pair in input order.
pub fn parse_watch_list<R: BufRead>(
    reader: R,
    origin: &str,
) -> Result<Vec<(ObjectId, Timestamp)>, TraceError> {
    let mut entries = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|source| TraceError::Io {
            origin: origin.to_string(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (object, time) = trimmed.split_once(',').ok_or_else(|| {
            TraceError::malformed(origin, line_no, "expected 'objectId,timestamp'")
        })?;
        let object = object.trim().parse::<u64>().map_err(|_| {
            TraceError::malformed(origin, line_no, format!("invalid object id '{}'", object.trim()))
        })?;
        let time = time.trim().parse::<u64>().map_err(|_| {
            TraceError::malformed(origin, line_no, format!("invalid timestamp '{}'", time.trim()))
        })?;
        entries.push((ObjectId(object), time));
    }
    tracing::debug!(entries = entries.len(), origin, "parsed watch-list");
    Ok(entries)
}
