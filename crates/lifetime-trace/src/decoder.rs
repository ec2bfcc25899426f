//! Line-oriented trace decoder.
//!
//! One event per line, whitespace separated, timestamp last:
//!
//! ```text
//! alloc  <object> <site> <time>
//! write  <owner> <slot> <target|null> <time>
//! access <object> <time>
//! enter  <frame> <time>
//! exit   <frame> <time>
//! site   <object> <site> <time>
//! flush  <time>
//! ```
//!
//! `<owner>` is `root`, `global`, `module`, `frame:<id>` or an object id.
//! Blank lines and lines starting with `#` are skipped.

use smallvec::SmallVec;
use std::io::Read;
use std::path::Path;

use lifetime_types::{FrameId, ObjectId, OwnerRef, SiteId, Timestamp, TraceEvent};

use crate::error::TraceError;

type Fields<'a> = SmallVec<[&'a str; 6]>;

/// A fully buffered trace that can be replayed any number of times.
#[derive(Debug, Clone)]
pub struct TraceFile {
    origin: String,
    text: String,
}

impl TraceFile {
    /// Read a trace file into memory.
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| TraceError::Io {
            origin: origin.clone(),
            source,
        })?;
        Ok(Self { origin, text })
    }

    /// Buffer a trace from any reader (e.g. stdin in streaming mode).
    pub fn from_reader<R: Read>(mut reader: R, origin: impl Into<String>) -> Result<Self, TraceError> {
        let origin = origin.into();
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|source| TraceError::Io {
                origin: origin.clone(),
                source,
            })?;
        Ok(Self { origin, text })
    }

    pub fn from_string(text: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            text: text.into(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Number of event lines, without decoding them. Used for progress totals.
    pub fn event_count(&self) -> usize {
        self.text.lines().filter(|line| is_event_line(line)).count()
    }

    /// Decode events in order, checking that time never goes backwards.
    pub fn events(&self) -> TraceEvents<'_> {
        TraceEvents {
            origin: &self.origin,
            lines: self.text.lines().enumerate(),
            last_time: None,
            failed: false,
        }
    }
}

/// Iterator over decoded events. Stops after the first error.
pub struct TraceEvents<'a> {
    origin: &'a str,
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    last_time: Option<Timestamp>,
    failed: bool,
}

impl Iterator for TraceEvents<'_> {
    type Item = Result<TraceEvent, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for (index, line) in self.lines.by_ref() {
            let line_no = index + 1;
            let event = match parse_line(line, self.origin, line_no) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            let time = event.time();
            if let Some(previous) = self.last_time {
                if time < previous {
                    self.failed = true;
                    return Some(Err(TraceError::TimeWentBackwards {
                        origin: self.origin.to_string(),
                        line: line_no,
                        previous,
                        time,
                    }));
                }
            }
            self.last_time = Some(time);
            return Some(Ok(event));
        }
        None
    }
}

fn is_event_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Decode a single trace line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str, origin: &str, line_no: usize) -> Result<Option<TraceEvent>, TraceError> {
    if !is_event_line(line) {
        return Ok(None);
    }
    let fields: Fields<'_> = line.split_whitespace().collect();
    let malformed = |reason: String| TraceError::malformed(origin, line_no, reason);

    let keyword = fields[0];
    let expect_arity = |arity: usize| -> Result<(), TraceError> {
        if fields.len() != arity {
            return Err(malformed(format!(
                "'{}' expects {} fields, found {}",
                keyword,
                arity - 1,
                fields.len() - 1
            )));
        }
        Ok(())
    };
    let number = |field: &str, what: &str| -> Result<u64, TraceError> {
        field
            .parse::<u64>()
            .map_err(|_| malformed(format!("invalid {} '{}'", what, field)))
    };

    let event = match keyword {
        "alloc" => {
            expect_arity(4)?;
            TraceEvent::Allocate {
                object: ObjectId(number(fields[1], "object id")?),
                site: SiteId::new(fields[2]),
                time: number(fields[3], "timestamp")?,
            }
        }
        "write" => {
            expect_arity(5)?;
            let owner = parse_owner(fields[1]).ok_or_else(|| {
                malformed(format!("invalid owner '{}'", fields[1]))
            })?;
            let target = match fields[3] {
                "null" => None,
                other => Some(ObjectId(number(other, "target id")?)),
            };
            TraceEvent::WriteRef {
                owner,
                slot: fields[2].to_string(),
                target,
                time: number(fields[4], "timestamp")?,
            }
        }
        "access" => {
            expect_arity(3)?;
            TraceEvent::Access {
                object: ObjectId(number(fields[1], "object id")?),
                time: number(fields[2], "timestamp")?,
            }
        }
        "enter" | "exit" => {
            expect_arity(3)?;
            let frame = FrameId(number(fields[1], "frame id")?);
            let time = number(fields[2], "timestamp")?;
            if keyword == "enter" {
                TraceEvent::ScopeEnter { frame, time }
            } else {
                TraceEvent::ScopeExit { frame, time }
            }
        }
        "site" => {
            expect_arity(4)?;
            TraceEvent::UpdateSite {
                object: ObjectId(number(fields[1], "object id")?),
                site: SiteId::new(fields[2]),
                time: number(fields[3], "timestamp")?,
            }
        }
        "flush" => {
            expect_arity(2)?;
            TraceEvent::Flush {
                time: number(fields[1], "timestamp")?,
            }
        }
        other => return Err(malformed(format!("unknown event kind '{}'", other))),
    };
    Ok(Some(event))
}

fn parse_owner(field: &str) -> Option<OwnerRef> {
    match field {
        "root" => Some(OwnerRef::Innermost),
        "global" => Some(OwnerRef::Global),
        "module" => Some(OwnerRef::Module),
        _ => {
            if let Some(frame) = field.strip_prefix("frame:") {
                frame.parse().ok().map(|id| OwnerRef::Frame(FrameId(id)))
            } else {
                field.parse().ok().map(|id| OwnerRef::Object(ObjectId(id)))
            }
        }
    }
}
