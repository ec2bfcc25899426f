use thiserror::Error;

use lifetime_types::Timestamp;

/// Errors raised while reading or decoding a trace or a watch-list.
///
/// Decoding errors always carry the 1-based line number; trace corruption
/// invalidates every later timestamp, so none of them is recoverable.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to read {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{origin}:{line}: {reason}")]
    Malformed {
        origin: String,
        line: usize,
        reason: String,
    },

    #[error("{origin}:{line}: timestamp {time} precedes previous event at {previous}")]
    TimeWentBackwards {
        origin: String,
        line: usize,
        previous: Timestamp,
        time: Timestamp,
    },
}

impl TraceError {
    pub(crate) fn malformed(origin: &str, line: usize, reason: impl Into<String>) -> Self {
        TraceError::Malformed {
            origin: origin.to_string(),
            line,
            reason: reason.into(),
        }
    }

    /// Line number the error refers to, if it came from decoding.
    pub fn line(&self) -> Option<usize> {
        match self {
            TraceError::Io { .. } => None,
            TraceError::Malformed { line, .. } | TraceError::TimeWentBackwards { line, .. } => {
                Some(*line)
            }
        }
    }
}
