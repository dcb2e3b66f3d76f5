//! Error types for transcript and issue-log reading.
//!
//! Only file-level conditions surface as [`ParseError`]. Line-level problems
//! are [`LineError`]s, counted in the parser state and logged, never
//! returned to the caller.

use std::fmt;
use std::io;
use std::path::PathBuf;

use hud_core::EventKind;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a parse was abandoned before committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Token,
    /// The caller's deadline elapsed.
    Deadline,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token => f.write_str("cancelled"),
            Self::Deadline => f.write_str("deadline exceeded"),
        }
    }
}

/// File-level failure of a parse attempt.
///
/// On any of these the previously committed snapshot and fingerprint are
/// left untouched.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Line {line} of {} exceeds {max} bytes", path.display())]
    LineTooLong { path: PathBuf, line: u64, max: usize },

    #[error("Parse {reason}")]
    Cancelled { reason: CancelReason },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ParseError {
    /// Maps an I/O error, turning `NotFound` into its own variant.
    pub(crate) fn from_io(path: &std::path::Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Why a single line was skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("invalid UTF-8")]
    InvalidUtf8,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("not a JSON object")]
    NotAnObject,

    #[error("bad {kind} payload: {reason}")]
    Payload { kind: EventKind, reason: String },
}

impl LineError {
    pub(crate) fn payload(kind: EventKind, reason: impl fmt::Display) -> Self {
        Self::Payload {
            kind,
            reason: reason.to_string(),
        }
    }
}

/// Number of malformed lines logged individually per parse.
pub const MAX_LOGGED_LINE_ERRORS: usize = 5;

/// Rate limiter for malformed-line warnings within one parse.
#[derive(Debug)]
pub(crate) struct LineErrorLog {
    seen: usize,
    limit: usize,
}

impl LineErrorLog {
    pub(crate) fn new(limit: usize) -> Self {
        Self { seen: 0, limit }
    }

    pub(crate) fn record(&mut self, path: &std::path::Path, line: u64, error: &LineError) {
        self.seen += 1;
        if self.seen <= self.limit {
            warn!(path = %path.display(), line, error = %error, "Skipping malformed line");
        }
    }

    /// Emits the summary of suppressed warnings, if any.
    pub(crate) fn finish(&self, path: &std::path::Path) {
        let suppressed = self.seen.saturating_sub(self.limit);
        if suppressed > 0 {
            debug!(path = %path.display(), suppressed, "Suppressed further malformed-line warnings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_maps_not_found() {
        let path = std::path::Path::new("/nope");
        let err = ParseError::from_io(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        let err = ParseError::from_io(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, ParseError::Io { .. }));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancel_display() {
        let err = ParseError::Cancelled {
            reason: CancelReason::Deadline,
        };
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Parse deadline exceeded");
    }

    #[test]
    fn test_line_error_display() {
        let err = LineError::payload(EventKind::Todo, "todo without id");
        assert_eq!(err.to_string(), "bad todo payload: todo without id");
    }
}
