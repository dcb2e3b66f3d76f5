//! Issue-tracker log reader.
//!
//! Reads a small JSON-lines issue log (one issue record per line, later
//! records for the same id replace earlier ones) with the same
//! skip-if-unchanged rule as the transcript parser. Synchronous, since these
//! logs stay small.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use hud_core::{FileFingerprint, FingerprintCache};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::aggregate::ParserState;
use crate::error::{LineError, LineErrorLog, ParseError, MAX_LOGGED_LINE_ERRORS};
use crate::parser::{ParseOutcome, ParserConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IssueStatus {
    #[default]
    Open,
    InProgress,
    Blocked,
    Closed,
}

impl IssueStatus {
    /// Lenient mapping; unrecognized labels count as open.
    pub fn from_label(label: &str) -> Self {
        match label {
            "in_progress" | "in-progress" => Self::InProgress,
            "blocked" => Self::Blocked,
            "closed" | "done" => Self::Closed,
            _ => Self::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub status: IssueStatus,
    pub priority: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueCounts {
    pub open: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub closed: usize,
}

impl IssueCounts {
    pub fn total(&self) -> usize {
        self.open + self.in_progress + self.blocked + self.closed
    }
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    id: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<u8>,
}

impl RawIssue {
    fn into_issue(self) -> Option<Issue> {
        let id = match self.id {
            Value::String(s) if !s.is_empty() => s,
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Issue {
            id,
            title: self.title.unwrap_or_default(),
            status: self
                .status
                .as_deref()
                .map(IssueStatus::from_label)
                .unwrap_or_default(),
            priority: self.priority,
        })
    }
}

/// Reader for one issue log file.
#[derive(Debug)]
pub struct IssueLog {
    path: PathBuf,
    config: ParserConfig,
    fingerprint: FingerprintCache,
    issues: Vec<Issue>,
    state: ParserState,
}

impl IssueLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, ParserConfig::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: ParserConfig) -> Self {
        Self {
            path: path.into(),
            config,
            fingerprint: FingerprintCache::new(),
            issues: Vec::new(),
            state: ParserState::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the log when its fingerprint moved.
    pub fn refresh(&mut self) -> Result<ParseOutcome, ParseError> {
        let fingerprint = match FileFingerprint::of(&self.path) {
            Ok(Some(fp)) => fp,
            Ok(None) => {
                return Err(ParseError::NotFound {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(ParseError::from_io(&self.path, e)),
        };
        if !self.fingerprint.needs_reparse(&fingerprint) {
            return Ok(ParseOutcome::Unchanged);
        }

        let (issues, mut state) = self.read_all()?;
        state.last_parse = Some(Utc::now());
        let outcome = ParseOutcome::Parsed {
            lines: state.lines_parsed,
            errors: state.errors_encountered,
        };
        debug!(
            path = %self.path.display(),
            issues = issues.len(),
            errors = state.errors_encountered,
            "Issue log parsed"
        );

        self.issues = issues;
        self.state = state;
        self.fingerprint.commit(fingerprint);
        Ok(outcome)
    }

    fn read_all(&self) -> Result<(Vec<Issue>, ParserState), ParseError> {
        let file = File::open(&self.path).map_err(|e| ParseError::from_io(&self.path, e))?;
        let mut reader = BufReader::new(file);
        let max = self.config.max_line_bytes;
        let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);

        let mut issues: Vec<Issue> = Vec::new();
        let mut state = ParserState::default();
        let mut error_log = LineErrorLog::new(MAX_LOGGED_LINE_ERRORS);
        let mut buf = Vec::new();
        let mut line_no: u64 = 0;

        loop {
            buf.clear();
            let read = (&mut reader)
                .take(limit)
                .read_until(b'\n', &mut buf)
                .map_err(|e| ParseError::from_io(&self.path, e))?;
            if read == 0 {
                break;
            }
            line_no += 1;
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            if buf.len() > max {
                return Err(ParseError::LineTooLong {
                    path: self.path.clone(),
                    line: line_no,
                    max,
                });
            }

            let text = match std::str::from_utf8(&buf) {
                Ok(text) => text.trim(),
                Err(_) => {
                    state.lines_parsed += 1;
                    state.errors_encountered += 1;
                    error_log.record(&self.path, line_no, &LineError::InvalidUtf8);
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }
            state.lines_parsed += 1;

            match decode_issue(text) {
                Ok(issue) => match issues.iter_mut().find(|i| i.id == issue.id) {
                    Some(existing) => *existing = issue,
                    None => issues.push(issue),
                },
                Err(error) => {
                    state.errors_encountered += 1;
                    error_log.record(&self.path, line_no, &error);
                }
            }
        }

        error_log.finish(&self.path);
        Ok((issues, state))
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.issues.clone()
    }

    pub fn counts(&self) -> IssueCounts {
        self.issues
            .iter()
            .fold(IssueCounts::default(), |mut counts, issue| {
                match issue.status {
                    IssueStatus::Open => counts.open += 1,
                    IssueStatus::InProgress => counts.in_progress += 1,
                    IssueStatus::Blocked => counts.blocked += 1,
                    IssueStatus::Closed => counts.closed += 1,
                }
                counts
            })
    }

    pub fn state(&self) -> ParserState {
        self.state.clone()
    }
}

fn decode_issue(text: &str) -> Result<Issue, LineError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| LineError::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        return Err(LineError::NotAnObject);
    }
    let raw = RawIssue::deserialize(&value)
        .map_err(|e| LineError::payload(hud_core::EventKind::Unknown, e))?;
    raw.into_issue()
        .ok_or_else(|| LineError::payload(hud_core::EventKind::Unknown, "issue without id"))
}
