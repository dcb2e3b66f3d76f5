//! Tool invocation tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};

/// Maximum number of characters of a tool target kept for display.
pub const MAX_TARGET_CHARS: usize = 40;

/// Input fields that name what a tool is working on, in preference order.
const TARGET_FIELDS: [&str; 7] = [
    "file_path",
    "path",
    "command",
    "pattern",
    "url",
    "query",
    "description",
];

/// Lifecycle of a single tool invocation: `Running -> Completed | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Running,
    Completed,
    Error,
}

impl ToolStatus {
    /// Maps a tool result's error flag to its terminal status.
    pub fn from_result(is_error: bool) -> Self {
        if is_error {
            Self::Error
        } else {
            Self::Completed
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ToolStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            "running" => Ok(Self::Running),
            "completed" | "success" | "done" => Ok(Self::Completed),
            "error" | "failed" => Ok(Self::Error),
            other => Err(DomainError::invalid(
                "tool status",
                other,
                "running|completed|error",
            )),
        }
    }
}

/// Identity of a tool invocation in the tool table.
///
/// Invocations without an id are keyed by name and timestamp, which keeps
/// distinct calls apart but means no result can ever be matched to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKey {
    Id(String),
    Fallback {
        name: String,
        timestamp: Option<DateTime<Utc>>,
    },
}

impl ToolKey {
    pub fn new(id: Option<&str>, name: &str, timestamp: Option<DateTime<Utc>>) -> Self {
        match id {
            Some(id) if !id.is_empty() => Self::Id(id.to_string()),
            _ => Self::Fallback {
                name: name.to_string(),
                timestamp,
            },
        }
    }
}

/// A tool invocation as derived from the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool-use id (`toolu_...`), when the transcript provided one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Tool name (e.g., "Bash", "Read", "Edit").
    pub name: String,

    /// What the tool is working on, truncated for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    pub status: ToolStatus,

    /// Timestamp of the tool-use line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Timestamp of the latest line that touched this invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,

    /// 1-based transcript line of the latest update. Orders invocations
    /// even when timestamps are missing or coarse.
    pub last_line: u64,
}

impl ToolInfo {
    /// Creates a running invocation from a tool-use line.
    pub fn started(
        id: Option<String>,
        name: impl Into<String>,
        target: Option<String>,
        timestamp: Option<DateTime<Utc>>,
        line: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            target,
            status: ToolStatus::Running,
            started_at: timestamp,
            last_used: timestamp,
            last_line: line,
        }
    }

    pub fn key(&self) -> ToolKey {
        ToolKey::new(self.id.as_deref(), &self.name, self.started_at)
    }

    pub fn is_running(&self) -> bool {
        self.status == ToolStatus::Running
    }

    /// Applies a tool result to this invocation.
    pub fn finish(&mut self, is_error: bool, timestamp: Option<DateTime<Utc>>, line: u64) {
        self.status = ToolStatus::from_result(is_error);
        if timestamp.is_some() {
            self.last_used = timestamp;
        }
        self.last_line = line;
    }
}

/// Extracts a display target from a tool's input object.
///
/// Picks the first non-empty string among well-known argument names; for
/// multi-line values (shell scripts) only the first line is kept.
pub fn extract_target(input: &serde_json::Value) -> Option<String> {
    let object = input.as_object()?;
    TARGET_FIELDS.iter().find_map(|field| {
        let value = object.get(*field)?.as_str()?;
        let first_line = value.lines().next().unwrap_or("").trim();
        if first_line.is_empty() {
            None
        } else {
            Some(truncate_target(first_line, MAX_TARGET_CHARS))
        }
    })
}

/// Truncates to at most `max_chars` characters, ending with an ellipsis
/// when shortened. Operates on chars, never splitting a code point.
pub fn truncate_target(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut truncated: String = value.chars().take(keep).collect();
    truncated.push('…');
    truncated
}
