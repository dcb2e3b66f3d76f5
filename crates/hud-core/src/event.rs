//! Classified transcript events.
//!
//! Each line of a session transcript becomes one [`Event`]. Only the parser
//! holds events while classifying; the aggregate keeps a copy of the latest
//! event of each kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agent::{AgentStatus, AgentType};
use crate::context::{ContextWindow, TokenCount};
use crate::todo::{TodoPriority, TodoStatus};

/// Closed set of transcript line kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    User,
    Assistant,
    System,
    Summary,
    ToolUse,
    ToolResult,
    AgentRun,
    Todo,
    ContextWindow,
    Unknown,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        Self::User,
        Self::Assistant,
        Self::System,
        Self::Summary,
        Self::ToolUse,
        Self::ToolResult,
        Self::AgentRun,
        Self::Todo,
        Self::ContextWindow,
        Self::Unknown,
    ];

    /// Maps an explicit `type` discriminator to a kind.
    ///
    /// Returns `None` for unrecognized values so the caller can fall back to
    /// structural classification.
    pub fn from_discriminator(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "summary" => Some(Self::Summary),
            "tool_use" => Some(Self::ToolUse),
            "tool_result" => Some(Self::ToolResult),
            "agent" | "agent_run" => Some(Self::AgentRun),
            "todo" => Some(Self::Todo),
            "context_window" => Some(Self::ContextWindow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Summary => "summary",
            Self::ToolUse => "tool_use",
            Self::ToolResult => "tool_result",
            Self::AgentRun => "agent_run",
            Self::Todo => "todo",
            Self::ContextWindow => "context_window",
            Self::Unknown => "unknown",
        }
    }

    /// True for kinds that carry a `message` object.
    pub fn is_message(&self) -> bool {
        matches!(self, Self::User | Self::Assistant | Self::System)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage reported on an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: TokenCount,
    pub output_tokens: TokenCount,
    pub cache_creation_tokens: TokenCount,
    pub cache_read_tokens: TokenCount,
}

impl TokenUsage {
    /// Projects this usage onto a context window of the given size.
    pub fn to_context_window(&self, window_size: u32) -> ContextWindow {
        ContextWindow {
            window_size,
            input_tokens: self.input_tokens,
            cache_creation_tokens: self.cache_creation_tokens,
            cache_read_tokens: self.cache_read_tokens,
            output_tokens: self.output_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Number of tool-use / tool-result content blocks on the message.
    pub tool_blocks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultEvent {
    pub tool_use_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRunEvent {
    pub id: String,
    pub agent_type: AgentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: AgentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoEvent {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TodoPriority>,
}

/// Kind-specific data of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    Message(MessageMeta),
    ToolUse(ToolUseEvent),
    ToolResult(ToolResultEvent),
    AgentRun(AgentRunEvent),
    Todo(TodoEvent),
    ContextWindow(ContextWindow),
    Summary { text: Option<String> },
    None,
}

/// A single classified transcript line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(kind: EventKind, timestamp: Option<DateTime<Utc>>, payload: EventPayload) -> Self {
        Self {
            kind,
            timestamp,
            payload,
        }
    }

    /// An event whose body was not understood; only the timestamp survives.
    pub fn unknown(timestamp: Option<DateTime<Utc>>) -> Self {
        Self::new(EventKind::Unknown, timestamp, EventPayload::None)
    }
}
