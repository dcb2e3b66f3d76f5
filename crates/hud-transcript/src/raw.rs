//! Raw JSON structures of a Claude Code session transcript.
//!
//! Transcript lines have changed shape across releases. Every field that is
//! not strictly needed is optional, and unknown fields are ignored, so a new
//! release adding keys does not turn good lines into malformed ones.

use hud_core::{
    AgentRunEvent, AgentStatus, AgentType, ContextWindow, MessageMeta, TodoEvent, TodoPriority,
    TodoStatus, TokenCount, TokenUsage, ToolResultEvent, ToolUseEvent, DEFAULT_WINDOW_SIZE,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `message` object of user / assistant / system lines.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Either a plain string or an array of content blocks.
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub usage: Option<RawUsage>,
}

/// Token counters. Missing or `null` counters read as zero.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RawUsage {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub input_tokens: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub output_tokens: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub cache_creation_input_tokens: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub cache_read_input_tokens: u64,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// A `tool_use` object, either top-level or a content block.
#[derive(Debug, Clone, Deserialize)]
pub struct RawToolUse {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

/// A `tool_result` object, either top-level or a content block.
#[derive(Debug, Clone, Deserialize)]
pub struct RawToolResult {
    #[serde(default)]
    pub tool_use_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_error: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAgentRun {
    #[serde(alias = "agent_id")]
    pub id: String,
    #[serde(default, alias = "subagent_type")]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTodo {
    /// String or number; `TodoWrite` lists often omit it.
    #[serde(default)]
    pub id: Option<Value>,
    pub content: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

/// `input` of a `TodoWrite` tool call.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTodoWriteInput {
    pub todos: Vec<RawTodo>,
}

/// `input` of a `Task` tool call (sub-agent spawn).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTaskInput {
    #[serde(default)]
    pub subagent_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawContextWindow {
    #[serde(default, alias = "context_window_size")]
    pub size: Option<u32>,
    #[serde(default)]
    pub current_usage: Option<RawUsage>,
}

// ============================================================================
// Conversions
// ============================================================================

impl RawUsage {
    pub fn to_token_usage(self) -> TokenUsage {
        TokenUsage {
            input_tokens: TokenCount::new(self.input_tokens),
            output_tokens: TokenCount::new(self.output_tokens),
            cache_creation_tokens: TokenCount::new(self.cache_creation_input_tokens),
            cache_read_tokens: TokenCount::new(self.cache_read_input_tokens),
        }
    }
}

impl RawMessage {
    /// Message metadata; `tool_blocks` is filled in by the classifier.
    pub fn to_meta(&self) -> MessageMeta {
        MessageMeta {
            role: self.role.clone(),
            model: self.model.clone(),
            usage: self.usage.map(RawUsage::to_token_usage),
            tool_blocks: 0,
        }
    }
}

impl RawToolUse {
    pub fn into_event(self) -> ToolUseEvent {
        ToolUseEvent {
            id: self.id.filter(|id| !id.is_empty()),
            name: self.name,
            input: self.input,
        }
    }
}

impl RawToolResult {
    pub fn into_event(self) -> ToolResultEvent {
        ToolResultEvent {
            tool_use_id: self.tool_use_id.filter(|id| !id.is_empty()),
            name: self.name,
            is_error: self.is_error.unwrap_or(false),
        }
    }
}

impl RawAgentRun {
    /// Fails only on a status string that names no known state.
    pub fn into_event(self) -> Result<AgentRunEvent, String> {
        let status = match self.status.as_deref() {
            Some(s) => s.parse::<AgentStatus>().map_err(|e| e.to_string())?,
            None => AgentStatus::Running,
        };
        Ok(AgentRunEvent {
            id: self.id,
            agent_type: AgentType::from_subagent_type(self.agent_type.as_deref().unwrap_or("")),
            description: self.description,
            status,
        })
    }
}

impl RawTodo {
    /// Converts to an event, using `fallback_id` when the entry has none.
    pub fn into_event(self, fallback_id: Option<String>) -> Result<TodoEvent, String> {
        let id = match self.id.as_ref().and_then(id_string) {
            Some(id) => id,
            None => fallback_id.ok_or_else(|| "todo without id".to_string())?,
        };
        let status = match self.status.as_deref() {
            Some(s) => s.parse::<TodoStatus>().map_err(|e| e.to_string())?,
            None => TodoStatus::Pending,
        };
        let priority = match self.priority.as_deref() {
            Some(p) => Some(p.parse::<TodoPriority>().map_err(|e| e.to_string())?),
            None => None,
        };
        Ok(TodoEvent {
            id,
            content: self.content,
            status,
            priority,
        })
    }
}

impl RawContextWindow {
    pub fn to_context_window(&self) -> ContextWindow {
        let size = self.size.unwrap_or(DEFAULT_WINDOW_SIZE);
        match self.current_usage {
            Some(usage) => usage.to_token_usage().to_context_window(size),
            None => ContextWindow::new(size),
        }
    }
}

/// Ids appear as strings or bare numbers depending on the writer.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_with_usage() {
        let raw: RawMessage = serde_json::from_value(json!({
            "role": "assistant",
            "model": "claude-sonnet-4-5",
            "content": [],
            "usage": {
                "input_tokens": 12,
                "output_tokens": 7,
                "cache_read_input_tokens": 30000,
                "service_tier": "standard"
            }
        }))
        .unwrap();
        let meta = raw.to_meta();
        assert_eq!(meta.model.as_deref(), Some("claude-sonnet-4-5"));
        let usage = meta.usage.unwrap();
        assert_eq!(usage.input_tokens.as_u64(), 12);
        assert_eq!(usage.cache_read_tokens.as_u64(), 30_000);
        assert!(usage.cache_creation_tokens.is_zero());
    }

    #[test]
    fn test_null_usage_counters_read_as_zero() {
        let raw: RawMessage = serde_json::from_value(json!({
            "role": "assistant",
            "usage": {"input_tokens": null, "output_tokens": 9, "cache_read_input_tokens": null}
        }))
        .unwrap();
        let usage = raw.to_meta().usage.unwrap();
        assert_eq!(usage.input_tokens.as_u64(), 0);
        assert_eq!(usage.output_tokens.as_u64(), 9);
        assert_eq!(usage.cache_read_tokens.as_u64(), 0);
    }

    #[test]
    fn test_tool_use_requires_name() {
        assert!(serde_json::from_value::<RawToolUse>(json!({"id": "t1"})).is_err());
        let raw: RawToolUse = serde_json::from_value(json!({"id": "", "name": "Bash"})).unwrap();
        assert_eq!(raw.into_event().id, None);
    }

    #[test]
    fn test_tool_result_defaults_to_success() {
        let raw: RawToolResult =
            serde_json::from_value(json!({"tool_use_id": "t1", "content": "ok"})).unwrap();
        let event = raw.into_event();
        assert_eq!(event.tool_use_id.as_deref(), Some("t1"));
        assert!(!event.is_error);
    }

    #[test]
    fn test_agent_aliases_and_status() {
        let raw: RawAgentRun = serde_json::from_value(json!({
            "agent_id": "a1",
            "subagent_type": "Explore",
            "status": "done"
        }))
        .unwrap();
        let event = raw.into_event().unwrap();
        assert_eq!(event.id, "a1");
        assert_eq!(event.agent_type, AgentType::Explore);
        assert_eq!(event.status, AgentStatus::Completed);
    }

    #[test]
    fn test_agent_unknown_status_is_rejected() {
        let raw: RawAgentRun =
            serde_json::from_value(json!({"id": "a1", "status": "sleeping"})).unwrap();
        assert!(raw.into_event().is_err());
    }

    #[test]
    fn test_todo_numeric_id_and_fallback() {
        let raw: RawTodo =
            serde_json::from_value(json!({"id": 7, "content": "x", "status": "completed"}))
                .unwrap();
        assert_eq!(raw.into_event(None).unwrap().id, "7");

        let raw: RawTodo = serde_json::from_value(json!({"content": "y"})).unwrap();
        assert!(raw.clone().into_event(None).is_err());
        let event = raw.into_event(Some("3".to_string())).unwrap();
        assert_eq!(event.id, "3");
        assert_eq!(event.status, TodoStatus::Pending);
    }

    #[test]
    fn test_context_window_size_alias() {
        let raw: RawContextWindow = serde_json::from_value(json!({
            "context_window_size": 1000000,
            "current_usage": {"input_tokens": 5}
        }))
        .unwrap();
        let window = raw.to_context_window();
        assert_eq!(window.window_size, 1_000_000);
        assert_eq!(window.input_tokens.as_u64(), 5);
    }
}
