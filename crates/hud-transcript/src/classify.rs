//! Line classification and payload decoding.
//!
//! A line is classified in two steps: an explicit `type` discriminator wins
//! when it names a known kind; otherwise the ordered [`STRUCTURAL_RULES`]
//! table is consulted and the first matching rule decides. Independently of
//! the resulting kind, `tool_use` / `tool_result` content blocks nested in
//! `message.content` are decoded into [`ToolAction`]s.
//!
//! Decoding never panics: each payload goes through a typed serde step and
//! a failure becomes a [`LineError`].

use chrono::{DateTime, Utc};
use hud_core::{
    AgentRunEvent, AgentStatus, AgentType, Event, EventKind, EventPayload, MessageMeta, TodoEvent,
    ToolResultEvent, ToolUseEvent,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::LineError;
use crate::raw::{
    RawAgentRun, RawContextWindow, RawMessage, RawTaskInput, RawToolResult, RawToolUse,
    RawTodo, RawTodoWriteInput,
};

/// Tool names that spawn a sub-agent.
const AGENT_SPAWN_TOOLS: &[&str] = &["Task", "Agent"];

/// Tool name whose input carries the full todo list.
const TODO_WRITE_TOOL: &str = "TodoWrite";

// ============================================================================
// Rule table
// ============================================================================

/// One structural classification rule.
pub struct ClassificationRule {
    pub name: &'static str,
    pub matches: fn(&Map<String, Value>) -> bool,
    pub kind: fn(&Map<String, Value>) -> EventKind,
}

/// Structural rules in priority order; first match wins.
pub static STRUCTURAL_RULES: [ClassificationRule; 6] = [
    ClassificationRule {
        name: "message",
        matches: has_message_role,
        kind: message_kind,
    },
    ClassificationRule {
        name: "tool_use",
        matches: has_tool_use,
        kind: tool_use_kind,
    },
    ClassificationRule {
        name: "tool_result",
        matches: has_tool_result,
        kind: tool_result_kind,
    },
    ClassificationRule {
        name: "agent",
        matches: has_agent,
        kind: agent_kind,
    },
    ClassificationRule {
        name: "todo",
        matches: has_todo,
        kind: todo_kind,
    },
    ClassificationRule {
        name: "context_window",
        matches: has_context_window,
        kind: context_window_kind,
    },
];

fn has_object(line: &Map<String, Value>, key: &str) -> bool {
    line.get(key).is_some_and(Value::is_object)
}

fn has_message_role(line: &Map<String, Value>) -> bool {
    line.get("message")
        .and_then(Value::as_object)
        .is_some_and(|message| message.get("role").is_some_and(Value::is_string))
}

fn message_kind(line: &Map<String, Value>) -> EventKind {
    let role = line
        .get("message")
        .and_then(|m| m.get("role"))
        .and_then(Value::as_str);
    match role {
        Some("assistant") => EventKind::Assistant,
        _ => EventKind::User,
    }
}

fn tool_use_kind(_: &Map<String, Value>) -> EventKind {
    EventKind::ToolUse
}

fn tool_result_kind(_: &Map<String, Value>) -> EventKind {
    EventKind::ToolResult
}

fn agent_kind(_: &Map<String, Value>) -> EventKind {
    EventKind::AgentRun
}

fn todo_kind(_: &Map<String, Value>) -> EventKind {
    EventKind::Todo
}

fn context_window_kind(_: &Map<String, Value>) -> EventKind {
    EventKind::ContextWindow
}

fn has_tool_use(line: &Map<String, Value>) -> bool {
    has_object(line, "tool_use")
}

fn has_tool_result(line: &Map<String, Value>) -> bool {
    has_object(line, "tool_result")
}

fn has_agent(line: &Map<String, Value>) -> bool {
    has_object(line, "agent_run") || has_object(line, "agent")
}

fn has_todo(line: &Map<String, Value>) -> bool {
    has_object(line, "todo")
}

fn has_context_window(line: &Map<String, Value>) -> bool {
    has_object(line, "context_window")
}

/// Result of classifying one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: EventKind,
    /// `"type"` for the explicit discriminator, the rule name otherwise,
    /// `"none"` when nothing matched.
    pub rule: &'static str,
}

/// Classifies a decoded line object.
pub fn classify(line: &Map<String, Value>) -> Classification {
    if let Some(kind) = line
        .get("type")
        .and_then(Value::as_str)
        .and_then(EventKind::from_discriminator)
    {
        return Classification { kind, rule: "type" };
    }
    STRUCTURAL_RULES
        .iter()
        .find(|rule| (rule.matches)(line))
        .map(|rule| Classification {
            kind: (rule.kind)(line),
            rule: rule.name,
        })
        .unwrap_or(Classification {
            kind: EventKind::Unknown,
            rule: "none",
        })
}

// ============================================================================
// Decoded line
// ============================================================================

/// A tool-use with the side effects its name implies.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub event: ToolUseEvent,
    /// Sub-agent started by a `Task` call.
    pub spawn: Option<AgentRunEvent>,
    /// Replacement todo list carried by a `TodoWrite` call.
    pub todo_list: Option<Vec<TodoEvent>>,
}

/// Update to the tool table, from a top-level event or a content block.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolAction {
    Use(ToolCall),
    Result(ToolResultEvent),
}

/// Everything one line contributes to the aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLine {
    pub event: Event,
    pub rule: &'static str,
    /// Tool updates in line order: the top-level one first, then blocks.
    pub actions: Vec<ToolAction>,
    /// Content blocks that failed to decode. The rest of the line still counts.
    pub skipped: Vec<LineError>,
}

/// Decodes one non-empty transcript line.
pub fn decode_line(text: &str) -> Result<DecodedLine, LineError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| LineError::InvalidJson(e.to_string()))?;
    let line = value.as_object().ok_or(LineError::NotAnObject)?;

    let Classification { kind, rule } = classify(line);
    let timestamp = parse_timestamp(line);

    let mut actions = Vec::new();
    let mut skipped = Vec::new();

    let payload = match kind {
        EventKind::User | EventKind::Assistant | EventKind::System => {
            // Bad metadata must not hide the line's content blocks.
            let meta = decode_message(kind, line).unwrap_or_else(|error| {
                skipped.push(error);
                MessageMeta::default()
            });
            EventPayload::Message(meta)
        }
        EventKind::Summary => EventPayload::Summary {
            text: line.get("summary").and_then(Value::as_str).map(str::to_string),
        },
        EventKind::ToolUse => {
            let raw = RawToolUse::deserialize(section(&value, &["tool_use"]))
                .map_err(|e| LineError::payload(kind, e))?;
            let (call, todo_error) = tool_call(raw.into_event());
            skipped.extend(todo_error);
            let payload = EventPayload::ToolUse(call.event.clone());
            actions.push(ToolAction::Use(call));
            payload
        }
        EventKind::ToolResult => {
            let raw = RawToolResult::deserialize(section(&value, &["tool_result"]))
                .map_err(|e| LineError::payload(kind, e))?;
            let event = raw.into_event();
            actions.push(ToolAction::Result(event.clone()));
            EventPayload::ToolResult(event)
        }
        EventKind::AgentRun => {
            let raw = RawAgentRun::deserialize(section(&value, &["agent_run", "agent"]))
                .map_err(|e| LineError::payload(kind, e))?;
            EventPayload::AgentRun(raw.into_event().map_err(|e| LineError::payload(kind, e))?)
        }
        EventKind::Todo => {
            let raw = RawTodo::deserialize(section(&value, &["todo"]))
                .map_err(|e| LineError::payload(kind, e))?;
            EventPayload::Todo(raw.into_event(None).map_err(|e| LineError::payload(kind, e))?)
        }
        EventKind::ContextWindow => {
            let raw = RawContextWindow::deserialize(section(&value, &["context_window"]))
                .map_err(|e| LineError::payload(kind, e))?;
            EventPayload::ContextWindow(raw.to_context_window())
        }
        EventKind::Unknown => EventPayload::None,
    };

    let block_count = decode_blocks(line, &mut actions, &mut skipped);
    let payload = match payload {
        EventPayload::Message(meta) => EventPayload::Message(MessageMeta {
            tool_blocks: block_count,
            ..meta
        }),
        other => other,
    };

    Ok(DecodedLine {
        event: Event::new(kind, timestamp, payload),
        rule,
        actions,
        skipped,
    })
}

fn parse_timestamp(line: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let raw = line.get("timestamp")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The nested object under the first present key, else the line itself
/// (flat layout).
fn section<'a>(line: &'a Value, keys: &[&str]) -> &'a Value {
    keys.iter()
        .find_map(|key| line.get(*key).filter(|v| v.is_object()))
        .unwrap_or(line)
}

fn decode_message(kind: EventKind, line: &Map<String, Value>) -> Result<MessageMeta, LineError> {
    match line.get("message") {
        None | Some(Value::Null) => Ok(MessageMeta::default()),
        Some(message) => RawMessage::deserialize(message)
            .map(|raw| raw.to_meta())
            .map_err(|e| LineError::payload(kind, e)),
    }
}

/// Folds `message.content` blocks into `actions`; returns how many decoded.
fn decode_blocks(
    line: &Map<String, Value>,
    actions: &mut Vec<ToolAction>,
    skipped: &mut Vec<LineError>,
) -> usize {
    let Some(blocks) = line
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
    else {
        return 0;
    };

    let mut decoded = 0;
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("tool_use") => match RawToolUse::deserialize(block) {
                Ok(raw) => {
                    let (call, todo_error) = tool_call(raw.into_event());
                    skipped.extend(todo_error);
                    actions.push(ToolAction::Use(call));
                    decoded += 1;
                }
                Err(e) => skipped.push(LineError::payload(EventKind::ToolUse, e)),
            },
            Some("tool_result") => match RawToolResult::deserialize(block) {
                Ok(raw) => {
                    actions.push(ToolAction::Result(raw.into_event()));
                    decoded += 1;
                }
                Err(e) => skipped.push(LineError::payload(EventKind::ToolResult, e)),
            },
            _ => {}
        }
    }
    decoded
}

/// Attaches the agent spawn or todo list a tool call implies.
fn tool_call(event: ToolUseEvent) -> (ToolCall, Option<LineError>) {
    let mut call = ToolCall {
        event,
        spawn: None,
        todo_list: None,
    };
    let mut error = None;

    if AGENT_SPAWN_TOOLS.contains(&call.event.name.as_str()) {
        if let Some(id) = call.event.id.clone() {
            let input = RawTaskInput::deserialize(&call.event.input).unwrap_or_default();
            call.spawn = Some(AgentRunEvent {
                id,
                agent_type: AgentType::from_subagent_type(
                    input.subagent_type.as_deref().unwrap_or(""),
                ),
                description: input.description,
                status: AgentStatus::Running,
            });
        }
    } else if call.event.name == TODO_WRITE_TOOL {
        match decode_todo_list(&call.event.input) {
            Ok(todos) => call.todo_list = Some(todos),
            Err(e) => error = Some(e),
        }
    }
    (call, error)
}

fn decode_todo_list(input: &Value) -> Result<Vec<TodoEvent>, LineError> {
    let raw = RawTodoWriteInput::deserialize(input)
        .map_err(|e| LineError::payload(EventKind::Todo, e))?;
    raw.todos
        .into_iter()
        .enumerate()
        .map(|(index, todo)| {
            todo.into_event(Some((index + 1).to_string()))
                .map_err(|e| LineError::payload(EventKind::Todo, e))
        })
        .collect()
}
