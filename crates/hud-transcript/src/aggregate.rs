//! Derived session state folded from classified transcript lines.
//!
//! A [`SessionAggregate`] is built from scratch on every full re-parse and
//! swapped in whole, so nothing here needs to handle merging with a previous
//! parse. All read methods return owned copies.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hud_core::{
    AgentInfo, AgentRunEvent, AgentStatus, ContextWindow, Event, EventKind, EventPayload,
    MessageMeta, Money, ModelTier, TodoEvent, TodoInfo, TokenCount, ToolInfo, ToolKey,
    ToolResultEvent, ToolUseEvent,
};

use crate::classify::{DecodedLine, ToolAction, ToolCall};

/// Tool name recorded for a result whose tool-use was never seen.
pub const UNKNOWN_TOOL_NAME: &str = "unknown";

/// Counters describing the last committed parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserState {
    /// Non-empty lines read, malformed ones included.
    pub lines_parsed: u64,
    pub errors_encountered: u64,
    pub last_parse: Option<DateTime<Utc>>,
}

/// Finished invocations of one tool name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUseCount {
    pub name: String,
    pub count: usize,
    /// Line of the most recent finished invocation.
    pub last_line: u64,
}

/// Tool table split for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolsByStatus {
    /// Running invocations, most recent first.
    pub running: Vec<ToolInfo>,
    /// Invocations in a terminal state, grouped by name.
    pub completed: Vec<ToolUseCount>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionAggregate {
    tools: HashMap<ToolKey, ToolInfo>,
    agents: Vec<AgentInfo>,
    todos: Vec<TodoInfo>,
    latest: HashMap<EventKind, Event>,
    context: Option<ContextWindow>,
    /// Window size from an explicit context-window line.
    window_size: Option<u32>,
    input_tokens: TokenCount,
    output_tokens: TokenCount,
    model_id: Option<String>,
    earliest: Option<DateTime<Utc>>,
    pub(crate) state: ParserState,
}

impl SessionAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Fold
    // ========================================================================

    /// Applies one decoded line. `line` is the 1-based physical line number.
    pub fn fold(&mut self, line: u64, decoded: DecodedLine) {
        let DecodedLine { event, actions, .. } = decoded;
        let timestamp = event.timestamp;

        if let Some(ts) = timestamp {
            self.earliest = Some(self.earliest.map_or(ts, |earliest| earliest.min(ts)));
        }

        match &event.payload {
            EventPayload::Message(meta) => self.apply_message(meta),
            EventPayload::AgentRun(run) => self.apply_agent_run(run, timestamp),
            EventPayload::Todo(todo) => self.apply_todo(todo.clone()),
            EventPayload::ContextWindow(window) => self.apply_context_window(*window),
            EventPayload::ToolUse(_)
            | EventPayload::ToolResult(_)
            | EventPayload::Summary { .. }
            | EventPayload::None => {}
        }

        for action in actions {
            match action {
                ToolAction::Use(call) => self.apply_tool_call(call, timestamp, line),
                ToolAction::Result(result) => self.apply_tool_result(result, timestamp, line),
            }
        }

        self.latest.insert(event.kind, event);
    }

    fn apply_message(&mut self, meta: &MessageMeta) {
        if let Some(model) = meta.model.as_ref().filter(|m| !m.is_empty()) {
            self.model_id = Some(model.clone());
        }
        if let Some(usage) = meta.usage {
            self.input_tokens += usage.input_tokens;
            self.output_tokens += usage.output_tokens;
            self.context = Some(usage.to_context_window(self.effective_window_size()));
        }
    }

    fn apply_context_window(&mut self, window: ContextWindow) {
        self.window_size = Some(window.window_size);
        let measured = !window.used_tokens().is_zero() || !window.output_tokens.is_zero();
        match self.context.as_mut() {
            Some(current) if !measured => current.window_size = window.window_size,
            _ => self.context = Some(window),
        }
    }

    fn effective_window_size(&self) -> u32 {
        self.window_size.unwrap_or_else(|| self.model_tier().context_window_size())
    }

    fn apply_tool_call(&mut self, call: ToolCall, timestamp: Option<DateTime<Utc>>, line: u64) {
        let ToolCall {
            event,
            spawn,
            todo_list,
        } = call;

        if let Some(run) = spawn {
            self.apply_agent_run(&run, timestamp);
        }
        if let Some(todos) = todo_list {
            self.todos = todos.into_iter().map(todo_info).collect();
        }
        self.apply_tool_use(event, timestamp, line);
    }

    fn apply_tool_use(&mut self, event: ToolUseEvent, timestamp: Option<DateTime<Utc>>, line: u64) {
        let key = ToolKey::new(event.id.as_deref(), &event.name, timestamp);
        let target = hud_core::extract_target(&event.input);

        match self.tools.get_mut(&key) {
            // A result can precede its tool-use; keep the terminal status.
            Some(existing) => {
                existing.name = event.name;
                existing.target = target;
                if existing.started_at.is_none() {
                    existing.started_at = timestamp;
                }
                if timestamp.is_some() {
                    existing.last_used = timestamp;
                }
                existing.last_line = line;
            }
            None => {
                let info = ToolInfo::started(event.id, event.name, target, timestamp, line);
                self.tools.insert(key, info);
            }
        }
    }

    fn apply_tool_result(
        &mut self,
        result: ToolResultEvent,
        timestamp: Option<DateTime<Utc>>,
        line: u64,
    ) {
        let name = result.name.as_deref().unwrap_or(UNKNOWN_TOOL_NAME);
        let key = ToolKey::new(result.tool_use_id.as_deref(), name, timestamp);

        match self.tools.get_mut(&key) {
            Some(existing) => existing.finish(result.is_error, timestamp, line),
            None => {
                let mut info = ToolInfo::started(
                    result.tool_use_id.clone(),
                    name,
                    None,
                    timestamp,
                    line,
                );
                info.finish(result.is_error, timestamp, line);
                self.tools.insert(key, info);
            }
        }

        if let Some(id) = result.tool_use_id.as_deref() {
            if let Some(agent) = self.agents.iter_mut().find(|a| a.id == id) {
                agent.status = if result.is_error {
                    AgentStatus::Error
                } else {
                    AgentStatus::Completed
                };
            }
        }
    }

    fn apply_agent_run(&mut self, run: &AgentRunEvent, timestamp: Option<DateTime<Utc>>) {
        match self.agents.iter_mut().find(|a| a.id == run.id) {
            Some(agent) => {
                agent.agent_type = run.agent_type.clone();
                if run.description.is_some() {
                    agent.description = run.description.clone();
                }
                agent.status = run.status;
                if agent.started_at.is_none() {
                    agent.started_at = timestamp;
                }
            }
            None => self.agents.push(AgentInfo {
                id: run.id.clone(),
                agent_type: run.agent_type.clone(),
                description: run.description.clone(),
                status: run.status,
                started_at: timestamp,
            }),
        }
    }

    fn apply_todo(&mut self, todo: TodoEvent) {
        let info = todo_info(todo);
        match self.todos.iter_mut().find(|t| t.id == info.id) {
            Some(existing) => *existing = info,
            None => self.todos.push(info),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn latest_event(&self, kind: EventKind) -> Option<Event> {
        self.latest.get(&kind).cloned()
    }

    /// All tool invocations in order of last activity.
    pub fn tools(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self.tools.values().cloned().collect();
        tools.sort_by_key(|t| t.last_line);
        tools
    }

    /// Most recently used first, at most `n`.
    pub fn tools_by_recency(&self, n: usize) -> Vec<ToolInfo> {
        let mut tools: Vec<&ToolInfo> = self.tools.values().collect();
        tools.sort_by_key(|t| Reverse(t.last_line));
        tools.into_iter().take(n).cloned().collect()
    }

    pub fn tools_by_status(&self, max_running: usize, max_completed: usize) -> ToolsByStatus {
        let mut running: Vec<&ToolInfo> = self.tools.values().filter(|t| t.is_running()).collect();
        running.sort_by_key(|t| Reverse(t.last_line));

        let mut counts: HashMap<&str, ToolUseCount> = HashMap::new();
        for tool in self.tools.values().filter(|t| t.status.is_terminal()) {
            let entry = counts.entry(tool.name.as_str()).or_insert_with(|| ToolUseCount {
                name: tool.name.clone(),
                count: 0,
                last_line: 0,
            });
            entry.count += 1;
            entry.last_line = entry.last_line.max(tool.last_line);
        }
        let mut completed: Vec<ToolUseCount> = counts.into_values().collect();
        completed.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(b.last_line.cmp(&a.last_line))
                .then_with(|| a.name.cmp(&b.name))
        });
        completed.truncate(max_completed);

        ToolsByStatus {
            running: running.into_iter().take(max_running).cloned().collect(),
            completed,
        }
    }

    pub fn agents(&self) -> Vec<AgentInfo> {
        self.agents.clone()
    }

    /// Todos in order of first appearance.
    pub fn todos(&self) -> Vec<TodoInfo> {
        self.todos.clone()
    }

    pub fn context_window(&self) -> Option<ContextWindow> {
        self.context
    }

    pub fn context_percentage(&self) -> f64 {
        self.context.map_or(0.0, |w| w.usage_percentage())
    }

    /// Accumulated (input, output) tokens.
    pub fn total_tokens(&self) -> (TokenCount, TokenCount) {
        (self.input_tokens, self.output_tokens)
    }

    pub fn model_tier(&self) -> ModelTier {
        ModelTier::from_model_id(self.model_id.as_deref().unwrap_or(""))
    }

    pub fn estimated_cost(&self) -> Money {
        self.model_tier()
            .cost(self.input_tokens.as_u64(), self.output_tokens.as_u64())
    }

    pub fn model_id(&self) -> Option<String> {
        self.model_id.clone()
    }

    /// Earliest timestamp of any classified line.
    pub fn earliest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.earliest
    }

    /// (total, completed)
    pub fn todo_count(&self) -> (usize, usize) {
        let completed = self.todos.iter().filter(|t| t.is_completed()).count();
        (self.todos.len(), completed)
    }

    /// First in-progress todo in display order.
    pub fn current_todo(&self) -> Option<TodoInfo> {
        self.todos.iter().find(|t| t.is_in_progress()).cloned()
    }

    pub fn active_tool_count(&self) -> usize {
        self.tools.values().filter(|t| t.is_running()).count()
    }

    pub fn active_agent_count(&self) -> usize {
        self.agents.iter().filter(|a| a.is_running()).count()
    }

    pub fn state(&self) -> ParserState {
        self.state.clone()
    }
}

fn todo_info(todo: TodoEvent) -> TodoInfo {
    TodoInfo {
        id: todo.id,
        content: todo.content,
        status: todo.status,
        priority: todo.priority,
    }
}
