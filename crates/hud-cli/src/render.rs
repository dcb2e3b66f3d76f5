//! Plain-text status line.

use chrono::{DateTime, Utc};
use hud_core::{AgentInfo, ModelTier, Money, TodoInfo, ToolInfo};
use hud_transcript::{IssueCounts, IssueLog, TranscriptParser};

/// Shown until the transcript exists.
pub const WAITING_PLACEHOLDER: &str = "waiting for transcript…";

const SEPARATOR: &str = " │ ";
const MAX_RUNNING_TOOLS: usize = 3;
const MAX_TODO_CHARS: usize = 40;

/// Point-in-time copy of everything the status line shows.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub model: ModelTier,
    pub context_percentage: f64,
    pub cost: Money,
    pub duration: String,
    pub running_tools: Vec<ToolInfo>,
    pub running_agents: Vec<AgentInfo>,
    /// (total, completed)
    pub todos: (usize, usize),
    pub current_todo: Option<TodoInfo>,
    pub issues: Option<IssueCounts>,
}

impl Snapshot {
    pub fn capture(
        parser: &TranscriptParser,
        issues: Option<&IssueLog>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            model: ModelTier::from_model_id(parser.model_id().as_deref().unwrap_or("")),
            context_percentage: parser.context_percentage(),
            cost: parser.estimated_cost(),
            duration: parser.formatted_duration_at(now),
            running_tools: parser.tools_by_status(MAX_RUNNING_TOOLS, 0).running,
            running_agents: parser
                .agents()
                .into_iter()
                .filter(AgentInfo::is_running)
                .collect(),
            todos: parser.todo_count(),
            current_todo: parser.current_todo(),
            issues: issues.map(IssueLog::counts),
        }
    }
}

fn tool_label(tool: &ToolInfo) -> String {
    match &tool.target {
        Some(target) => format!("{} {}", tool.name, target),
        None => tool.name.clone(),
    }
}

pub fn render(snapshot: &Snapshot) -> String {
    let mut parts = vec![
        snapshot.model.display_name().to_string(),
        format!("ctx {:.0}%", snapshot.context_percentage),
        snapshot.cost.format(),
        snapshot.duration.clone(),
    ];

    if !snapshot.running_tools.is_empty() {
        let tools: Vec<String> = snapshot.running_tools.iter().map(tool_label).collect();
        parts.push(format!("▶ {}", tools.join(", ")));
    }

    if !snapshot.running_agents.is_empty() {
        let agents: Vec<&str> = snapshot
            .running_agents
            .iter()
            .map(|a| a.agent_type.short_name())
            .collect();
        parts.push(format!("agents: {}", agents.join(", ")));
    }

    let (total, completed) = snapshot.todos;
    if total > 0 {
        let mut todo = format!("todos {completed}/{total}");
        if let Some(current) = &snapshot.current_todo {
            todo.push_str(": ");
            todo.push_str(&hud_core::truncate_target(&current.content, MAX_TODO_CHARS));
        }
        parts.push(todo);
    }

    if let Some(issues) = snapshot.issues {
        parts.push(format!(
            "issues {} open, {} active, {} blocked",
            issues.open, issues.in_progress, issues.blocked
        ));
    }

    parts.join(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hud_core::{AgentType, TodoStatus};

    fn empty() -> Snapshot {
        Snapshot {
            model: ModelTier::Opus,
            context_percentage: 0.0,
            cost: Money::zero(),
            duration: "0s".to_string(),
            running_tools: Vec::new(),
            running_agents: Vec::new(),
            todos: (0, 0),
            current_todo: None,
            issues: None,
        }
    }

    #[test]
    fn test_minimal_line() {
        assert_eq!(render(&empty()), "Opus │ ctx 0% │ $0.00 │ 0s");
    }

    #[test]
    fn test_full_line() {
        let snapshot = Snapshot {
            model: ModelTier::Sonnet,
            context_percentage: 42.4,
            cost: Money::from_usd(1.5),
            duration: "12m".to_string(),
            running_tools: vec![ToolInfo::started(
                Some("t1".to_string()),
                "Read",
                Some("src/main.rs".to_string()),
                None,
                1,
            )],
            running_agents: vec![AgentInfo::new("a1", AgentType::Explore)],
            todos: (5, 2),
            current_todo: Some(TodoInfo::new("3", "Write parser", TodoStatus::InProgress)),
            issues: Some(IssueCounts {
                open: 3,
                in_progress: 1,
                blocked: 0,
                closed: 7,
            }),
        };
        assert_eq!(
            render(&snapshot),
            "Sonnet │ ctx 42% │ $1.50 │ 12m │ ▶ Read src/main.rs │ agents: explore │ \
             todos 2/5: Write parser │ issues 3 open, 1 active, 0 blocked"
        );
    }
}
