//! Sub-agent identification and run tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};

/// Type of Claude Code agent.
///
/// Claude Code spawns different agent types for different purposes:
/// - Main agent for general tasks
/// - Specialized subagents for exploration, planning, code review
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    #[default]
    GeneralPurpose,
    Explore,
    Plan,
    CodeReviewer,
    FileSearch,
    /// Custom or unknown agent type
    Custom(String),
}

impl AgentType {
    /// Returns a short identifier for display.
    pub fn short_name(&self) -> &str {
        match self {
            Self::GeneralPurpose => "general",
            Self::Explore => "explore",
            Self::Plan => "plan",
            Self::CodeReviewer => "review",
            Self::FileSearch => "search",
            Self::Custom(name) => name.as_str(),
        }
    }

    /// Parses an agent type from a `subagent_type` string.
    pub fn from_subagent_type(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "" | "general-purpose" | "general_purpose" => Self::GeneralPurpose,
            "explore" | "explorer" => Self::Explore,
            "plan" | "planner" => Self::Plan,
            "code-reviewer" | "code_reviewer" | "codereview" => Self::CodeReviewer,
            "file-search" | "file_search" | "filesearch" => Self::FileSearch,
            _ => Self::Custom(s.to_string()),
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Status of a sub-agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Running,
    Completed,
    Error,
}

impl AgentStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl FromStr for AgentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            "running" | "started" | "in_progress" => Ok(Self::Running),
            "completed" | "done" | "success" => Ok(Self::Completed),
            "error" | "failed" | "killed" => Ok(Self::Error),
            other => Err(DomainError::invalid(
                "agent status",
                other,
                "running|completed|error",
            )),
        }
    }
}

/// A sub-agent run derived from the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub agent_type: AgentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl AgentInfo {
    pub fn new(id: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            id: id.into(),
            agent_type,
            description: None,
            status: AgentStatus::Running,
            started_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_parsing() {
        assert_eq!(
            AgentType::from_subagent_type("general-purpose"),
            AgentType::GeneralPurpose
        );
        assert_eq!(AgentType::from_subagent_type("Explore"), AgentType::Explore);
        assert_eq!(
            AgentType::from_subagent_type("custom-agent"),
            AgentType::Custom("custom-agent".to_string())
        );
    }

    #[test]
    fn test_agent_type_short_name() {
        assert_eq!(AgentType::CodeReviewer.short_name(), "review");
        assert_eq!(AgentType::Custom("x".into()).to_string(), "x");
    }

    #[test]
    fn test_agent_status_parsing() {
        assert_eq!("killed".parse::<AgentStatus>(), Ok(AgentStatus::Error));
        assert_eq!("started".parse::<AgentStatus>(), Ok(AgentStatus::Running));
        assert!("paused".parse::<AgentStatus>().is_err());
    }

    #[test]
    fn test_new_agent_is_running() {
        let agent = AgentInfo::new("a1", AgentType::Plan);
        assert!(agent.is_running());
        assert!(agent.description.is_none());
    }
}
