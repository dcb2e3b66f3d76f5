//! HUD Core - Shared types for Claude Code session status
//!
//! This crate provides the domain value types shared between the
//! transcript parser (hud-transcript) and the front end (hud-cli).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod agent;
pub mod context;
pub mod cost;
pub mod duration;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod model;
pub mod todo;
pub mod tool;

// Re-exports for convenience
pub use agent::{AgentInfo, AgentStatus, AgentType};
pub use context::{ContextWindow, TokenCount, DEFAULT_WINDOW_SIZE, RESERVED_BUFFER_TOKENS};
pub use cost::{Money, TokenPrice};
pub use duration::{format_elapsed, format_since};
pub use error::{DomainError, DomainResult};
pub use event::{
    AgentRunEvent, Event, EventKind, EventPayload, MessageMeta, TodoEvent, TokenUsage,
    ToolResultEvent, ToolUseEvent,
};
pub use fingerprint::{FileFingerprint, FingerprintCache};
pub use model::ModelTier;
pub use todo::{TodoInfo, TodoPriority, TodoStatus};
pub use tool::{extract_target, truncate_target, ToolInfo, ToolKey, ToolStatus};
