//! HUD Transcript - Claude Code session transcript parsing
//!
//! Streams a session transcript (JSON lines, append-only), classifies every
//! line, and folds the results into a [`SessionAggregate`] exposed through
//! the copying accessors of [`TranscriptParser`].
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod aggregate;
pub mod classify;
pub mod error;
pub mod issues;
pub mod parser;
pub mod raw;

pub use aggregate::{ParserState, SessionAggregate, ToolUseCount, ToolsByStatus, UNKNOWN_TOOL_NAME};
pub use classify::{classify, decode_line, Classification, DecodedLine, ToolAction, ToolCall};
pub use error::{CancelReason, LineError, ParseError, MAX_LOGGED_LINE_ERRORS};
pub use issues::{Issue, IssueCounts, IssueLog, IssueStatus};
pub use parser::{ParseOutcome, ParserConfig, TranscriptParser, DEFAULT_MAX_LINE_BYTES};
