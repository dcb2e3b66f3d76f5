//! End-to-end tests for the transcript parser and issue-log reader.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hud_core::{AgentStatus, AgentType, EventKind, TodoStatus, ToolStatus};
use hud_transcript::{
    CancelReason, IssueCounts, IssueLog, ParseError, ParseOutcome, ParserConfig,
    TranscriptParser,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

struct Transcript {
    path: PathBuf,
    _dir: TempDir,
}

impl Transcript {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("session.jsonl");
        std::fs::write(&path, "").expect("create transcript");
        Self { path, _dir: dir }
    }

    fn with_lines(lines: &[Value]) -> Self {
        let transcript = Self::new();
        transcript.append(lines);
        transcript
    }

    fn append(&self, lines: &[Value]) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .expect("open transcript");
        for line in lines {
            writeln!(file, "{line}").expect("write line");
        }
    }

    fn append_raw(&self, raw: &str) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .expect("open transcript");
        file.write_all(raw.as_bytes()).expect("write raw");
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

async fn parse(parser: &TranscriptParser) -> Result<ParseOutcome, ParseError> {
    parser.parse(&CancellationToken::new()).await
}

fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

fn assistant(ts: &str, blocks: Value, usage: Option<Value>) -> Value {
    let mut message = json!({
        "role": "assistant",
        "model": "claude-opus-4-1",
        "content": blocks,
    });
    if let Some(usage) = usage {
        message["usage"] = usage;
    }
    json!({"type": "assistant", "timestamp": ts, "message": message})
}

fn user_results(ts: &str, blocks: Value) -> Value {
    json!({"type": "user", "timestamp": ts, "message": {"role": "user", "content": blocks}})
}

// ============================================================================
// Re-parse decision
// ============================================================================

#[tokio::test]
async fn test_unchanged_file_is_skipped() {
    let transcript = Transcript::with_lines(&[
        json!({"type": "user", "timestamp": "2025-06-01T10:00:00Z", "message": {"role": "user", "content": "hi"}}),
        json!({"type": "tool_use", "tool_use": {"id": "t1", "name": "Read"}}),
    ]);
    let parser = TranscriptParser::new(transcript.path());

    let first = parse(&parser).await.unwrap();
    assert_eq!(first, ParseOutcome::Parsed { lines: 2, errors: 0 });
    let state = parser.parser_state();
    let tools = parser.tools();

    let second = parse(&parser).await.unwrap();
    assert_eq!(second, ParseOutcome::Unchanged);
    assert_eq!(parser.parser_state(), state);
    assert_eq!(parser.tools(), tools);
}

#[tokio::test]
async fn test_append_triggers_full_reparse() {
    let transcript = Transcript::with_lines(&[json!({"type": "tool_use", "tool_use": {"id": "t1", "name": "Bash"}})]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();
    assert_eq!(parser.active_tool_count(), 1);

    transcript.append(&[json!({"type": "tool_result", "tool_result": {"tool_use_id": "t1"}})]);
    let outcome = parse(&parser).await.unwrap();

    assert_eq!(outcome, ParseOutcome::Parsed { lines: 2, errors: 0 });
    assert_eq!(parser.tools().len(), 1);
    assert_eq!(parser.active_tool_count(), 0);
}

#[tokio::test]
async fn test_session_start_is_sticky() {
    let transcript = Transcript::with_lines(&[
        json!({"type": "user", "timestamp": "2025-06-01T10:00:00Z", "message": {"role": "user"}}),
    ]);
    let parser = TranscriptParser::new(transcript.path());
    assert_eq!(parser.session_start(), None);

    parse(&parser).await.unwrap();
    let start = parser.session_start();
    assert_eq!(start, Some(ts("2025-06-01T10:00:00Z")));

    transcript.append(&[
        json!({"type": "user", "timestamp": "2025-06-01T11:00:00Z", "message": {"role": "user"}}),
    ]);
    parse(&parser).await.unwrap();
    assert_eq!(parser.session_start(), start);

    // Even a rewritten file with an earlier first line keeps the start.
    std::fs::write(
        transcript.path(),
        format!(
            "{}\n",
            json!({"type": "user", "timestamp": "2025-05-01T00:00:00Z", "message": {"role": "user"}})
        ),
    )
    .unwrap();
    parse(&parser).await.unwrap();
    assert_eq!(parser.session_start(), start);
}

#[tokio::test]
async fn test_formatted_duration_from_session_start() {
    let transcript = Transcript::with_lines(&[
        json!({"type": "user", "timestamp": "2025-06-01T10:00:00Z", "message": {"role": "user"}}),
    ]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();

    assert_eq!(parser.formatted_duration_at(ts("2025-06-01T12:05:00Z")), "2h 5m");
    assert_eq!(parser.formatted_duration_at(ts("2025-06-01T09:00:00Z")), "0s");
}

// ============================================================================
// Tools
// ============================================================================

#[tokio::test]
async fn test_tool_use_then_result_completes() {
    let transcript = Transcript::with_lines(&[
        json!({"type": "tool_use", "timestamp": "2025-06-01T10:00:00Z", "tool_use": {"id": "t1", "name": "Edit", "input": {"file_path": "/src/main.rs"}}}),
        json!({"type": "tool_result", "timestamp": "2025-06-01T10:00:02Z", "tool_result": {"tool_use_id": "t1", "is_error": false}}),
    ]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();

    let tools = parser.tools();
    assert_eq!(tools.len(), 1);
    let tool = &tools[0];
    assert_eq!(tool.id.as_deref(), Some("t1"));
    assert_eq!(tool.status, ToolStatus::Completed);
    assert_eq!(tool.target.as_deref(), Some("/src/main.rs"));
    assert_eq!(tool.started_at, Some(ts("2025-06-01T10:00:00Z")));
    assert_eq!(tool.last_used, Some(ts("2025-06-01T10:00:02Z")));
}

#[tokio::test]
async fn test_unmatched_result_creates_terminal_entry() {
    let transcript = Transcript::with_lines(&[
        json!({"type": "tool_result", "tool_result": {"tool_use_id": "t9", "is_error": true}}),
    ]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();

    let tools = parser.tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].id.as_deref(), Some("t9"));
    assert_eq!(tools[0].status, ToolStatus::Error);
    assert_eq!(parser.active_tool_count(), 0);
}

#[tokio::test]
async fn test_content_blocks_fold_into_tool_table() {
    let transcript = Transcript::with_lines(&[
        assistant(
            "2025-06-01T10:00:00Z",
            json!([
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "a", "name": "Read", "input": {"file_path": "/a.rs"}},
                {"type": "tool_use", "id": "b", "name": "Bash", "input": {"command": "cargo fmt\ncargo test"}}
            ]),
            Some(json!({"input_tokens": 100, "output_tokens": 20, "cache_read_input_tokens": 5000})),
        ),
        user_results(
            "2025-06-01T10:00:05Z",
            json!([{"type": "tool_result", "tool_use_id": "a", "content": "fn main() {}"}]),
        ),
    ]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();

    assert_eq!(parser.tools().len(), 2);
    assert_eq!(parser.active_tool_count(), 1);
    let running = parser.tools_by_status(10, 10).running;
    assert_eq!(running[0].name, "Bash");
    assert_eq!(running[0].target.as_deref(), Some("cargo fmt"));

    let (input, output) = parser.total_tokens();
    assert_eq!(input.as_u64(), 100);
    assert_eq!(output.as_u64(), 20);
    assert_eq!(parser.model_id().as_deref(), Some("claude-opus-4-1"));
    assert!(parser.latest_event(EventKind::Assistant).is_some());
}

#[tokio::test]
async fn test_recency_returns_latest_invocation() {
    let transcript = Transcript::with_lines(&[
        json!({"type": "tool_use", "timestamp": "2025-06-01T10:00:01Z", "tool_use": {"id": "t1", "name": "Grep"}}),
        json!({"type": "tool_use", "timestamp": "2025-06-01T10:00:02Z", "tool_use": {"id": "t2", "name": "Grep"}}),
        json!({"type": "tool_use", "timestamp": "2025-06-01T10:00:03Z", "tool_use": {"id": "t3", "name": "Grep"}}),
    ]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();

    let recent = parser.tools_by_recency(1);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].last_used, Some(ts("2025-06-01T10:00:03Z")));
    assert_eq!(parser.tools_by_recency(10).len(), 3);
}

// ============================================================================
// Context and cost
// ============================================================================

#[tokio::test]
async fn test_percentage_clamps_to_hundred() {
    let transcript = Transcript::with_lines(&[assistant(
        "2025-06-01T10:00:00Z",
        json!([]),
        Some(json!({"input_tokens": 900000, "output_tokens": 1})),
    )]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();
    assert_eq!(parser.context_percentage(), 100.0);
}

#[tokio::test]
async fn test_percentage_zero_usage() {
    let transcript = Transcript::with_lines(&[assistant(
        "2025-06-01T10:00:00Z",
        json!([]),
        Some(json!({"input_tokens": 0, "output_tokens": 0})),
    )]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();
    assert_eq!(parser.context_percentage(), 0.0);
}

#[tokio::test]
async fn test_percentage_includes_reserved_buffer() {
    let transcript = Transcript::with_lines(&[assistant(
        "2025-06-01T10:00:00Z",
        json!([]),
        Some(json!({"input_tokens": 5000, "cache_creation_input_tokens": 10000, "cache_read_input_tokens": 40000})),
    )]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();
    // (5_000 + 10_000 + 40_000 + 45_000) * 100 / 200_000
    assert!((parser.context_percentage() - 50.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_opus_cost() {
    let transcript = Transcript::with_lines(&[assistant(
        "2025-06-01T10:00:00Z",
        json!([]),
        Some(json!({"input_tokens": 1000000, "output_tokens": 500000})),
    )]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();
    assert!((parser.estimated_cost().as_usd() - 52.50).abs() < 0.01);
}

// ============================================================================
// Agents and todos
// ============================================================================

#[tokio::test]
async fn test_todo_snapshot() {
    let transcript = Transcript::with_lines(&[
        json!({"type": "todo", "todo": {"id": "1", "content": "Write parser", "status": "pending"}}),
        json!({"type": "todo", "todo": {"id": "2", "content": "Write watcher", "status": "in_progress", "priority": "high"}}),
        json!({"type": "todo", "todo": {"id": "3", "content": "Write README", "status": "completed"}}),
    ]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();

    assert_eq!(parser.todo_count(), (3, 1));
    let current = parser.current_todo().unwrap();
    assert_eq!(current.id, "2");
    assert_eq!(current.status, TodoStatus::InProgress);
}

#[tokio::test]
async fn test_todo_write_replaces_todos() {
    let transcript = Transcript::with_lines(&[
        json!({"type": "todo", "todo": {"id": "x", "content": "stale", "status": "pending"}}),
        assistant(
            "2025-06-01T10:00:00Z",
            json!([{"type": "tool_use", "id": "tw1", "name": "TodoWrite", "input": {"todos": [
                {"content": "Plan", "status": "completed", "activeForm": "Planning"},
                {"content": "Build", "status": "in_progress", "activeForm": "Building"},
                {"content": "Ship", "status": "pending", "activeForm": "Shipping"}
            ]}}]),
            None,
        ),
    ]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();

    let todos = parser.todos();
    let contents: Vec<&str> = todos.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, ["Plan", "Build", "Ship"]);
    assert_eq!(parser.current_todo().unwrap().id, "2");
}

#[tokio::test]
async fn test_task_block_creates_agent() {
    let transcript = Transcript::with_lines(&[
        assistant(
            "2025-06-01T10:00:00Z",
            json!([{"type": "tool_use", "id": "task-1", "name": "Task", "input": {
                "subagent_type": "Explore", "description": "Map the codebase", "prompt": "..."
            }}]),
            None,
        ),
        assistant(
            "2025-06-01T10:00:01Z",
            json!([{"type": "tool_use", "id": "task-2", "name": "Task", "input": {"subagent_type": "Plan"}}]),
            None,
        ),
        user_results(
            "2025-06-01T10:01:00Z",
            json!([{"type": "tool_result", "tool_use_id": "task-1"}]),
        ),
    ]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();

    let agents = parser.agents();
    assert_eq!(agents.len(), 2);
    assert_eq!(agents[0].agent_type, AgentType::Explore);
    assert_eq!(agents[0].status, AgentStatus::Completed);
    assert_eq!(agents[1].agent_type, AgentType::Plan);
    assert_eq!(parser.active_agent_count(), 1);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_malformed_line_is_counted_and_skipped() {
    let transcript = Transcript::new();
    transcript.append(&[json!({"type": "tool_use", "tool_use": {"id": "t1", "name": "Read"}})]);
    transcript.append_raw("{\"type\": \"tool_use\", \"tool_use\": {\n");
    transcript.append(&[json!({"type": "tool_result", "tool_result": {"tool_use_id": "t1"}})]);

    let parser = TranscriptParser::new(transcript.path());
    let outcome = parse(&parser).await.unwrap();

    let state = parser.parser_state();
    assert_eq!(state.lines_parsed, 3);
    assert!(state.errors_encountered >= 1);
    assert!(state.last_parse.is_some());
    assert!(matches!(outcome, ParseOutcome::Parsed { lines: 3, .. }));
    assert_eq!(parser.tools()[0].status, ToolStatus::Completed);
}

#[tokio::test]
async fn test_many_malformed_lines_do_not_fail_parse() {
    let transcript = Transcript::new();
    for _ in 0..20 {
        transcript.append_raw("not json\n");
    }
    transcript.append(&[json!({"type": "summary", "summary": "ok"})]);

    let parser = TranscriptParser::new(transcript.path());
    let outcome = parse(&parser).await.unwrap();
    assert_eq!(outcome, ParseOutcome::Parsed { lines: 21, errors: 20 });
}

#[tokio::test]
async fn test_missing_file_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let parser = TranscriptParser::new(dir.path().join("missing.jsonl"));
    let err = parse(&parser).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_line_too_long_keeps_previous_snapshot() {
    let transcript = Transcript::with_lines(&[json!({"type": "tool_use", "tool_use": {"id": "t1", "name": "Read"}})]);
    let parser = TranscriptParser::with_config(
        transcript.path(),
        ParserConfig {
            max_line_bytes: 256,
        },
    );
    parse(&parser).await.unwrap();
    let before = parser.parser_state();

    let long = "x".repeat(1024);
    transcript.append(&[json!({"type": "summary", "summary": long})]);
    let err = parse(&parser).await.unwrap_err();

    assert!(matches!(err, ParseError::LineTooLong { line: 2, max: 256, .. }));
    assert_eq!(parser.parser_state(), before);
    assert_eq!(parser.tools().len(), 1);
}

#[tokio::test]
async fn test_cancelled_token_leaves_state_untouched() {
    let transcript = Transcript::with_lines(&[json!({"type": "tool_use", "tool_use": {"id": "t1", "name": "Read"}})]);
    let parser = TranscriptParser::new(transcript.path());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = parser.parse(&cancel).await.unwrap_err();

    assert!(matches!(
        err,
        ParseError::Cancelled {
            reason: CancelReason::Token
        }
    ));
    assert_eq!(parser.parser_state().lines_parsed, 0);
    assert!(parser.tools().is_empty());

    // The fingerprint was not committed, so a later parse still runs.
    let outcome = parse(&parser).await.unwrap();
    assert_eq!(outcome, ParseOutcome::Parsed { lines: 1, errors: 0 });
}

#[tokio::test]
async fn test_parse_with_generous_timeout() {
    let transcript = Transcript::with_lines(&[json!({"type": "summary", "summary": "s"})]);
    let parser = TranscriptParser::new(transcript.path());
    let outcome = parser
        .parse_with_timeout(Duration::from_secs(5), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, ParseOutcome::Parsed { lines: 1, errors: 0 });
}

#[tokio::test]
async fn test_expired_deadline_keeps_committed_snapshot() {
    let transcript = Transcript::with_lines(&[json!({"type": "tool_use", "tool_use": {"id": "t1", "name": "Read"}})]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();
    let before = parser.parser_state();

    transcript.append(&[json!({"type": "tool_use", "tool_use": {"id": "t2", "name": "Edit"}})]);
    // The stat runs on the blocking pool, so a zero deadline always expires.
    let err = parser
        .parse_with_timeout(Duration::ZERO, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ParseError::Cancelled {
            reason: CancelReason::Deadline
        }
    ));
    assert!(err.is_cancelled());
    assert_eq!(parser.parser_state(), before);
    assert_eq!(parser.tools().len(), 1);

    let outcome = parse(&parser).await.unwrap();
    assert_eq!(outcome, ParseOutcome::Parsed { lines: 2, errors: 0 });
}

#[tokio::test]
async fn test_cancel_during_reparse_keeps_committed_snapshot() {
    let transcript = Transcript::with_lines(&[json!({"type": "tool_use", "tool_use": {"id": "t0", "name": "Read"}})]);
    let parser = TranscriptParser::new(transcript.path());
    parse(&parser).await.unwrap();
    let before = parser.parser_state();

    let more: Vec<Value> = (1..5_000)
        .map(|i| json!({"type": "tool_use", "tool_use": {"id": format!("t{i}"), "name": "Grep"}}))
        .collect();
    transcript.append(&more);

    let cancel = CancellationToken::new();
    let (result, ()) = tokio::join!(parser.parse(&cancel), async {
        tokio::task::yield_now().await;
        cancel.cancel();
    });

    assert!(matches!(
        result,
        Err(ParseError::Cancelled {
            reason: CancelReason::Token
        })
    ));
    assert_eq!(parser.parser_state(), before);
    assert_eq!(parser.tools().len(), 1);

    // The fingerprint still describes the old file, so the next parse runs.
    let outcome = parse(&parser).await.unwrap();
    assert_eq!(outcome, ParseOutcome::Parsed { lines: 5_000, errors: 0 });
    assert_eq!(parser.tools().len(), 5_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_see_whole_snapshots() {
    let transcript = Transcript::new();
    let lines: Vec<Value> = (0..2_000)
        .map(|i| json!({"type": "tool_use", "tool_use": {"id": format!("t{i}"), "name": "Read"}}))
        .collect();
    transcript.append(&lines);

    let parser = Arc::new(TranscriptParser::new(transcript.path()));
    let reader = {
        let parser = Arc::clone(&parser);
        tokio::spawn(async move {
            for _ in 0..200 {
                let count = parser.tools().len();
                assert!(count == 0 || count == 2_000, "partial snapshot: {count}");
                tokio::task::yield_now().await;
            }
        })
    };

    parse(&parser).await.unwrap();
    reader.await.unwrap();
    assert_eq!(parser.tools().len(), 2_000);
}

// ============================================================================
// Issue log
// ============================================================================

#[test]
fn test_issue_log_counts_and_skip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("issues.jsonl");
    std::fs::write(
        &path,
        [
            json!({"id": "bd-1", "title": "Parser", "status": "open", "priority": 1}),
            json!({"id": "bd-2", "title": "Watcher", "status": "in_progress"}),
            json!({"id": "bd-3", "title": "Docs", "status": "blocked"}),
            json!({"id": "bd-1", "title": "Parser", "status": "closed"}),
        ]
        .iter()
        .map(|v| format!("{v}\n"))
        .collect::<String>(),
    )
    .unwrap();

    let mut log = IssueLog::new(&path);
    let outcome = log.refresh().unwrap();
    assert_eq!(outcome, ParseOutcome::Parsed { lines: 4, errors: 0 });
    assert_eq!(
        log.counts(),
        IssueCounts {
            open: 0,
            in_progress: 1,
            blocked: 1,
            closed: 1
        }
    );
    assert_eq!(log.issues().len(), 3);
    assert_eq!(log.refresh().unwrap(), ParseOutcome::Unchanged);
}

#[test]
fn test_issue_log_missing_and_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("issues.jsonl");
    let mut log = IssueLog::new(&path);
    assert!(log.refresh().unwrap_err().is_not_found());

    std::fs::write(&path, "garbage\n{\"id\": 7, \"status\": \"weird\"}\n").unwrap();
    let outcome = log.refresh().unwrap();
    assert_eq!(outcome, ParseOutcome::Parsed { lines: 2, errors: 1 });
    assert_eq!(log.counts().open, 1);
    assert_eq!(log.issues()[0].id, "7");
}
