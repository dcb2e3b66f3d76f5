//! Transcript parser with skip-if-unchanged re-parsing.
//!
//! [`TranscriptParser::parse`] stats the transcript, and when its
//! fingerprint moved since the last committed parse, streams the whole file
//! into a fresh [`SessionAggregate`]. Only a parse that reaches end of file
//! is committed; the swap takes the write lock for a single assignment, so
//! readers see either the previous snapshot or the new one.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Poisoned locks are recovered with `PoisonError::into_inner`

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use hud_core::{
    format_since, AgentInfo, ContextWindow, Event, EventKind, FileFingerprint, FingerprintCache,
    Money, TodoInfo, TokenCount, ToolInfo,
};
use tokio::fs::File;
use tokio::sync::Mutex;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::aggregate::{ParserState, SessionAggregate, ToolsByStatus};
use crate::classify::decode_line;
use crate::error::{CancelReason, LineError, LineErrorLog, ParseError, MAX_LOGGED_LINE_ERRORS};

/// Default cap on a single line (10 MiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Longest accepted line in bytes; longer lines abort the parse.
    pub max_line_bytes: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// What a successful `parse` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Fingerprint unchanged; the file was not opened.
    Unchanged,
    /// A full re-parse was committed.
    Parsed { lines: u64, errors: u64 },
}

#[derive(Debug, Default)]
struct Committed {
    aggregate: SessionAggregate,
    session_start: Option<DateTime<Utc>>,
}

/// Parser and derived-state store for one transcript file.
///
/// `parse` calls serialize on an internal async mutex. The accessors are
/// synchronous and return owned copies of the last committed snapshot.
#[derive(Debug)]
pub struct TranscriptParser {
    path: PathBuf,
    config: ParserConfig,
    committed: RwLock<Committed>,
    fingerprint: Mutex<FingerprintCache>,
}

impl TranscriptParser {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, ParserConfig::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: ParserConfig) -> Self {
        Self {
            path: path.into(),
            config,
            committed: RwLock::new(Committed::default()),
            fingerprint: Mutex::new(FingerprintCache::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    /// Re-parses the transcript if it changed since the last committed parse.
    ///
    /// The token is checked before starting and between lines. On any error
    /// the committed snapshot is left as it was.
    pub async fn parse(&self, cancel: &CancellationToken) -> Result<ParseOutcome, ParseError> {
        if cancel.is_cancelled() {
            return Err(ParseError::Cancelled {
                reason: CancelReason::Token,
            });
        }

        let mut cache = self.fingerprint.lock().await;

        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| ParseError::from_io(&self.path, e))?;
        let fingerprint = FileFingerprint::from_metadata(&metadata)
            .map_err(|e| ParseError::from_io(&self.path, e))?;

        if !cache.needs_reparse(&fingerprint) {
            trace!(path = %self.path.display(), "Transcript unchanged, skipping parse");
            return Ok(ParseOutcome::Unchanged);
        }

        let staged = self.scan(cancel).await?;
        let state = staged.state.clone();
        self.commit(staged);
        cache.commit(fingerprint);

        debug!(
            path = %self.path.display(),
            lines = state.lines_parsed,
            errors = state.errors_encountered,
            "Transcript parsed"
        );
        Ok(ParseOutcome::Parsed {
            lines: state.lines_parsed,
            errors: state.errors_encountered,
        })
    }

    /// [`parse`](Self::parse) bounded by a deadline.
    pub async fn parse_with_timeout(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ParseOutcome, ParseError> {
        match tokio::time::timeout(timeout, self.parse(cancel)).await {
            Ok(result) => result,
            Err(_) => Err(ParseError::Cancelled {
                reason: CancelReason::Deadline,
            }),
        }
    }

    async fn scan(&self, cancel: &CancellationToken) -> Result<SessionAggregate, ParseError> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| ParseError::from_io(&self.path, e))?;
        let codec = AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            Vec::new(),
            self.config.max_line_bytes,
        );
        let mut lines = FramedRead::new(file, codec);

        let mut staged = SessionAggregate::new();
        let mut error_log = LineErrorLog::new(MAX_LOGGED_LINE_ERRORS);
        let mut line_no: u64 = 0;

        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ParseError::Cancelled { reason: CancelReason::Token });
                }
                frame = lines.next() => frame,
            };
            let Some(frame) = frame else {
                break;
            };
            line_no += 1;

            let bytes = match frame {
                Ok(bytes) => bytes,
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    return Err(ParseError::LineTooLong {
                        path: self.path.clone(),
                        line: line_no,
                        max: self.config.max_line_bytes,
                    });
                }
                Err(AnyDelimiterCodecError::Io(e)) => {
                    return Err(ParseError::from_io(&self.path, e));
                }
            };

            let text = match std::str::from_utf8(&bytes) {
                Ok(text) => text.trim(),
                Err(_) => {
                    staged.state.lines_parsed += 1;
                    staged.state.errors_encountered += 1;
                    error_log.record(&self.path, line_no, &LineError::InvalidUtf8);
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }
            staged.state.lines_parsed += 1;

            match decode_line(text) {
                Ok(decoded) => {
                    for error in &decoded.skipped {
                        staged.state.errors_encountered += 1;
                        error_log.record(&self.path, line_no, error);
                    }
                    trace!(line = line_no, kind = %decoded.event.kind, rule = decoded.rule, "Classified line");
                    staged.fold(line_no, decoded);
                }
                Err(error) => {
                    staged.state.errors_encountered += 1;
                    error_log.record(&self.path, line_no, &error);
                }
            }
        }

        error_log.finish(&self.path);
        Ok(staged)
    }

    fn commit(&self, mut staged: SessionAggregate) {
        staged.state.last_parse = Some(Utc::now());
        let mut committed = self
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if committed.session_start.is_none() {
            committed.session_start = staged.earliest_timestamp();
        }
        committed.aggregate = staged;
    }

    fn read(&self) -> RwLockReadGuard<'_, Committed> {
        self.committed.read().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn latest_event(&self, kind: EventKind) -> Option<Event> {
        self.read().aggregate.latest_event(kind)
    }

    pub fn tools(&self) -> Vec<ToolInfo> {
        self.read().aggregate.tools()
    }

    pub fn agents(&self) -> Vec<AgentInfo> {
        self.read().aggregate.agents()
    }

    pub fn todos(&self) -> Vec<TodoInfo> {
        self.read().aggregate.todos()
    }

    /// Most recently used tools first, at most `n`.
    pub fn tools_by_recency(&self, n: usize) -> Vec<ToolInfo> {
        self.read().aggregate.tools_by_recency(n)
    }

    pub fn tools_by_status(&self, max_running: usize, max_completed: usize) -> ToolsByStatus {
        self.read()
            .aggregate
            .tools_by_status(max_running, max_completed)
    }

    pub fn context_window(&self) -> Option<ContextWindow> {
        self.read().aggregate.context_window()
    }

    /// Context usage including the reserved buffer, in `[0, 100]`.
    pub fn context_percentage(&self) -> f64 {
        self.read().aggregate.context_percentage()
    }

    /// Accumulated (input, output) tokens.
    pub fn total_tokens(&self) -> (TokenCount, TokenCount) {
        self.read().aggregate.total_tokens()
    }

    pub fn estimated_cost(&self) -> Money {
        self.read().aggregate.estimated_cost()
    }

    /// Elapsed time since the session started, e.g. "2h 5m".
    pub fn formatted_duration(&self) -> String {
        self.formatted_duration_at(Utc::now())
    }

    pub fn formatted_duration_at(&self, now: DateTime<Utc>) -> String {
        format_since(self.session_start(), now)
    }

    /// (total, completed)
    pub fn todo_count(&self) -> (usize, usize) {
        self.read().aggregate.todo_count()
    }

    pub fn current_todo(&self) -> Option<TodoInfo> {
        self.read().aggregate.current_todo()
    }

    pub fn active_tool_count(&self) -> usize {
        self.read().aggregate.active_tool_count()
    }

    pub fn active_agent_count(&self) -> usize {
        self.read().aggregate.active_agent_count()
    }

    pub fn model_id(&self) -> Option<String> {
        self.read().aggregate.model_id()
    }

    /// Earliest timestamp seen; once set it survives later re-parses.
    pub fn session_start(&self) -> Option<DateTime<Utc>> {
        self.read().session_start
    }

    pub fn parser_state(&self) -> ParserState {
        self.read().aggregate.state()
    }
}
