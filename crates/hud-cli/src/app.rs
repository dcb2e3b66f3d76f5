//! Refresh loop tying the watcher, the parser and the renderer together.
//!
//! Every watch event and every refresh tick triggers a bounded parse and a
//! re-render. Parse failures never end the loop: a missing transcript shows
//! the waiting placeholder, anything else keeps the previous snapshot.

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use hud_transcript::{IssueLog, ParseError, ParserConfig, TranscriptParser};
use hud_watch::FileWatcher;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::render::{render, Snapshot, WAITING_PLACEHOLDER};

/// Owns the readers for one session.
pub struct App {
    parser: TranscriptParser,
    issues: Option<IssueLog>,
    config: Config,
    last_line: Option<String>,
}

impl App {
    pub fn new(transcript: &Path, config: Config) -> Self {
        let parser_config = ParserConfig {
            max_line_bytes: config.max_line_bytes,
        };
        let issues = config
            .issues
            .as_ref()
            .map(|path| IssueLog::with_config(path, parser_config.clone()));
        Self {
            parser: TranscriptParser::with_config(transcript, parser_config),
            issues,
            config,
            last_line: None,
        }
    }

    pub fn parser(&self) -> &TranscriptParser {
        &self.parser
    }

    /// Re-reads changed logs and returns the status line.
    pub async fn refresh(&mut self, cancel: &CancellationToken) -> String {
        let transcript = self
            .parser
            .parse_with_timeout(self.config.parse_timeout(), cancel)
            .await;
        let waiting = match transcript {
            Ok(outcome) => {
                debug!(?outcome, "Transcript refreshed");
                false
            }
            Err(ParseError::NotFound { .. }) => true,
            Err(e) if e.is_cancelled() => {
                debug!(error = %e, "Transcript parse abandoned, keeping previous snapshot");
                false
            }
            Err(e) => {
                warn!(error = %e, "Transcript parse failed, keeping previous snapshot");
                false
            }
        };

        if let Some(issues) = self.issues.as_mut() {
            match issues.refresh() {
                Ok(_) => {}
                Err(e) if e.is_not_found() => debug!(error = %e, "Issue log not found"),
                Err(e) => warn!(error = %e, "Issue log refresh failed"),
            }
        }

        if waiting {
            return WAITING_PLACEHOLDER.to_string();
        }
        let snapshot = Snapshot::capture(&self.parser, self.issues.as_ref(), Utc::now());
        render(&snapshot)
    }

    /// Prints `line` unless it matches the last printed one.
    fn show(&mut self, line: String) -> io::Result<()> {
        if self.last_line.as_deref() == Some(line.as_str()) {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        self.last_line = Some(line);
        Ok(())
    }
}

/// Parses once and prints the status line.
pub async fn run_once(transcript: &Path, config: Config) -> Result<()> {
    let mut app = App::new(transcript, config);
    let line = app.refresh(&CancellationToken::new()).await;
    app.show(line)?;
    Ok(())
}

/// Follows the transcript until Ctrl-C.
pub async fn run_live(transcript: &Path, config: Config) -> Result<()> {
    let watcher = FileWatcher::new();
    watcher.set_polling_interval(config.polling_interval());
    watcher.set_recovery_interval(config.recovery_interval());
    if !watcher.add_watch(transcript) {
        info!(path = %transcript.display(), "Transcript not present yet, relying on refresh ticks");
    }
    if let Some(issues) = &config.issues {
        watcher.add_watch(issues);
    }
    debug!(paths = ?watcher.watched_paths(), "Registered watches");

    let mut events = watcher.take_events();
    let mut errors = watcher.take_errors();
    watcher.start().await?;

    let mut ticker = tokio::time::interval(config.refresh_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let cancel = CancellationToken::new();
    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    let mut app = App::new(transcript, config);
    let result: Result<()> = loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown requested");
                break Ok(());
            }

            Some(event) = recv(&mut events) => {
                debug!(path = %event.path.display(), "Watched file changed");
            }

            Some(error) = recv(&mut errors) => {
                debug!(error = %error, mode = %watcher.mode(), "Watcher reported error");
                continue;
            }

            _ = ticker.tick() => {}
        }

        let line = app.refresh(&cancel).await;
        if let Err(e) = app.show(line) {
            break Err(e.into());
        }
    };

    cancel.cancel();
    watcher.stop().await;
    info!("HUD stopped");
    result
}

/// Receives from an optional channel; pending forever when absent.
async fn recv<T>(rx: &mut Option<tokio::sync::mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Waits for SIGTERM / SIGINT (Ctrl-C elsewhere).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
            }
            _ => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
