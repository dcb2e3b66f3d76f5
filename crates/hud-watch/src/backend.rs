//! Native change-notification backends.
//!
//! A [`NativeBackend`] opens a [`NativeSession`] over a set of files and
//! reports through a [`NativeSink`]. Dropping the session stops the
//! notifications. The watcher treats every signal as a hint only: it
//! re-checks the file's mtime before emitting anything.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::WatchError;

/// Raw signal from a native session to the watcher loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NativeSignal {
    Changed(PathBuf),
    Failed(String),
}

/// Sending half handed to a backend session.
///
/// Sends never block: when the watcher loop falls behind, signals are
/// dropped and counted.
#[derive(Debug, Clone)]
pub struct NativeSink {
    tx: mpsc::Sender<NativeSignal>,
    dropped: Arc<AtomicU64>,
}

impl NativeSink {
    pub(crate) fn new(tx: mpsc::Sender<NativeSignal>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Reports that `path` may have changed.
    pub fn changed(&self, path: PathBuf) {
        self.send(NativeSignal::Changed(path));
    }

    /// Reports a backend failure; the watcher falls back to polling.
    pub fn failed(&self, reason: impl Into<String>) {
        self.send(NativeSignal::Failed(reason.into()));
    }

    fn send(&self, signal: NativeSignal) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(signal) {
            let count = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if count == 1 || count % 100 == 0 {
                warn!(dropped_total = count, "Native watch signal dropped, channel full");
            }
        }
    }
}

/// A live native watch. Dropping it stops notifications.
pub trait NativeSession: Send {
    /// Directories the session observes.
    fn directories(&self) -> Vec<PathBuf>;
}

/// Factory for native sessions.
pub trait NativeBackend: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Opens a session covering `paths`.
    fn open(&self, paths: &[PathBuf], sink: NativeSink) -> Result<Box<dyn NativeSession>, WatchError>;
}

// ============================================================================
// notify backend
// ============================================================================

/// Production backend: the platform's recommended `notify` watcher on the
/// parent directory of each watched file, non-recursive.
///
/// Watching directories instead of files keeps notifications flowing when an
/// editor replaces a file by rename.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyBackend;

struct NotifySession {
    _watcher: RecommendedWatcher,
    directories: Vec<PathBuf>,
}

impl NativeSession for NotifySession {
    fn directories(&self) -> Vec<PathBuf> {
        self.directories.clone()
    }
}

impl NativeBackend for NotifyBackend {
    fn name(&self) -> &'static str {
        "notify"
    }

    fn open(&self, paths: &[PathBuf], sink: NativeSink) -> Result<Box<dyn NativeSession>, WatchError> {
        let directories: BTreeSet<PathBuf> = paths
            .iter()
            .filter_map(|p| p.parent())
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect();

        let mut watcher = notify::recommended_watcher(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        for path in event.paths {
                            sink.changed(path);
                        }
                    }
                }
                Err(e) => sink.failed(e.to_string()),
            },
        )?;

        for dir in &directories {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            debug!(dir = %dir.display(), "Native watch registered");
        }

        Ok(Box::new(NotifySession {
            _watcher: watcher,
            directories: directories.into_iter().collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = NativeSink::new(tx);
        sink.changed(PathBuf::from("/a"));
        sink.changed(PathBuf::from("/b"));
        assert_eq!(sink.dropped.load(Ordering::Relaxed), 1);
        assert_eq!(rx.recv().await, Some(NativeSignal::Changed(PathBuf::from("/a"))));
    }

    #[tokio::test]
    async fn test_notify_backend_watches_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        std::fs::write(&a, "").unwrap();
        std::fs::write(&b, "").unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let session = NotifyBackend
            .open(&[a, b], NativeSink::new(tx))
            .unwrap();
        assert_eq!(session.directories(), vec![dir.path().to_path_buf()]);
    }
}
