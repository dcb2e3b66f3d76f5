//! Dual-strategy file watcher.
//!
//! [`FileWatcher`] observes a set of files and emits [`WatchEvent`]s when a
//! file's mtime advances. It prefers the native backend and falls back to
//! polling whenever the backend fails; a recovery task periodically retries
//! the native backend while polling.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Poisoned locks are recovered with `PoisonError::into_inner`
//!
//! # Backpressure
//!
//! Channels are bounded. A full event channel drops the newest event and
//! counts it; events only mean "re-read now", so the consumer catches up on
//! the next delivered event.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backend::{NativeBackend, NativeSession, NativeSignal, NativeSink, NotifyBackend};
use crate::error::WatchError;
use crate::event::{WatchEvent, WatchMode};

/// Capacity of the event, error and native-signal channels.
pub const CHANNEL_CAPACITY: usize = 100;

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(30);

/// Lower bound for both intervals.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Shared state
// ============================================================================

struct WatchState {
    /// Canonical path -> last observed mtime.
    paths: BTreeMap<PathBuf, SystemTime>,
    mode: WatchMode,
    session: Option<Box<dyn NativeSession>>,
    sink: Option<NativeSink>,
    polling_interval: Duration,
    recovery_interval: Duration,
    started: bool,
}

struct Shared {
    state: Mutex<WatchState>,
    backend: Box<dyn NativeBackend>,
    events: Mutex<Option<mpsc::Sender<WatchEvent>>>,
    errors: Mutex<Option<mpsc::Sender<WatchError>>>,
    dropped_events: AtomicU64,
    /// Wakes the driver so it re-reads the mode.
    mode_changed: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, WatchState> {
        lock(&self.state)
    }

    fn mode(&self) -> WatchMode {
        self.state().mode
    }

    /// Opens (or re-opens) a native session over every watched path.
    fn open_native(&self) -> Result<(), WatchError> {
        let mut state = self.state();
        let sink = state.sink.clone().ok_or(WatchError::Stopped)?;
        let paths: Vec<PathBuf> = state.paths.keys().cloned().collect();
        // Release the previous session before registering new watches.
        state.session = None;
        let session = self.backend.open(&paths, sink)?;
        state.session = Some(session);
        state.mode = WatchMode::Native;
        drop(state);
        self.mode_changed.notify_one();
        Ok(())
    }

    fn fall_back(&self, error: WatchError) {
        {
            let mut state = self.state();
            state.session = None;
            state.mode = WatchMode::Polling;
        }
        self.mode_changed.notify_one();
        warn!(backend = self.backend.name(), error = %error, "Native watching failed, falling back to polling");
        self.publish_error(error);
    }

    /// Records `mtime` for `path` if it advanced. Returns true when it did.
    fn advance(&self, path: &Path, mtime: SystemTime) -> bool {
        let mut state = self.state();
        match state.paths.get_mut(path) {
            Some(last) if mtime > *last => {
                *last = mtime;
                true
            }
            _ => false,
        }
    }

    async fn check_path(&self, path: &Path) {
        if !self.state().paths.contains_key(path) {
            return;
        }
        let mtime = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) => {
                trace!(path = %path.display(), error = %e, "Skipping stat failure");
                return;
            }
        };
        if self.advance(path, mtime) {
            self.emit(WatchEvent::modified(path.to_path_buf()));
        }
    }

    async fn poll_once(&self) {
        let paths: Vec<PathBuf> = self.state().paths.keys().cloned().collect();
        for path in paths {
            self.check_path(&path).await;
        }
    }

    fn emit(&self, event: WatchEvent) {
        let Some(tx) = lock(&self.events).clone() else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                let count = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                if count == 1 || count % 100 == 0 {
                    warn!(
                        dropped_total = count,
                        path = %event.path.display(),
                        "Watch event channel full, event dropped"
                    );
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Watch event receiver dropped");
            }
        }
    }

    fn publish_error(&self, error: WatchError) {
        if let Some(tx) = lock(&self.errors).clone() {
            if tx.try_send(error).is_err() {
                debug!("Watch error not delivered");
            }
        }
    }

    fn close(&self) {
        {
            let mut state = self.state();
            state.session = None;
            state.sink = None;
            state.started = false;
        }
        lock(&self.events).take();
        lock(&self.errors).take();
    }
}

// ============================================================================
// FileWatcher
// ============================================================================

enum Lifecycle {
    Idle,
    Running(Vec<JoinHandle<()>>),
    Stopped,
}

/// Watches files for modification, natively when possible.
///
/// Construct with [`FileWatcher::new`], register paths, take the receivers,
/// then [`start`](Self::start). [`stop`](Self::stop) joins every background
/// task before the channels close.
pub struct FileWatcher {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    events_rx: Mutex<Option<mpsc::Receiver<WatchEvent>>>,
    errors_rx: Mutex<Option<mpsc::Receiver<WatchError>>>,
}

impl FileWatcher {
    /// Creates a watcher using the `notify` backend.
    pub fn new() -> Self {
        Self::with_backend(NotifyBackend)
    }

    pub fn with_backend(backend: impl NativeBackend) -> Self {
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (errors_tx, errors_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let shared = Shared {
            state: Mutex::new(WatchState {
                paths: BTreeMap::new(),
                mode: WatchMode::Polling,
                session: None,
                sink: None,
                polling_interval: DEFAULT_POLLING_INTERVAL,
                recovery_interval: DEFAULT_RECOVERY_INTERVAL,
                started: false,
            }),
            backend: Box::new(backend),
            events: Mutex::new(Some(events_tx)),
            errors: Mutex::new(Some(errors_tx)),
            dropped_events: AtomicU64::new(0),
            mode_changed: Notify::new(),
        };
        Self {
            shared: Arc::new(shared),
            cancel: CancellationToken::new(),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::Idle),
            events_rx: Mutex::new(Some(events_rx)),
            errors_rx: Mutex::new(Some(errors_rx)),
        }
    }

    /// Registers `path`. Returns false (and does nothing) when the path does
    /// not exist or is already watched.
    pub fn add_watch(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let registered = std::fs::canonicalize(path).and_then(|canonical| {
            let mtime = std::fs::metadata(&canonical)?.modified()?;
            Ok((canonical, mtime))
        });
        let (canonical, mtime) = match registered {
            Ok(found) => found,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Not watching missing path");
                return false;
            }
        };

        let reopen = {
            let mut state = self.shared.state();
            if state.paths.contains_key(&canonical) {
                return false;
            }
            debug!(path = %canonical.display(), "Watching path");
            state.paths.insert(canonical, mtime);
            state.started && state.mode == WatchMode::Native
        };

        if reopen {
            if let Err(e) = self.shared.open_native() {
                self.shared.fall_back(e);
            }
        }
        true
    }

    /// Starts watching. Native setup failures never fail this call; the
    /// watcher falls back to polling and reports on the error channel.
    pub async fn start(&self) -> Result<(), WatchError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => return Err(WatchError::AlreadyStarted),
            Lifecycle::Stopped => return Err(WatchError::Stopped),
        }

        let (signal_tx, signal_rx) = mpsc::channel(CHANNEL_CAPACITY);
        {
            let mut state = self.shared.state();
            state.sink = Some(NativeSink::new(signal_tx));
            state.started = true;
        }

        match self.shared.open_native() {
            Ok(()) => info!(backend = self.shared.backend.name(), "File watcher started in native mode"),
            Err(e) => self.shared.fall_back(e),
        }

        let driver = tokio::spawn(run_driver(
            Arc::clone(&self.shared),
            signal_rx,
            self.cancel.clone(),
        ));
        let recovery = tokio::spawn(run_recovery(Arc::clone(&self.shared), self.cancel.clone()));
        *lifecycle = Lifecycle::Running(vec![driver, recovery]);
        Ok(())
    }

    /// Stops watching. Idempotent; concurrent callers wait for the first.
    ///
    /// Receivers observe channel closure only after every background task
    /// has exited.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        if matches!(previous, Lifecycle::Stopped) {
            return;
        }

        self.cancel.cancel();
        if let Lifecycle::Running(handles) = previous {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Watcher task failed");
                }
            }
        }
        self.shared.close();
        info!("File watcher stopped");
    }

    /// Receiving end of the event channel; `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::Receiver<WatchEvent>> {
        lock(&self.events_rx).take()
    }

    /// Receiving end of the error channel; `None` after the first call.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<WatchError>> {
        lock(&self.errors_rx).take()
    }

    pub fn set_polling_interval(&self, interval: Duration) {
        self.shared.state().polling_interval = interval.max(MIN_INTERVAL);
    }

    pub fn set_recovery_interval(&self, interval: Duration) {
        self.shared.state().recovery_interval = interval.max(MIN_INTERVAL);
    }

    pub fn mode(&self) -> WatchMode {
        self.shared.mode()
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.shared.state().paths.keys().cloned().collect()
    }

    /// Events dropped because the consumer fell behind.
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped_events.load(Ordering::Relaxed)
    }
}

impl Default for FileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Background tasks
// ============================================================================

/// Handles native signals in native mode and polls in polling mode.
async fn run_driver(
    shared: Arc<Shared>,
    mut signals: mpsc::Receiver<NativeSignal>,
    cancel: CancellationToken,
) {
    loop {
        let (mode, interval) = {
            let state = shared.state();
            (state.mode, state.polling_interval)
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = shared.mode_changed.notified() => {
                trace!(mode = %shared.mode(), "Watch mode changed");
            }

            Some(signal) = signals.recv() => match signal {
                NativeSignal::Changed(path) => {
                    if mode == WatchMode::Native {
                        shared.check_path(&path).await;
                    }
                }
                NativeSignal::Failed(reason) => {
                    if mode == WatchMode::Native {
                        shared.fall_back(WatchError::Backend(reason));
                    }
                }
            },

            _ = tokio::time::sleep(interval), if mode == WatchMode::Polling => {
                shared.poll_once().await;
            }
        }
    }
    debug!("Watch driver exited");
}

/// Retries the native backend every recovery interval while polling.
async fn run_recovery(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let interval = shared.state().recovery_interval;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        if shared.mode() != WatchMode::Polling {
            continue;
        }
        match shared.open_native() {
            Ok(()) => {
                info!(backend = shared.backend.name(), "Native file watching restored");
                // Catch changes made while switching over.
                shared.poll_once().await;
            }
            Err(e) => debug!(error = %e, "Native watch recovery failed, still polling"),
        }
    }
    debug!("Watch recovery exited");
}
