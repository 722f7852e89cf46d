//! The watch primitive consumed by the agent.
//!
//! The agent needs very little from the operating system: register a single
//! path (non-recursively), unregister it, and deliver events and errors.
//! [`WatchBackend`] captures exactly that, so the agent can run against
//! `notify` in production and an in-memory backend in tests.
//!
//! # Lifecycle
//!
//! 1. The agent creates a [`BackendSink`] and its receiving end.
//! 2. [`WatchBackend::open`] hands the sink to the backend and returns a
//!    handle. A failed open is fatal for the agent incarnation.
//! 3. The backend pushes [`BackendMessage`]s into the sink from any thread.
//! 4. Dropping the handle closes the backend. When every sink clone is
//!    gone the agent sees its message stream end.

use camino::{Utf8Path, Utf8PathBuf};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{Dispatch, trace, warn};

use crate::error::WatchError;
use crate::events::{Event, Op};

/// Something a backend reports to the agent.
#[derive(Debug)]
pub enum BackendMessage {
    /// A change to a path.
    Event(Event),
    /// A non-fatal backend error.
    Error(WatchError),
}

/// Sending half of the backend message stream.
#[derive(Debug, Clone)]
pub struct BackendSink {
    tx: mpsc::Sender<BackendMessage>,
}

impl BackendSink {
    /// Creates a sink and the receiver the agent reads from.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BackendMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Sends from a synchronous backend thread.
    ///
    /// Returns `false` once the agent has gone away. Must not be called from
    /// inside the async runtime.
    pub fn blocking_send(&self, message: BackendMessage) -> bool {
        self.tx.blocking_send(message).is_ok()
    }

    /// Sends from async code.
    ///
    /// Returns `false` once the agent has gone away.
    pub async fn send(&self, message: BackendMessage) -> bool {
        self.tx.send(message).await.is_ok()
    }

    /// Returns `true` if the agent has dropped the receiving end.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Opens backend handles, once per agent incarnation.
pub trait WatchBackend: Send + Sync + 'static {
    /// The open backend.
    type Handle: BackendHandle;

    /// Opens a new handle that reports into `sink`.
    fn open(&self, sink: BackendSink) -> Result<Self::Handle, WatchError>;
}

/// An open backend. Dropping it closes the backend.
pub trait BackendHandle: Send + 'static {
    /// Starts watching a single path, not its subdirectories.
    fn register(&mut self, path: &Utf8Path) -> Result<(), WatchError>;

    /// Stops watching a path. Best-effort: failures are ignored.
    fn unregister(&mut self, path: &Utf8Path);
}

/// Production backend built on the platform's recommended `notify` watcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyBackend;

impl WatchBackend for NotifyBackend {
    type Handle = NotifyHandle;

    fn open(&self, sink: BackendSink) -> Result<Self::Handle, WatchError> {
        // The notify thread does not inherit the agent's log sink
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        let watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            tracing::dispatcher::with_default(&dispatch, || forward(&sink, result));
        })?;
        Ok(NotifyHandle { watcher })
    }
}

/// An open `notify` watcher.
pub struct NotifyHandle {
    watcher: RecommendedWatcher,
}

impl std::fmt::Debug for NotifyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyHandle").finish_non_exhaustive()
    }
}

impl BackendHandle for NotifyHandle {
    fn register(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
        self.watcher
            .watch(path.as_std_path(), RecursiveMode::NonRecursive)?;
        Ok(())
    }

    fn unregister(&mut self, path: &Utf8Path) {
        // The OS usually drops the watch of a deleted path on its own
        if let Err(err) = self.watcher.unwatch(path.as_std_path()) {
            trace!(path = %path, error = %err, "Unwatch failed");
        }
    }
}

/// Converts a raw `notify` result into backend messages.
///
/// Runs on the notify thread.
fn forward(sink: &BackendSink, result: notify::Result<notify::Event>) {
    let event = match result {
        Ok(event) => event,
        Err(err) => {
            sink.blocking_send(BackendMessage::Error(err.into()));
            return;
        }
    };

    if event.need_rescan() {
        warn!("Backend reported dropped events; changes may have been missed");
    }

    let op = Op::from(&event.kind);
    for path in event.paths {
        let path = match Utf8PathBuf::from_path_buf(path) {
            Ok(path) => path,
            Err(invalid) => {
                warn!(path = %invalid.display(), "Skipping non-UTF-8 path in file event");
                continue;
            }
        };

        if !sink.blocking_send(BackendMessage::Event(Event::new(path, op))) {
            trace!("Backend sink closed, dropping event");
            return;
        }
    }
}
