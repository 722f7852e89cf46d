//! The watch agent: single owner of the registry and the backend handle.
//!
//! # State Machine
//!
//! ```text
//! Starting ──► Running ──► Stopped
//!                 │  ▲
//!                 ▼  │
//!             Crashed ──► Restarting
//! ```
//!
//! One agent lives as long as its [`DirWatcher`](crate::DirWatcher); the
//! supervisor calls [`WatchAgent`]'s run method once per incarnation. Each
//! incarnation opens a fresh backend handle and serves a single
//! `tokio::select!` loop over cancellation, commands, and backend messages,
//! handling one message to completion before reading the next. Because the
//! loop is the only code touching the [`PathRegistry`], registry mutations
//! are totally ordered without any lock.
//!
//! The command receiver outlives incarnations, so commands sent while the
//! agent restarts stay queued for the next one.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use rustc_hash::FxHashSet;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backend::{BackendHandle, BackendMessage, BackendSink, WatchBackend};
use crate::error::WatchError;
use crate::events::Event;
use crate::exclude::ExclusionMatcher;
use crate::registry::{PathRegistry, WatchedPath};
use crate::spawn::{spawn, spawn_blocking};
use crate::supervisor::Supervised;
use crate::tree::{TreeEnumerator, TreeMode};

/// Capacity of the backend message channel of each incarnation.
const BACKEND_CHANNEL_CAPACITY: usize = 256;

/// Callback receiving every delivered event.
pub type NotifyFn = Arc<dyn Fn(Event) + Send + Sync>;

/// Lifecycle state of the watch agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentState {
    /// First incarnation is opening its backend.
    Starting,
    /// Serving commands and events.
    Running,
    /// The last incarnation failed; waiting out the restart backoff.
    Crashed,
    /// A later incarnation is opening its backend.
    Restarting,
    /// Stopped for good.
    Stopped,
}

/// Where an add request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddOrigin {
    /// A caller of [`DirWatcher::add`](crate::DirWatcher::add).
    Caller,
    /// A directory that showed up in a backend event.
    Discovered,
    /// A directory produced by a tree walk.
    Enumerated,
    /// A root re-submitted after a backend restart.
    Restored,
}

impl AddOrigin {
    /// Returns `true` if a recursive directory added with this origin has
    /// its subtree walked.
    ///
    /// Enumerated entries are already part of a walk.
    #[inline]
    #[must_use]
    pub const fn walks_subtree(self) -> bool {
        !matches!(self, Self::Enumerated)
    }
}

/// Request to bring a path under watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    /// Path to watch.
    pub path: Utf8PathBuf,
    /// Explicit recursive flag; `None` inherits from the nearest registered
    /// ancestor, falling back to the configured default.
    pub recursive: Option<bool>,
    /// Where the request came from.
    pub origin: AddOrigin,
}

impl AddRequest {
    /// Creates a new add request.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, recursive: Option<bool>, origin: AddOrigin) -> Self {
        Self {
            path: path.into(),
            recursive,
            origin,
        }
    }
}

/// Message to the agent loop.
#[derive(Debug)]
pub enum Command {
    /// Bring a path under watch.
    Add(AddRequest),
    /// Reply with the current registry contents.
    Snapshot(oneshot::Sender<Vec<WatchedPath>>),
}

/// Sends `command`, giving up if `token` is cancelled first.
pub(crate) async fn send_command(
    tx: &mpsc::Sender<Command>,
    token: &CancellationToken,
    command: Command,
) -> Result<(), WatchError> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(WatchError::Stopped),
        sent = tx.send(command) => sent.map_err(|_| WatchError::Stopped),
    }
}

/// Everything the agent needs besides its backend.
pub(crate) struct AgentContext {
    pub notify: NotifyFn,
    pub matcher: Arc<ExclusionMatcher>,
    pub default_recursive: bool,
    pub token: CancellationToken,
    pub command_tx: mpsc::Sender<Command>,
    pub command_rx: mpsc::Receiver<Command>,
    pub state: watch::Sender<AgentState>,
}

/// The single-owner watch agent.
pub struct WatchAgent<B: WatchBackend> {
    backend: B,
    registry: PathRegistry,
    notify: NotifyFn,
    matcher: Arc<ExclusionMatcher>,
    default_recursive: bool,
    token: CancellationToken,
    command_tx: mpsc::Sender<Command>,
    command_rx: mpsc::Receiver<Command>,
    state: watch::Sender<AgentState>,
    incarnation: u64,
}

impl<B: WatchBackend> WatchAgent<B> {
    pub(crate) fn new(backend: B, context: AgentContext) -> Self {
        Self {
            backend,
            registry: PathRegistry::new(),
            notify: context.notify,
            matcher: context.matcher,
            default_recursive: context.default_recursive,
            token: context.token,
            command_tx: context.command_tx,
            command_rx: context.command_rx,
            state: context.state,
            incarnation: 0,
        }
    }

    /// Marks the agent as stopped for good.
    pub(crate) fn finish(&self) {
        self.set_state(AgentState::Stopped);
        info!(watched = self.registry.len(), "Watch agent stopped");
    }

    fn set_state(&self, state: AgentState) {
        self.state.send_replace(state);
    }

    /// Runs one incarnation until cancellation or a fatal backend error.
    async fn run_incarnation(&mut self) -> Result<(), WatchError> {
        self.incarnation += 1;
        self.set_state(if self.incarnation == 1 {
            AgentState::Starting
        } else {
            AgentState::Restarting
        });

        let (sink, mut messages) = BackendSink::channel(BACKEND_CHANNEL_CAPACITY);
        let mut handle = match self.backend.open(sink) {
            Ok(handle) => handle,
            Err(err) => {
                self.set_state(AgentState::Crashed);
                return Err(err);
            }
        };

        self.restore(&mut handle);
        self.set_state(AgentState::Running);
        info!(
            incarnation = self.incarnation,
            watched = self.registry.len(),
            "Watch agent running"
        );

        let result = loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => break Ok(()),
                Some(command) = self.command_rx.recv() => self.on_command(&mut handle, command),
                message = messages.recv() => match message {
                    Some(BackendMessage::Event(event)) => self.on_event(&mut handle, event),
                    Some(BackendMessage::Error(err)) => {
                        warn!(error = %err, "Watch backend error");
                    }
                    None => break Err(WatchError::BackendClosed),
                },
            }
        };

        drop(handle);
        if result.is_err() {
            self.set_state(AgentState::Crashed);
        }
        result
    }

    /// Re-registers what a crashed incarnation had under watch.
    ///
    /// Recursive roots are walked again to pick up directories created
    /// while no backend was running.
    fn restore(&mut self, handle: &mut B::Handle) {
        let snapshot = self.registry.drain();
        if snapshot.is_empty() {
            return;
        }

        let recursive: FxHashSet<Utf8PathBuf> = snapshot
            .iter()
            .filter(|entry| entry.recursive)
            .map(|entry| entry.path.clone())
            .collect();

        info!(paths = snapshot.len(), "Restoring watched paths");
        for entry in snapshot {
            let covered = entry
                .path
                .ancestors()
                .skip(1)
                .any(|ancestor| recursive.contains(ancestor));
            let origin = if covered {
                AddOrigin::Enumerated
            } else {
                AddOrigin::Restored
            };
            self.on_add(handle, AddRequest::new(entry.path, Some(entry.recursive), origin));
        }
    }

    fn on_command(&mut self, handle: &mut B::Handle, command: Command) {
        match command {
            Command::Add(request) => self.on_add(handle, request),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.registry.snapshot());
            }
        }
    }

    fn on_add(&mut self, handle: &mut B::Handle, request: AddRequest) {
        let AddRequest {
            path,
            recursive,
            origin,
        } = request;

        if path.as_str().is_empty() {
            return;
        }
        let path = match tw_core::absolutize(&path) {
            Ok(path) => path,
            Err(err) => {
                warn!(path = %path, error = %err, "Cannot resolve path");
                return;
            }
        };

        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.forget(handle, &path);
                return;
            }
            Err(err) => {
                warn!(path = %path, error = %err, "Cannot stat path");
                return;
            }
        };

        if self.registry.contains(&path) {
            trace!(path = %path, "Already watched");
            return;
        }
        if self.matcher.is_excluded(&path) {
            debug!(path = %path, "Excluded, not watching");
            return;
        }

        let recursive = recursive
            .or_else(|| self.registry.recursive_for(&path))
            .unwrap_or(self.default_recursive);
        let walk = recursive && metadata.is_dir() && origin.walks_subtree();

        // A rejected directory stays unwatched, but its subdirectories may
        // still be watchable
        match handle.register(&path) {
            Ok(()) => {
                self.registry.insert(path.clone(), recursive);
                debug!(path = %path, recursive, ?origin, "Watching path");
            }
            Err(err) => warn!(path = %path, error = %err, "Failed to watch path"),
        }

        if walk {
            self.spawn_walk(path);
        }
    }

    fn on_event(&mut self, handle: &mut B::Handle, event: Event) {
        if self.matcher.is_excluded(&event.path) {
            trace!(path = %event.path, "Dropping excluded event");
            return;
        }

        let path = event.path.clone();
        self.dispatch(event);

        match std::fs::metadata(&path) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => self.forget(handle, &path),
            Err(err) => warn!(path = %path, error = %err, "Cannot stat event path"),
            Ok(metadata) if metadata.is_dir() && !self.registry.contains(&path) => {
                self.spawn_add(AddRequest::new(path, None, AddOrigin::Discovered));
            }
            Ok(_) => {}
        }
    }

    /// Drops `path` and everything registered beneath it.
    fn forget(&mut self, handle: &mut B::Handle, path: &Utf8Path) {
        for entry in self.registry.remove_tree(path) {
            handle.unregister(&entry.path);
            debug!(path = %entry.path, "Forgot vanished path");
        }
    }

    /// Hands `event` to the callback on the blocking pool.
    fn dispatch(&self, event: Event) {
        let notify = Arc::clone(&self.notify);
        spawn_blocking(move || {
            let path = event.path.clone();
            if std::panic::catch_unwind(AssertUnwindSafe(|| (*notify)(event))).is_err() {
                error!(path = %path, "Notify callback panicked");
            }
        });
    }

    /// Queues an add request without blocking the loop on its own channel.
    fn spawn_add(&self, request: AddRequest) {
        let tx = self.command_tx.clone();
        let token = self.token.clone();
        spawn(async move {
            let _ = send_command(&tx, &token, Command::Add(request)).await;
        });
    }

    /// Walks the subtree of a freshly watched directory.
    fn spawn_walk(&self, root: Utf8PathBuf) {
        let tx = self.command_tx.clone();
        let token = self.token.clone();
        let mut entries = TreeEnumerator::new(root)
            .with_mode(TreeMode::ExcludeRoot)
            .with_exclusions(Arc::clone(&self.matcher))
            .spawn(token.clone());

        spawn(async move {
            while let Some(dir) = entries.next().await {
                let request = AddRequest::new(dir, Some(true), AddOrigin::Enumerated);
                if send_command(&tx, &token, Command::Add(request)).await.is_err() {
                    break;
                }
            }
        });
    }
}

impl<B: WatchBackend> Supervised for WatchAgent<B> {
    fn run(&mut self) -> impl std::future::Future<Output = Result<(), WatchError>> + Send {
        self.run_incarnation()
    }
}
