//! The public controller for a supervised watch agent.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────┐       ┌────────────────────────────────────┐
//! │ DirWatcher                 │       │ supervise(WatchAgent)  (tokio task)│
//! │  add() ──────────────┐     │       │                                    │
//! │  watched_paths() ────┤     │ mpsc  │  select! {                         │
//! │  stop() → token      │     │ ────► │    token.cancelled()               │
//! └──────────────────────┼─────┘       │    commands  ◄── tree walkers,     │
//!                        └────────────►│                  discovered dirs   │
//!                                      │    backend   ◄── notify thread     │
//!                                      │  }                                 │
//!                                      └───────────────┬────────────────────┘
//!                                                      │ spawn_blocking
//!                                                      ▼
//!                                               notify callback
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use tw_watcher::DirWatcher;
//!
//! # async fn example() -> Result<(), tw_watcher::WatchError> {
//! let watcher = DirWatcher::builder()
//!     .notify(|event| println!("{event}"))
//!     .exclude(["/srv/app/target"])
//!     .path("/srv/app")
//!     .build()
//!     .await?;
//!
//! watcher.add("/srv/shared", false).await?;
//! // ...
//! watcher.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug};

use tw_core::{ConfigError, WatchConfig};

use crate::agent::{
    AddOrigin, AddRequest, AgentContext, AgentState, Command, NotifyFn, WatchAgent, send_command,
};
use crate::backend::{NotifyBackend, WatchBackend};
use crate::error::WatchError;
use crate::events::Event;
use crate::exclude::ExclusionMatcher;
use crate::registry::WatchedPath;
use crate::spawn::spawn;
use crate::supervisor::supervise;
use crate::tree::TreeEnumerator;

/// A recursive, self-adjusting directory watcher.
///
/// Created through [`DirWatcher::builder`]. Every path added to the watcher
/// is registered with the backend one directory at a time; directories that
/// appear later under a recursive path are registered as they show up, and
/// deleted ones are forgotten.
///
/// Dropping the watcher stops it. Use [`DirWatcher::shutdown`] to also wait
/// for the agent to wind down.
pub struct DirWatcher {
    command_tx: mpsc::Sender<Command>,
    token: CancellationToken,
    state: watch::Receiver<AgentState>,
    task: Option<JoinHandle<usize>>,
}

impl std::fmt::Debug for DirWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirWatcher")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl DirWatcher {
    /// Returns a builder for a watcher backed by `notify`.
    #[must_use]
    pub fn builder() -> DirWatcherBuilder<NotifyBackend> {
        DirWatcherBuilder::new(NotifyBackend)
    }

    /// Brings `path` under watch.
    ///
    /// The path is resolved against the current directory and queued for the
    /// agent; this returns once the request is queued, not once it is
    /// registered. Adding a path that is already watched, excluded, or
    /// missing is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathResolve`] if a relative path cannot be
    /// resolved, and [`WatchError::Stopped`] once the watcher is stopped.
    pub async fn add(&self, path: impl AsRef<Utf8Path>, recursive: bool) -> Result<(), WatchError> {
        if self.token.is_cancelled() {
            return Err(WatchError::Stopped);
        }

        let path = path.as_ref();
        let resolved =
            tw_core::absolutize(path).map_err(|err| WatchError::path_resolve(path, err))?;

        let request = AddRequest::new(resolved, Some(recursive), AddOrigin::Caller);
        send_command(&self.command_tx, &self.token, Command::Add(request)).await
    }

    /// Returns the paths currently under watch, sorted by path.
    ///
    /// The reply is produced by the agent after every previously queued
    /// command, so it reflects all earlier [`add`](Self::add) calls (though
    /// not the subtree walks those calls started).
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Stopped`] once the watcher is stopped.
    pub async fn watched_paths(&self) -> Result<Vec<WatchedPath>, WatchError> {
        let (reply, rx) = oneshot::channel();
        send_command(&self.command_tx, &self.token, Command::Snapshot(reply)).await?;

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(WatchError::Stopped),
            paths = rx => paths.map_err(|_| WatchError::Stopped),
        }
    }

    /// Returns the current state of the watch agent.
    #[must_use]
    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    /// Returns a receiver notified on every agent state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<AgentState> {
        self.state.clone()
    }

    /// Stops the watcher. Later calls do nothing.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            debug!("Stopping directory watcher");
            self.token.cancel();
        }
    }

    /// Returns `true` once [`stop`](Self::stop) was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops the watcher and waits for the agent to finish.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::AgentPanicked`] if the agent task panicked.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        self.stop();

        if let Some(task) = self.task.take() {
            let restarts = task
                .await
                .map_err(|err| WatchError::AgentPanicked(err.to_string()))?;
            debug!(restarts, "Watch agent finished");
        }

        Ok(())
    }
}

impl Drop for DirWatcher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Builder for [`DirWatcher`].
///
/// Only the callback is required. Exclusion patterns passed to
/// [`exclude`](Self::exclude) are added to those of the configuration.
pub struct DirWatcherBuilder<B: WatchBackend = NotifyBackend> {
    backend: B,
    notify: Option<NotifyFn>,
    config: WatchConfig,
    exclude: Vec<String>,
    paths: Vec<Utf8PathBuf>,
    recursive: Option<bool>,
    logger: Option<Dispatch>,
}

impl<B: WatchBackend> std::fmt::Debug for DirWatcherBuilder<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirWatcherBuilder")
            .field("has_callback", &self.notify.is_some())
            .field("config", &self.config)
            .field("exclude", &self.exclude)
            .field("paths", &self.paths)
            .field("recursive", &self.recursive)
            .finish_non_exhaustive()
    }
}

impl<B: WatchBackend> DirWatcherBuilder<B> {
    /// Creates a builder over a custom backend.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            notify: None,
            config: WatchConfig::default(),
            exclude: Vec::new(),
            paths: Vec::new(),
            recursive: None,
            logger: None,
        }
    }

    /// Sets the callback receiving every event.
    ///
    /// The callback runs on tokio's blocking pool; a panic inside it is
    /// logged and does not affect later events.
    #[must_use]
    pub fn notify<F>(mut self, callback: F) -> Self
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.notify = Some(Arc::new(callback));
        self
    }

    /// Adds exclusion globs.
    #[must_use]
    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds an initial path.
    #[must_use]
    pub fn path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Adds initial paths.
    #[must_use]
    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Overrides whether the initial paths are watched recursively.
    ///
    /// Defaults to [`WatchConfig::recursive`].
    #[must_use]
    pub const fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = Some(recursive);
        self
    }

    /// Routes the watcher's diagnostics to `dispatch` instead of the
    /// global subscriber.
    #[must_use]
    pub fn logger(mut self, dispatch: Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }

    /// Starts the watcher.
    ///
    /// Returns once the initial paths are registered or the startup grace
    /// period has elapsed, whichever comes first. Registration continues in
    /// the background in the latter case.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Config`] if no callback was set or the
    /// configuration is invalid, and [`WatchError::PathResolve`] if an
    /// initial path cannot be resolved.
    pub async fn build(self) -> Result<DirWatcher, WatchError> {
        let Self {
            backend,
            notify,
            config,
            exclude,
            paths,
            recursive,
            logger,
        } = self;

        let notify = notify.ok_or(ConfigError::MissingCallback)?;
        config.validate()?;

        let roots = paths
            .iter()
            .map(|path| tw_core::absolutize(path).map_err(|err| WatchError::path_resolve(path, err)))
            .collect::<Result<Vec<_>, _>>()?;

        let matcher = Arc::new(ExclusionMatcher::new(
            config.exclude.iter().map(String::as_str).chain(exclude.iter().map(String::as_str)),
        ));
        let token = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (state_tx, state_rx) = watch::channel(AgentState::Starting);

        let mut agent = WatchAgent::new(
            backend,
            AgentContext {
                notify,
                matcher: Arc::clone(&matcher),
                default_recursive: config.recursive,
                token: token.clone(),
                command_tx: command_tx.clone(),
                command_rx,
                state: state_tx,
            },
        );

        let supervisor_token = token.clone();
        let backoff = config.restart_backoff();
        let supervisor = async move {
            let restarts = supervise(&mut agent, &supervisor_token, backoff).await;
            agent.finish();
            restarts
        };

        let seeding = seed(
            command_tx.clone(),
            token.clone(),
            matcher,
            roots,
            recursive.unwrap_or(config.recursive),
        );

        let (task, seeding) = match logger {
            Some(dispatch) => (
                tokio::spawn(supervisor.with_subscriber(dispatch.clone())),
                tokio::spawn(seeding.with_subscriber(dispatch)),
            ),
            None => (spawn(supervisor), spawn(seeding)),
        };

        if tokio::time::timeout(config.startup_grace(), seeding).await.is_err() {
            debug!("Startup grace elapsed before initial paths were registered");
        }

        Ok(DirWatcher {
            command_tx,
            token,
            state: state_rx,
            task: Some(task),
        })
    }
}

/// Queues the initial paths, then waits until the agent has served them.
async fn seed(
    tx: mpsc::Sender<Command>,
    token: CancellationToken,
    matcher: Arc<ExclusionMatcher>,
    roots: Vec<Utf8PathBuf>,
    recursive: bool,
) -> Result<(), WatchError> {
    for root in roots {
        if !recursive {
            let request = AddRequest::new(root, Some(false), AddOrigin::Caller);
            send_command(&tx, &token, Command::Add(request)).await?;
            continue;
        }

        let mut entries = TreeEnumerator::new(root)
            .with_exclusions(Arc::clone(&matcher))
            .spawn(token.clone());
        while let Some(dir) = entries.next().await {
            let request = AddRequest::new(dir, Some(true), AddOrigin::Enumerated);
            send_command(&tx, &token, Command::Add(request)).await?;
        }
    }

    // Commands are served in order, so the reply marks the end of seeding
    let (reply, rx) = oneshot::channel();
    send_command(&tx, &token, Command::Snapshot(reply)).await?;
    let watched = rx.await.map_err(|_| WatchError::Stopped)?;
    debug!(watched = watched.len(), "Initial paths registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Op;
    use crate::testing::RecordingBackend;
    use parking_lot::Mutex;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    type Recorded = Arc<Mutex<Vec<Event>>>;

    fn create_tree() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let canonical = temp_dir.path().canonicalize().expect("Failed to canonicalize");
        let root = Utf8PathBuf::from_path_buf(canonical).expect("temp path should be UTF-8");

        fs::create_dir_all(root.join("a/b")).expect("Failed to create dirs");
        fs::create_dir_all(root.join("c")).expect("Failed to create dirs");
        fs::write(root.join("a/file.txt"), "x").expect("Failed to write file");

        (temp_dir, root)
    }

    fn test_config() -> WatchConfig {
        WatchConfig {
            startup_grace_ms: 5_000,
            restart_backoff_ms: 10,
            ..WatchConfig::default()
        }
    }

    fn recording_builder(backend: &RecordingBackend) -> (DirWatcherBuilder<RecordingBackend>, Recorded) {
        let events: Recorded = Arc::default();
        let sink = Arc::clone(&events);
        let builder = DirWatcherBuilder::new(backend.clone())
            .config(test_config())
            .notify(move |event| sink.lock().push(event));
        (builder, events)
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..300 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn eventually_watched(
        watcher: &DirWatcher,
        check: impl Fn(&[Utf8PathBuf]) -> bool,
    ) -> bool {
        for _ in 0..300 {
            if check(&watched(watcher).await) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn watched(watcher: &DirWatcher) -> Vec<Utf8PathBuf> {
        watcher
            .watched_paths()
            .await
            .expect("watcher should be running")
            .into_iter()
            .map(|entry| entry.path)
            .collect()
    }

    fn saw(events: &Recorded, path: &Utf8Path) -> bool {
        events.lock().iter().any(|event| event.path == path)
    }

    #[tokio::test]
    async fn test_build_without_callback_fails() {
        let result = DirWatcherBuilder::new(RecordingBackend::new()).build().await;
        assert!(matches!(
            result,
            Err(WatchError::Config(ConfigError::MissingCallback))
        ));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let result = DirWatcherBuilder::new(RecordingBackend::new())
            .notify(|_| {})
            .config(WatchConfig {
                command_capacity: 0,
                ..WatchConfig::default()
            })
            .build()
            .await;
        assert!(matches!(
            result,
            Err(WatchError::Config(ConfigError::InvalidOption { .. }))
        ));
    }

    #[tokio::test]
    async fn test_initial_paths_registered_recursively() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        let (builder, _) = recording_builder(&backend);

        let watcher = builder.path(&root).build().await.expect("build");

        assert_eq!(watcher.state(), AgentState::Running);
        let paths = watcher.watched_paths().await.expect("snapshot");
        let mut expected = vec![root.clone(), root.join("a"), root.join("a/b"), root.join("c")];
        expected.sort();
        assert_eq!(paths.iter().map(|p| p.path.clone()).collect::<Vec<_>>(), expected);
        assert!(paths.iter().all(|p| p.recursive));
    }

    #[tokio::test]
    async fn test_non_recursive_initial_path() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        let (builder, _) = recording_builder(&backend);

        let watcher = builder.path(&root).recursive(false).build().await.expect("build");

        let paths = watcher.watched_paths().await.expect("snapshot");
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].path, root);
        assert!(!paths[0].recursive);
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        let (builder, _) = recording_builder(&backend);
        let watcher = builder.build().await.expect("build");

        let dir = root.join("c");
        watcher.add(&dir, false).await.expect("add");
        watcher.add(&dir, false).await.expect("add");
        watcher.add(root.join("c/../c"), false).await.expect("add");

        assert_eq!(watched(&watcher).await, vec![dir.clone()]);
        assert_eq!(backend.registrations_of(&dir), 1);
    }

    #[tokio::test]
    async fn test_recursive_add_registers_every_directory() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        let (builder, _) = recording_builder(&backend);
        let watcher = builder.build().await.expect("build");

        watcher.add(&root, true).await.expect("add");

        // root plus a, a/b and c
        assert!(eventually_watched(&watcher, |paths| paths.len() == 4).await);
        assert_eq!(backend.registered().len(), 4);
    }

    #[tokio::test]
    async fn test_non_recursive_add_registers_root_only() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        let (builder, _) = recording_builder(&backend);
        let watcher = builder.build().await.expect("build");

        watcher.add(&root, false).await.expect("add");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(watched(&watcher).await, vec![root]);
    }

    #[tokio::test]
    async fn test_missing_path_is_ignored() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        let (builder, _) = recording_builder(&backend);
        let watcher = builder.build().await.expect("build");

        watcher.add(root.join("missing"), true).await.expect("add");

        assert!(watched(&watcher).await.is_empty());
        assert_eq!(watcher.state(), AgentState::Running);
    }

    #[tokio::test]
    async fn test_excluded_paths_never_registered_nor_reported() {
        let (_guard, root) = create_tree();
        fs::create_dir_all(root.join("node_modules/pkg")).expect("Failed to create dirs");
        let backend = RecordingBackend::new();
        let (builder, events) = recording_builder(&backend);

        let excluded = root.join("node_modules");
        let watcher = builder
            .exclude([excluded.to_string()])
            .path(&root)
            .build()
            .await
            .expect("build");

        let paths = watched(&watcher).await;
        assert!(!paths.contains(&excluded));
        assert!(!paths.contains(&root.join("node_modules/pkg")));

        watcher.add(&excluded, true).await.expect("add");
        assert!(!watched(&watcher).await.contains(&excluded));
        assert_eq!(backend.registrations_of(&excluded), 0);

        backend.emit(Event::new(excluded.clone(), Op::Write)).await;
        backend.emit(Event::new(root.join("a/file.txt"), Op::Write)).await;

        assert!(eventually(|| saw(&events, &root.join("a/file.txt"))).await);
        assert!(!saw(&events, &excluded));
    }

    #[tokio::test]
    async fn test_created_directory_is_discovered() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        let (builder, events) = recording_builder(&backend);
        let watcher = builder.path(&root).build().await.expect("build");

        let created = root.join("c/new");
        fs::create_dir_all(created.join("deeper")).expect("Failed to create dirs");
        backend.emit(Event::new(created.clone(), Op::Create)).await;

        assert!(
            eventually_watched(&watcher, |paths| {
                paths.contains(&created) && paths.contains(&created.join("deeper"))
            })
            .await
        );
        assert!(saw(&events, &created));
    }

    #[tokio::test]
    async fn test_deleted_directory_is_forgotten() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        let (builder, events) = recording_builder(&backend);
        let watcher = builder.path(&root).build().await.expect("build");

        let removed = root.join("a");
        fs::remove_dir_all(&removed).expect("Failed to remove dir");
        backend.emit(Event::new(removed.clone(), Op::Remove)).await;

        assert!(
            eventually_watched(&watcher, |paths| {
                !paths.contains(&removed) && !paths.contains(&root.join("a/b"))
            })
            .await
        );
        assert!(backend.unregistered().contains(&removed));
        assert!(saw(&events, &removed));

        // A stale add for the deleted path is ignored
        watcher.add(&removed, true).await.expect("add");
        assert!(!watched(&watcher).await.contains(&removed));
    }

    #[tokio::test]
    async fn test_rejected_registration_leaves_path_unwatched() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        backend.reject(&root.join("c"));
        let (builder, _) = recording_builder(&backend);

        let watcher = builder.path(&root).build().await.expect("build");

        let paths = watched(&watcher).await;
        assert!(!paths.contains(&root.join("c")));
        assert!(paths.contains(&root.join("a/b")));
        assert_eq!(watcher.state(), AgentState::Running);
    }

    #[tokio::test]
    async fn test_rejected_root_still_walks_subdirectories() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        backend.reject(&root);
        let (builder, _) = recording_builder(&backend);
        let watcher = builder.build().await.expect("build");

        watcher.add(&root, true).await.expect("add");

        let mut expected = vec![root.join("a"), root.join("a/b"), root.join("c")];
        expected.sort();
        assert!(eventually_watched(&watcher, |paths| paths == expected.as_slice()).await);
        assert_eq!(backend.registrations_of(&root), 0);
    }

    #[tokio::test]
    async fn test_backend_crash_restores_watches() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        let (builder, _) = recording_builder(&backend);
        let watcher = builder.path(&root).build().await.expect("build");
        let before = watched(&watcher).await;

        backend.crash();

        assert!(eventually(|| backend.opens() == 2 && watcher.state() == AgentState::Running).await);
        assert!(eventually_watched(&watcher, |paths| paths == before.as_slice()).await);
        assert_eq!(backend.registrations_of(&root), 2);
    }

    #[tokio::test]
    async fn test_failed_open_is_retried() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        backend.fail_opens(2);
        let (builder, _) = recording_builder(&backend);

        let watcher = builder.path(&root).build().await.expect("build");

        assert_eq!(backend.opens(), 3);
        assert_eq!(watcher.state(), AgentState::Running);
        assert_eq!(watched(&watcher).await.len(), 4);
    }

    #[tokio::test]
    async fn test_add_after_stop() {
        let backend = RecordingBackend::new();
        let (builder, _) = recording_builder(&backend);
        let watcher = builder.build().await.expect("build");
        let mut state = watcher.subscribe_state();

        watcher.stop();
        watcher.stop();

        assert!(watcher.is_stopped());
        assert!(matches!(watcher.add("/tmp", true).await, Err(WatchError::Stopped)));
        assert!(matches!(watcher.watched_paths().await, Err(WatchError::Stopped)));

        state
            .wait_for(|state| *state == AgentState::Stopped)
            .await
            .expect("state channel open");
        watcher.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_events() {
        let (_guard, root) = create_tree();
        let backend = RecordingBackend::new();
        let events: Recorded = Arc::default();
        let sink = Arc::clone(&events);

        let watcher = DirWatcherBuilder::new(backend.clone())
            .config(test_config())
            .notify(move |event| {
                assert!(!event.path.as_str().ends_with("boom"), "callback failure");
                sink.lock().push(event);
            })
            .path(&root)
            .build()
            .await
            .expect("build");

        backend.emit(Event::new(root.join("boom"), Op::Write)).await;
        backend.emit(Event::new(root.join("a/file.txt"), Op::Write)).await;

        assert!(eventually(|| saw(&events, &root.join("a/file.txt"))).await);
        assert_eq!(watcher.state(), AgentState::Running);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_agent() {
        let backend = RecordingBackend::new();
        let (builder, _) = recording_builder(&backend);
        let watcher = builder.build().await.expect("build");

        let state = watcher.subscribe_state();
        watcher.shutdown().await.expect("shutdown");
        assert_eq!(*state.borrow(), AgentState::Stopped);
    }

    // The scenarios below run against the real notify backend.

    fn notify_builder() -> (DirWatcherBuilder<NotifyBackend>, Recorded) {
        let events: Recorded = Arc::default();
        let sink = Arc::clone(&events);
        let builder = DirWatcher::builder()
            .config(test_config())
            .notify(move |event| sink.lock().push(event));
        (builder, events)
    }

    #[tokio::test]
    async fn test_notify_reports_new_directory_and_its_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let canonical = temp_dir.path().canonicalize().expect("Failed to canonicalize");
        let root = Utf8PathBuf::from_path_buf(canonical).expect("temp path should be UTF-8");
        let (builder, events) = notify_builder();
        let watcher = builder.path(&root).build().await.expect("build");

        let dir = root.join("a");
        fs::create_dir(&dir).expect("Failed to create dir");
        assert!(eventually(|| saw(&events, &dir)).await);
        assert!(events.lock().iter().any(|e| e.path == dir && e.op == Op::Create));
        assert!(eventually_watched(&watcher, |paths| paths.contains(&dir)).await);

        let file = dir.join("b.txt");
        fs::write(&file, "hello").expect("Failed to write file");
        assert!(eventually(|| saw(&events, &file)).await);

        watcher.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_notify_respects_exclusions() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let canonical = temp_dir.path().canonicalize().expect("Failed to canonicalize");
        let root = Utf8PathBuf::from_path_buf(canonical).expect("temp path should be UTF-8");
        fs::create_dir(root.join("node_modules")).expect("Failed to create dir");
        fs::create_dir(root.join("lib")).expect("Failed to create dir");

        let (builder, events) = notify_builder();
        let watcher = builder
            .exclude([root.join("node_modules").to_string()])
            .path(&root)
            .build()
            .await
            .expect("build");

        let hidden = root.join("node_modules/x.txt");
        let visible = root.join("lib/x.txt");
        fs::write(&hidden, "x").expect("Failed to write file");
        fs::write(&visible, "x").expect("Failed to write file");

        assert!(eventually(|| saw(&events, &visible)).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!saw(&events, &hidden));

        watcher.shutdown().await.expect("shutdown");
    }
}
