//! Lazy directory tree enumeration.
//!
//! The backend only watches one directory level, so recursive watching is
//! built by enumerating every directory under a root and registering each
//! one. [`TreeEnumerator`] walks a tree on the blocking pool and hands
//! directories over one at a time through [`TreeEntries`].
//!
//! # Backpressure
//!
//! ```text
//! ┌──────────────────────────┐  capacity 1   ┌──────────────────────┐
//! │ spawn_blocking: walker   │ ────────────► │ TreeEntries::next()  │
//! │ (ignore::Walk)           │ blocking_send │ (races cancellation) │
//! └──────────────────────────┘               └──────────────────────┘
//! ```
//!
//! The walker suspends after each directory until the consumer takes it.
//! It stops early when the consumer is dropped or the token is cancelled.

use std::ops::ControlFlow;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::exclude::ExclusionMatcher;
use crate::spawn::spawn_blocking;

/// Whether the root itself is part of the enumerated sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TreeMode {
    /// Yield the root and every directory beneath it.
    #[default]
    IncludeRoot,
    /// Yield only the directories beneath the root.
    ExcludeRoot,
}

/// Enumerates the directories of a tree.
///
/// If the root is not a directory the sequence is exactly the root itself,
/// whatever the mode. Order is unspecified. Walk errors are logged and the
/// walk carries on with the remaining entries.
///
/// # Examples
///
/// ```no_run
/// use tokio_util::sync::CancellationToken;
/// use tw_watcher::{TreeEnumerator, TreeMode};
///
/// # async fn example() {
/// let mut entries = TreeEnumerator::new("/srv/data")
///     .with_mode(TreeMode::ExcludeRoot)
///     .spawn(CancellationToken::new());
///
/// while let Some(dir) = entries.next().await {
///     println!("{dir}");
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TreeEnumerator {
    root: Utf8PathBuf,
    mode: TreeMode,
    follow_links: bool,
    exclusions: Option<Arc<ExclusionMatcher>>,
}

impl TreeEnumerator {
    /// Creates an enumerator for `root` in [`TreeMode::IncludeRoot`].
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            mode: TreeMode::default(),
            follow_links: false,
            exclusions: None,
        }
    }

    /// Sets the enumeration mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: TreeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Configures whether symbolic links to directories are followed.
    ///
    /// By default, symbolic links are not followed.
    #[must_use]
    pub const fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Prunes excluded directories together with everything beneath them.
    #[must_use]
    pub fn with_exclusions(mut self, matcher: Arc<ExclusionMatcher>) -> Self {
        self.exclusions = Some(matcher);
        self
    }

    /// Returns the root being enumerated.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Starts the walk on the blocking pool.
    ///
    /// The returned [`TreeEntries`] yields `None` once the walk is finished
    /// or `token` is cancelled.
    pub fn spawn(self, token: CancellationToken) -> TreeEntries {
        let (tx, rx) = mpsc::channel(1);
        let walk_token = token.clone();

        spawn_blocking(move || {
            self.walk(|dir| {
                if walk_token.is_cancelled() || tx.blocking_send(dir).is_err() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            });
        });

        TreeEntries { rx, token }
    }

    /// Walks the tree synchronously, passing each directory to `visit`.
    ///
    /// The walk stops as soon as `visit` breaks.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(Utf8PathBuf) -> ControlFlow<()>,
    {
        let metadata = match std::fs::metadata(&self.root) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(path = %self.root, error = %err, "Cannot enumerate tree root");
                return;
            }
        };

        if !metadata.is_dir() {
            let _ = visit(self.root.clone());
            return;
        }

        for result in self.build_walker() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(root = %self.root, error = %err, "Error while walking tree");
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_dir()) {
                continue;
            }
            if entry.depth() == 0 && self.mode == TreeMode::ExcludeRoot {
                continue;
            }

            let dir = match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(dir) => dir,
                Err(invalid) => {
                    warn!(path = %invalid.display(), "Skipping non-UTF-8 directory");
                    continue;
                }
            };

            trace!(path = %dir, "Enumerated directory");
            if visit(dir).is_break() {
                return;
            }
        }
    }

    fn build_walker(&self) -> ignore::Walk {
        let mut builder = WalkBuilder::new(&self.root);
        // Every directory counts, hidden or ignored alike
        builder
            .standard_filters(false)
            .follow_links(self.follow_links);

        if let Some(matcher) = &self.exclusions {
            let matcher = Arc::clone(matcher);
            builder.filter_entry(move |entry| {
                Utf8Path::from_path(entry.path()).is_none_or(|path| !matcher.is_excluded(path))
            });
        }

        builder.build()
    }
}

/// Directories produced by a running [`TreeEnumerator`].
#[derive(Debug)]
pub struct TreeEntries {
    rx: mpsc::Receiver<Utf8PathBuf>,
    token: CancellationToken,
}

impl TreeEntries {
    /// Waits for the next directory.
    ///
    /// Returns `None` when the walk is over or the token is cancelled.
    pub async fn next(&mut self) -> Option<Utf8PathBuf> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => None,
            dir = self.rx.recv() => dir,
        }
    }
}
