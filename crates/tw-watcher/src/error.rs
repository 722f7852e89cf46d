//! Error types for the tw-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while building, running, or talking to a directory watcher.

use camino::Utf8PathBuf;
use tw_core::ConfigError;

/// Errors that can occur during directory watching.
///
/// # Error Recovery Strategy
///
/// - **Configuration** ([`WatchError::Config`]): Fatal at construction
/// - **Notify errors** ([`WatchError::Notify`]): Fatal when opening the backend,
///   logged when delivered alongside events
/// - **Backend closed** ([`WatchError::BackendClosed`]): Fatal for the current
///   agent incarnation, which is restarted by the supervisor
/// - **Registration** ([`WatchError::Register`]): Recoverable - the path stays unwatched
/// - **Path resolution** ([`WatchError::PathResolve`]): Recoverable - the path is skipped
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Recoverable - skip and continue
/// - **Stopped** ([`WatchError::Stopped`]): Terminal - the watcher was stopped by its owner
///
/// # Examples
///
/// ```
/// use tw_watcher::WatchError;
///
/// fn report(err: &WatchError) {
///     if err.is_fatal() {
///         eprintln!("watcher failed: {err}");
///     } else {
///         eprintln!("warning: {err}");
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Invalid watcher configuration.
    #[error("invalid watcher configuration: {0}")]
    Config(#[from] ConfigError),

    /// The notify backend failed to initialize or reported an error.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The backend refused to watch a path.
    #[error("failed to watch {path}: {reason}")]
    Register {
        /// The path that could not be watched.
        path: Utf8PathBuf,
        /// Backend-provided explanation.
        reason: String,
    },

    /// A caller-supplied path could not be turned into an absolute path.
    #[error("failed to resolve path {path}: {source}")]
    PathResolve {
        /// The path as supplied by the caller.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backend stopped delivering messages.
    #[error("watch backend closed unexpectedly")]
    BackendClosed,

    /// The watcher has been stopped.
    #[error("watcher has been stopped")]
    Stopped,

    /// The supervisor task panicked.
    #[error("watch agent task failed: {0}")]
    AgentPanicked(String),

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::Register`] error.
    #[inline]
    pub fn register(path: impl Into<Utf8PathBuf>, reason: impl Into<String>) -> Self {
        Self::Register {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new [`WatchError::PathResolve`] error.
    #[inline]
    pub fn path_resolve(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::PathResolve {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if watching can continue after this error.
    ///
    /// Recoverable errors affect a single path; everything else already
    /// watched keeps being watched.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Register { .. } | Self::PathResolve { .. } | Self::NonUtf8Path(_) | Self::Io(_)
        )
    }

    /// Returns `true` if this error is fatal for the component reporting it.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Register { path, .. } | Self::PathResolve { path, .. } => Some(path),
            Self::Config(_)
            | Self::Notify(_)
            | Self::BackendClosed
            | Self::Stopped
            | Self::AgentPanicked(_)
            | Self::NonUtf8Path(_)
            | Self::Io(_) => None,
        }
    }
}
