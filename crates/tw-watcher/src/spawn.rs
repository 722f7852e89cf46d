//! Task spawning that keeps the caller's tracing dispatcher.
//!
//! A watcher may be given its own `tracing::Dispatch` as log sink. Tokio
//! tasks and blocking closures do not inherit the thread-local default
//! dispatcher, so everything the watcher spawns goes through these helpers.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Dispatch;
use tracing::instrument::WithSubscriber;

/// Spawns `future` on the runtime under the current dispatcher.
pub(crate) fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future.with_current_subscriber())
}

/// Runs `f` on the blocking pool under the current dispatcher.
pub(crate) fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
    tokio::task::spawn_blocking(move || tracing::dispatcher::with_default(&dispatch, f))
}
