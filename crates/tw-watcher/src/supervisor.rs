//! Restart-on-failure supervision.
//!
//! [`supervise`] runs a [`Supervised`] task until it finishes cleanly or its
//! cancellation token fires. A task that returns an error is restarted after
//! a fixed backoff. Its own state survives between runs, so a task decides
//! for itself what a restart means.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::WatchError;

/// A long-running task that can be restarted.
pub trait Supervised: Send {
    /// Runs one incarnation of the task.
    ///
    /// `Ok` ends supervision; an error schedules a restart.
    fn run(&mut self) -> impl Future<Output = Result<(), WatchError>> + Send;
}

/// Runs `task` until it returns `Ok` or `token` is cancelled, restarting it
/// after `backoff` whenever it fails.
///
/// Cancellation interrupts the backoff sleep. Returns the number of restarts.
pub async fn supervise<T: Supervised>(
    task: &mut T,
    token: &CancellationToken,
    backoff: Duration,
) -> usize {
    let mut restarts = 0;

    loop {
        let result = task.run().await;
        if token.is_cancelled() {
            break;
        }
        let Err(err) = result else {
            break;
        };
        warn!(error = %err, "Supervised task failed, restarting");

        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = tokio::time::sleep(backoff) => {}
        }

        restarts += 1;
        info!(restarts, "Restarting supervised task");
    }

    restarts
}
