//! Recursive, self-adjusting directory watching.
//!
//! This crate watches a set of root paths together with every present and
//! future directory beneath them. Operating-system watches are registered
//! one directory at a time, so new directories are brought under watch as
//! they appear and deleted ones are forgotten.
//!
//! # Overview
//!
//! - [`DirWatcher`] - the public controller: add paths, stop, inspect state
//! - [`ExclusionMatcher`] - glob patterns for paths never watched nor reported
//! - [`TreeEnumerator`] - lazy directory walk used to seed recursive watches
//! - [`PathRegistry`] - the set of watched paths, owned by the agent
//! - [`supervise`] - restart-on-failure wrapper around the watch agent
//! - [`WatchBackend`] - the single-path watch primitive (`notify` by default)
//!
//! # Architecture
//!
//! ```text
//!  callers            tree walkers        discovered dirs
//!     │                    │                    │
//!     └────────────► command channel ◄──────────┘
//!                          │
//!                          ▼
//!  ┌─────────────────────────────────────────────────┐
//!  │ supervise ─► WatchAgent (single owner)          │
//!  │                ├─ PathRegistry                  │
//!  │                ├─ ExclusionMatcher              │
//!  │                └─ BackendHandle ◄── notify      │
//!  └───────────────────────┬─────────────────────────┘
//!                          │ spawn_blocking
//!                          ▼
//!                  callback(Event)
//! ```
//!
//! All registry mutations go through the agent's command channel, so the
//! agent never runs two operations at once and the registry needs no lock.
//! A fatal backend error restarts the agent after a backoff; the paths it
//! was watching are registered again by the next incarnation.
//!
//! # Crate Dependencies
//!
//! ```text
//! tw-cli ──► tw-watcher ──► tw-core
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use tw_watcher::DirWatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let watcher = DirWatcher::builder()
//!         .notify(|event| println!("{} {}", event.op, event.path))
//!         .exclude(["/srv/app/node_modules"])
//!         .path("/srv/app")
//!         .build()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     watcher.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod agent;
pub mod backend;
pub mod error;
pub mod events;
pub mod exclude;
pub mod registry;
mod spawn;
pub mod supervisor;
pub mod tree;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use agent::{AddOrigin, AddRequest, AgentState, NotifyFn};
pub use backend::{
    BackendHandle, BackendMessage, BackendSink, NotifyBackend, NotifyHandle, WatchBackend,
};
pub use error::WatchError;
pub use events::{Event, Op};
pub use exclude::ExclusionMatcher;
pub use registry::{PathRegistry, WatchedPath};
pub use supervisor::{Supervised, supervise};
pub use tree::{TreeEntries, TreeEnumerator, TreeMode};
pub use watcher::{DirWatcher, DirWatcherBuilder};
