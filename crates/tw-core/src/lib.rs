//! Core configuration, errors, and path utilities for treewatch.
//!
//! This crate provides the foundational pieces shared across the workspace:
//!
//! - [`WatchConfig`] and [`Config`] for watcher tuning, loadable from JSON
//! - [`ConfigError`] for construction-time failures
//! - [`absolutize`] for turning caller-supplied paths into the absolute,
//!   normalized form the watcher uses as registry keys

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod path;

pub use config::{Config, WatchConfig};
pub use error::ConfigError;
pub use path::absolutize;
