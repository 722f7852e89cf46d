//! CLI entry point for treewatch.
//!
//! Watches directory trees and prints every change as it happens.
//!
//! # Usage
//!
//! ```bash
//! treewatch [OPTIONS] <COMMAND>
//!
//! # Watch two trees, skipping build output
//! treewatch watch ./src ./assets -e '/srv/*/target'
//!
//! # Emit events as JSON lines
//! treewatch watch ./src --json
//!
//! # List the directories a recursive watch would cover
//! treewatch tree ./src
//!
//! # Show the effective configuration
//! treewatch --config treewatch.json config
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::ops::ControlFlow;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use tw_core::{Config, WatchConfig};
use tw_watcher::{DirWatcher, Event, ExclusionMatcher, TreeEnumerator};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Recursive directory watcher.
///
/// Watches the given paths and every directory beneath them, including
/// directories created while watching.
#[derive(Parser)]
#[command(name = "treewatch", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file.
    #[arg(short, long, global = true, env = "TREEWATCH_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Glob pattern for paths to skip (repeatable).
    ///
    /// Matched against absolute paths; `*` does not cross `/`.
    #[arg(short, long = "exclude", global = true, value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Watch paths and print each change until interrupted.
    Watch {
        /// Paths to watch.
        #[arg(required = true)]
        paths: Vec<Utf8PathBuf>,

        /// Watch only the given paths, not their subdirectories.
        #[arg(long)]
        no_recursive: bool,

        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// List the directories a recursive watch of the paths would cover.
    Tree {
        /// Roots to enumerate.
        #[arg(required = true)]
        paths: Vec<Utf8PathBuf>,
    },

    /// Print the effective configuration as JSON.
    Config,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `warn` level by default so the
/// event stream on stdout stays readable. Logs go to stderr.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "warn" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Loads the configuration file, if any, and applies CLI overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid.
fn build_config(cli: &Cli) -> color_eyre::Result<WatchConfig> {
    let mut config = match &cli.config {
        Some(path) => Config::from_path(path)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to load config {}: {}", path, e))?,
        None => Config::default(),
    };

    config.watch.exclude.extend(cli.exclude.iter().cloned());
    Ok(config.watch)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Watches `paths` until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the watcher cannot be started.
async fn run_watch(
    mut config: WatchConfig,
    paths: Vec<Utf8PathBuf>,
    no_recursive: bool,
    json: bool,
) -> color_eyre::Result<()> {
    if no_recursive {
        config.recursive = false;
    }
    info!(paths = paths.len(), recursive = config.recursive, "Starting watcher");

    let watcher = DirWatcher::builder()
        .config(config)
        .paths(paths)
        .notify(move |event| print_event(&event, json))
        .build()
        .await?;

    wait_for_signal().await?;
    info!("Shutting down");
    watcher.shutdown().await?;

    Ok(())
}

/// Prints every directory under `paths` that would be watched.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
fn run_tree(config: &WatchConfig, paths: Vec<Utf8PathBuf>) -> color_eyre::Result<()> {
    let matcher = Arc::new(ExclusionMatcher::new(&config.exclude));
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let mut result = Ok(());

    for path in paths {
        let root = tw_core::absolutize(&path)?;
        TreeEnumerator::new(root)
            .with_exclusions(Arc::clone(&matcher))
            .walk(|dir| match writeln!(handle, "{dir}") {
                Ok(()) => ControlFlow::Continue(()),
                Err(err) => {
                    result = Err(err);
                    ControlFlow::Break(())
                }
            });
        result?;
        result = Ok(());
    }

    Ok(())
}

/// Prints the effective configuration.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
fn run_config(config: WatchConfig) -> color_eyre::Result<()> {
    let content = serde_json::to_string_pretty(&Config { watch: config })
        .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize JSON: {}", e))?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{content}")?;
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Prints one event line; `OP path` or a JSON object.
fn print_event(event: &Event, json: bool) {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();

    if json {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(handle, "{line}");
        }
    } else {
        let _ = writeln!(handle, "{event}");
    }
}

/// Waits for Ctrl-C, or SIGTERM on Unix.
async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                Ok(())
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Load configuration
    let config = build_config(&cli)?;

    // 5. Route to appropriate command
    match cli.command {
        Commands::Watch {
            paths,
            no_recursive,
            json,
        } => run_watch(config, paths, no_recursive, json).await,
        Commands::Tree { paths } => run_tree(&config, paths),
        Commands::Config => run_config(config),
    }
}
