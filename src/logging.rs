//! Tracing setup.
//!
//! Events go to stdout and, when a log directory is given, to an activity
//! log (every event passing the filter) and an error log (ERROR only).
//! Step failures are emitted under the [`ERROR_TARGET`] target so they can be
//! told apart from ordinary errors in both files.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Tracing target for step failures and other operator-facing errors.
pub const ERROR_TARGET: &str = "pipeline_errors";

/// Activity log file name inside the log directory.
pub const ACTIVITY_LOG_FILE: &str = "pipeline_activity.log";

/// Error log file name inside the log directory.
pub const ERROR_LOG_FILE: &str = "pipeline_errors.log";

/// Initializes the global subscriber.
///
/// Priority for the filter: `RUST_LOG` env var > `log_level` argument.
/// Console output goes to stderr so stdout carries only command output.
pub fn init(log_level: &str, log_dir: Option<&Path>) -> anyhow::Result<()> {
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    let filter = build_filter(&log_filter)?;

    let (activity_file, error_file) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            (
                Some(open_append(&dir.join(ACTIVITY_LOG_FILE))?),
                Some(open_append(&dir.join(ERROR_LOG_FILE))?),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(activity_file.map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file))
        }))
        .with(error_file.map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .with_filter(LevelFilter::ERROR)
        }))
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}

fn open_append(path: &Path) -> anyhow::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Builds the event filter from a directive string.
///
/// Step failures under [`ERROR_TARGET`] stay enabled whatever the directives
/// narrow the rest of the output to.
pub fn build_filter(directives: &str) -> anyhow::Result<EnvFilter> {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    let errors = format!("{}=error", ERROR_TARGET)
        .parse::<Directive>()
        .context("Invalid error target directive")?;
    Ok(filter.add_directive(errors))
}
