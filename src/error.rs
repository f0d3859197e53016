//! Error types shared across the pipeline core.
//!
//! Defines error types for the pieces that cross module boundaries:
//! - Step unit resolution and invocation
//! - Single-flight lock handling
//! - Run report persistence
//!
//! Configuration, database and scheduler errors live next to their modules.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by an executable step unit.
#[derive(Debug, Error)]
pub enum UnitError {
    /// The unit could not be located. This is a configuration problem and is
    /// never retried.
    #[error("Script not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The unit is misconfigured in some other way that retrying cannot fix.
    #[error("Invalid unit: {0}")]
    Invalid(String),

    /// The unit could not be launched or awaited.
    #[error("Failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UnitError {
    /// Whether the failure is a resolution/configuration error that must not
    /// be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, UnitError::NotFound(_) | UnitError::Invalid(_))
    }
}

/// Errors that can occur while handling the single-flight lock marker.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to create lock file '{}': {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove lock file '{}': {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while assembling a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Step names key the run report, so each must be unique.
    #[error("Duplicate step name '{0}'")]
    DuplicateStep(String),
}

/// Errors that can occur while reading or writing a JSON report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
