//! Steps and step results.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::unit::Runnable;

/// One named unit of pipeline work.
#[derive(Clone)]
pub struct Step {
    /// Step name, used as key in the run report.
    pub name: String,
    /// The executable unit behind the step.
    pub unit: Arc<dyn Runnable>,
}

impl Step {
    /// Creates a new step.
    pub fn new(name: impl Into<String>, unit: impl Runnable + 'static) -> Self {
        Self {
            name: name.into(),
            unit: Arc::new(unit),
        }
    }

    /// Creates a step from a shared unit.
    pub fn from_shared(name: impl Into<String>, unit: Arc<dyn Runnable>) -> Self {
        Self {
            name: name.into(),
            unit,
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("unit", &self.unit.describe())
            .finish()
    }
}

/// Terminal status of a step or a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one step's attempt sequence. Never mutated after the step concludes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    /// Wall-clock time across all attempts and backoff sleeps, in seconds.
    pub duration_seconds: f64,
    /// Attempts made before the final one (equals the retry bound on exhaustion).
    pub retry_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StepResult {
    /// Creates a successful step result.
    pub fn success(duration_seconds: f64, retry_attempts: u32) -> Self {
        Self {
            status: StepStatus::Success,
            duration_seconds,
            retry_attempts,
            error_message: None,
        }
    }

    /// Creates a failed step result.
    pub fn failed(duration_seconds: f64, retry_attempts: u32, error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            duration_seconds,
            retry_attempts,
            error_message: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}
