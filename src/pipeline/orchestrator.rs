//! Pipeline orchestrator.
//!
//! Runs the fixed, ordered step list through the [`StepRunner`], halts at the
//! first failed step and persists a [`RunReport`] after every run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::logging::ERROR_TARGET;
use crate::runner::executor::round_secs;
use crate::runner::{RetryPolicy, ScriptUnit, Step, StepRunner};

use super::report::{RunReport, RunStatus, StepResults};

/// Coordinates one sequential run of all steps.
pub struct PipelineOrchestrator {
    steps: Vec<Step>,
    runner: StepRunner,
    report_path: PathBuf,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over an explicit step list.
    ///
    /// # Arguments
    ///
    /// * `steps` - Steps in dependency order
    /// * `runner` - Step runner carrying the retry policy
    /// * `report_path` - Where the run report is written after every run
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::DuplicateStep` if two steps share a name.
    pub fn new(
        steps: Vec<Step>,
        runner: StepRunner,
        report_path: impl Into<PathBuf>,
    ) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        if let Some(dup) = steps.iter().find(|s| !seen.insert(s.name.as_str())) {
            return Err(PipelineError::DuplicateStep(dup.name.clone()));
        }

        Ok(Self {
            steps,
            runner,
            report_path: report_path.into(),
        })
    }

    /// Builds the script-backed step list, retry policy and report path from
    /// the configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let base_dir = config.paths.base_dir.clone();
        let steps = config
            .pipeline
            .steps
            .iter()
            .map(|def| {
                let unit = ScriptUnit::new(&config.pipeline.interpreter, config.resolve(&def.script))
                    .with_working_dir(base_dir.clone());
                Step::new(def.name.clone(), unit)
            })
            .collect();

        let runner = StepRunner::new(RetryPolicy::new(
            config.pipeline.max_retries,
            config.backoff(),
        ));

        Self::new(steps, runner, config.run_report_path())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// Runs every step in order, stopping at the first failure.
    ///
    /// Never fails: step failures become report data. If the report cannot be
    /// persisted the returned report carries a warning describing why.
    pub async fn run(&self) -> RunReport {
        let start_time = Utc::now();
        let started = Instant::now();
        let execution_id = RunReport::execution_id_for(start_time);

        info!("========== PIPELINE STARTED ========== ({})", execution_id);

        let mut steps = StepResults::new();
        let mut errors = Vec::new();

        for step in &self.steps {
            let result = self.runner.execute(step).await;
            let succeeded = result.is_success();
            steps.push(step.name.clone(), result);

            if !succeeded {
                error!(
                    target: ERROR_TARGET,
                    "Step {} failed, halting pipeline {}", step.name, execution_id
                );
                errors.push(format!("{} failed", step.name));
                break;
            }
        }

        let end_time = Utc::now();
        let status = if errors.is_empty() && steps.all_succeeded() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };

        let mut report = RunReport {
            execution_id,
            start_time,
            end_time,
            total_duration_seconds: round_secs(started.elapsed()),
            status,
            steps,
            errors,
            warnings: Vec::new(),
        };

        match report.persist(&self.report_path) {
            Ok(()) => info!("Execution report written to: {}", self.report_path.display()),
            Err(e) => {
                error!(
                    target: ERROR_TARGET,
                    "Failed to write execution report to {}: {}",
                    self.report_path.display(),
                    e
                );
                report.warnings.push(format!(
                    "Failed to persist run report to {}: {}",
                    self.report_path.display(),
                    e
                ));
            }
        }

        info!("========== PIPELINE FINISHED ==========");
        info!("Final Status: {}", report.status);

        report
    }
}
