//! Step runner with bounded retries and fixed backoff.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::logging::ERROR_TARGET;

use super::step::{Step, StepResult};

/// Default maximum number of attempts per step.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default sleep sequence between attempts.
pub const DEFAULT_BACKOFF_SECONDS: [u64; 3] = [1, 2, 4];

/// Retry bound and backoff sequence for a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least 1).
    pub max_retries: u32,
    /// Sleep after attempt `k` is `backoff[k - 1]`; the last entry repeats
    /// when the sequence is shorter than the bound.
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            DEFAULT_BACKOFF_SECONDS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        )
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff,
        }
    }

    /// Sleep duration after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Executes steps synchronously from the caller's point of view: the returned
/// future resolves only after the step succeeded or exhausted its attempts.
#[derive(Debug, Clone, Default)]
pub struct StepRunner {
    policy: RetryPolicy,
}

impl StepRunner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs one step with retries.
    ///
    /// An unresolvable unit fails immediately with zero retries. A non-zero
    /// exit is retried until the bound, after which the last captured error
    /// output becomes the step's error message.
    pub async fn execute(&self, step: &Step) -> StepResult {
        let start = Instant::now();

        if let Err(e) = step.unit.resolve() {
            error!(target: ERROR_TARGET, "Step {} cannot be resolved: {}", step.name, e);
            return StepResult::failed(0.0, 0, e.to_string());
        }

        let max = self.policy.max_retries;
        let mut last_error = String::new();

        for attempt in 1..=max {
            info!("Starting step: {} (attempt {})", step.name, attempt);

            match step.unit.invoke().await {
                Ok(output) if output.is_success() => {
                    let stdout = output.stdout.trim();
                    if !stdout.is_empty() {
                        info!("{}", stdout);
                    }

                    let duration = round_secs(start.elapsed());
                    info!("Completed step: {} in {}s", step.name, duration);
                    return StepResult::success(duration, attempt - 1);
                }
                Ok(output) => {
                    let stderr = output.stderr.trim();
                    last_error = if stderr.is_empty() {
                        format!("exited with status {}", output.exit_code)
                    } else {
                        stderr.to_string()
                    };
                    error!(
                        target: ERROR_TARGET,
                        "Error in step: {} (attempt {}, exit code {})\n{}",
                        step.name,
                        attempt,
                        output.exit_code,
                        output.stderr
                    );
                }
                Err(e) if e.is_fatal() => {
                    error!(target: ERROR_TARGET, "Step {} cannot run: {}", step.name, e);
                    return StepResult::failed(round_secs(start.elapsed()), attempt - 1, e.to_string());
                }
                Err(e) => {
                    last_error = e.to_string();
                    error!(
                        target: ERROR_TARGET,
                        "Error in step: {} (attempt {})\n{}", step.name, attempt, e
                    );
                }
            }

            if attempt < max {
                let delay = self.policy.delay_after(attempt);
                warn!("Retrying {} after {:?}", step.name, delay);
                tokio::time::sleep(delay).await;
            }
        }

        StepResult::failed(round_secs(start.elapsed()), max, last_error)
    }
}

/// Rounds a duration to seconds with two decimals.
pub(crate) fn round_secs(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 100.0).round() / 100.0
}
