//! Step execution.
//!
//! # Architecture
//!
//! ```text
//! Step (name + Runnable) → StepRunner → attempt 1..=N → StepResult
//!                                  ↑ backoff sleep ↓
//! ```
//!
//! The runner:
//! 1. Resolves the unit once; an unresolvable unit fails without retries
//! 2. Invokes the unit, capturing exit status, stdout and stderr
//! 3. Sleeps for the backoff delay and retries on a non-zero exit
//! 4. Records duration, retry count and the last error text
//!
//! # Example
//!
//! ```ignore
//! use ecom_pipeline::runner::{RetryPolicy, ScriptUnit, Step, StepRunner};
//!
//! let step = Step::new("data_ingestion", ScriptUnit::new("python3", "scripts/ingest.py"));
//! let result = StepRunner::new(RetryPolicy::default()).execute(&step).await;
//! println!("{} after {} retries", result.status, result.retry_attempts);
//! ```

pub mod executor;
pub mod step;
pub mod unit;

pub use executor::{RetryPolicy, StepRunner, DEFAULT_BACKOFF_SECONDS, DEFAULT_MAX_RETRIES};
pub use step::{Step, StepResult, StepStatus};
pub use unit::{FnUnit, Runnable, ScriptUnit, UnitOutput};
