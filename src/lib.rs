//! ecom_pipeline: orchestration core of an e-commerce ETL pipeline.
//!
//! This library runs the ETL steps in order with bounded retries, guards
//! runs with a cross-process single-flight lock, schedules a daily run and
//! derives pipeline health from the run report and live database signals.

// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod logging;
pub mod monitoring;
pub mod pipeline;
pub mod runner;
pub mod scheduler;
pub mod storage;

// Re-export commonly used types
pub use config::{ConfigError, PipelineConfig};
pub use error::{LockError, PipelineError, ReportError, UnitError};
pub use lock::{LockGuard, SingleFlightLock};
pub use monitoring::{MonitoringEvaluator, MonitoringReport, PipelineHealth};
pub use pipeline::{PipelineOrchestrator, RunReport, RunStatus};
pub use runner::{Runnable, Step, StepResult, StepRunner};
pub use scheduler::{Scheduler, SchedulerError};
