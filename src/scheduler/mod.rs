//! Daily scheduling of guarded pipeline runs.
//!
//! # Architecture
//!
//! ```text
//!        poll every 30s
//!              │
//!       ┌──────▼───────┐   not due
//!       │ DailyTrigger ├────────────► wait
//!       └──────┬───────┘
//!              │ due
//!       ┌──────▼───────┐   held
//!       │ try_acquire  ├────────────► skip tick
//!       └──────┬───────┘
//!              │
//!       ┌──────▼───────┐
//!       │ Orchestrator │
//!       └──────┬───────┘
//!              │ (every exit path)
//!       release lock → RetentionCleaner → log duration
//! ```
//!
//! The loop stops when its [`CancellationToken`] fires. A run in progress is
//! dropped, which releases the lock; the unit executing at that moment is not
//! killed.
//!
//! # Example
//!
//! ```rust,ignore
//! use ecom_pipeline::config::PipelineConfig;
//! use ecom_pipeline::scheduler::Scheduler;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = PipelineConfig::load("config/config.yaml")?;
//! let scheduler = Scheduler::from_config(&config)?;
//!
//! let cancel = CancellationToken::new();
//! scheduler.run(cancel.clone()).await?;
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod cleanup;
pub mod service;
pub mod trigger;

// Re-export main types for convenience
pub use cleanup::{should_preserve, CleanupStats, RetentionCleaner, PRESERVE_KEYWORDS};
pub use service::{Scheduler, SchedulerError, TickOutcome};
pub use trigger::DailyTrigger;
