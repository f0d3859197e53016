//! Pipeline orchestration.
//!
//! # Pipeline Flow
//!
//! 1. **Data generation**: fake customers, products and transactions
//! 2. **Ingestion**: CSV files bulk-loaded into the staging schema
//! 3. **Quality checks**: validation of the staged data
//! 4. **Staging to production**: cleaned, deduplicated production tables
//! 5. **Warehouse load**: dimensions and facts
//! 6. **Analytics**: aggregate outputs
//!
//! Each step is an external unit. The orchestrator runs them strictly in
//! order, halts at the first step that fails after its retries, and writes a
//! [`RunReport`] to a fixed path for the monitoring evaluator.
//!
//! # Example
//!
//! ```rust,ignore
//! use ecom_pipeline::config::PipelineConfig;
//! use ecom_pipeline::pipeline::PipelineOrchestrator;
//!
//! let config = PipelineConfig::load("config/config.yaml")?;
//! let orchestrator = PipelineOrchestrator::from_config(&config)?;
//!
//! let report = orchestrator.run().await;
//! println!("{}", report.summary());
//! std::process::exit(report.exit_code());
//! ```

pub mod orchestrator;
pub mod report;

pub use orchestrator::PipelineOrchestrator;
pub use report::{RunReport, RunStatus, StepResults};
