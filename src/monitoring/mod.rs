//! Pipeline health monitoring.
//!
//! The evaluator is a separate invocation from the pipeline run. It reads the
//! persisted run report and live signals from the data store, applies fixed
//! thresholds and writes a fresh monitoring report.
//!
//! # Architecture
//!
//! ```text
//! pipeline_execution_report.json ──┐
//!                                  ├──► checks ──► alerts ──► pipeline_health
//! SignalSource ──► LiveSignals ────┘                  │
//!                                                     ▼
//!                                          monitoring_report.json
//! ```
//!
//! # Checks
//!
//! | Check | Condition | Severity |
//! |-------|-----------|----------|
//! | last_execution | more than 25h since the last run ended | critical |
//! | database_connectivity | connection fails | critical |
//! | data_freshness | lag above 24h / 1h / 1h (staging / production / warehouse) | warning |
//! | data_volume | today's count outside mean ± 3σ of the preceding days | warning |
//! | data_quality | `max(0, 100 - violations) < 95` | warning |
//!
//! Any critical alert makes the pipeline `critical`, any other alert makes it
//! `degraded`. `overall_health_score` is the data quality score.
//!
//! Unavailable signals never abort an evaluation; the affected check reports
//! neutral values instead.
//!
//! # Example
//!
//! ```rust,ignore
//! use ecom_pipeline::config::PipelineConfig;
//! use ecom_pipeline::monitoring::MonitoringEvaluator;
//!
//! let config = PipelineConfig::load("config/config.yaml")?;
//! let evaluator = MonitoringEvaluator::from_config(&config);
//! let (report, _) = evaluator.evaluate_and_persist().await;
//! println!("{} ({})", report.pipeline_health, report.overall_health_score);
//! ```

pub mod checks;
pub mod evaluator;
pub mod report;
pub mod signals;

pub use checks::{quality_score, volume_anomaly, ConnectionProbe, VolumeBand};
pub use evaluator::{build_report, MonitoringEvaluator};
pub use report::{
    Alert, AnomalyType, CheckStatus, Checks, ConnectivityCheck, FreshnessCheck,
    LastExecutionCheck, MonitoringReport, PipelineHealth, QualityCheck, Severity, VolumeCheck,
};
pub use signals::{collect, LiveSignals, PgSignalSource, SignalError, SignalReader, SignalSource};
