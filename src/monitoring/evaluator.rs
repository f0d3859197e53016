//! Monitoring evaluator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::ReportError;
use crate::pipeline::RunReport;

use super::checks;
use super::report::{Checks, MonitoringReport, PipelineHealth};
use super::signals::{self, LiveSignals, PgSignalSource, SignalSource};

/// Builds a monitoring report from the last run's end time and the live
/// signals. Pure: the same inputs always give the same report.
pub fn build_report(
    last_run: Option<DateTime<Utc>>,
    signals: &LiveSignals,
    now: DateTime<Utc>,
) -> MonitoringReport {
    let mut alerts = Vec::new();

    let (last_execution, alert) = checks::last_execution(last_run, now);
    alerts.extend(alert);

    let (database_connectivity, alert) =
        checks::database_connectivity(signals.connectivity.as_ref().map_err(String::as_str), now);
    alerts.extend(alert);

    let (data_freshness, alert) = checks::data_freshness(signals.freshness.as_ref(), now);
    alerts.extend(alert);

    let (data_volume_anomalies, alert) = checks::data_volume(signals.volumes.as_deref(), now);
    alerts.extend(alert);

    let (data_quality, alert) = checks::data_quality(signals.quality.as_ref(), now);
    alerts.extend(alert);

    let overall_health_score = data_quality.quality_score;

    MonitoringReport {
        timestamp: now,
        pipeline_health: PipelineHealth::from_alerts(&alerts),
        checks: Checks {
            last_execution,
            data_freshness,
            data_volume_anomalies,
            data_quality,
            database_connectivity,
        },
        alerts,
        overall_health_score,
    }
}

/// Derives pipeline health from the persisted run report and live signals.
pub struct MonitoringEvaluator {
    run_report_path: PathBuf,
    output_path: PathBuf,
    source: Arc<dyn SignalSource>,
}

impl MonitoringEvaluator {
    /// Creates an evaluator.
    ///
    /// # Arguments
    ///
    /// * `run_report_path` - Where the orchestrator writes its run report
    /// * `output_path` - Where the monitoring report is written
    /// * `source` - Live signal source
    pub fn new(
        run_report_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        source: impl SignalSource + 'static,
    ) -> Self {
        Self {
            run_report_path: run_report_path.into(),
            output_path: output_path.into(),
            source: Arc::new(source),
        }
    }

    /// Evaluator over the configured report paths and PostgreSQL store.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.run_report_path(),
            config.monitoring_report_path(),
            PgSignalSource::from_config(config),
        )
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// End time of the last run, or `None` if the report is missing or
    /// unreadable.
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        match RunReport::load(&self.run_report_path) {
            Ok(report) => Some(report.end_time),
            Err(ReportError::NotFound(path)) => {
                warn!("No pipeline execution report at {}", path.display());
                None
            }
            Err(e) => {
                warn!("Pipeline execution report unreadable: {}", e);
                None
            }
        }
    }

    /// Evaluates against `now`.
    pub async fn evaluate_at(&self, now: DateTime<Utc>) -> MonitoringReport {
        let last_run = self.last_run();
        let live = signals::collect(self.source.as_ref()).await;
        let report = build_report(last_run, &live, now);

        for alert in &report.alerts {
            warn!("[{:?}] {}: {}", alert.severity, alert.check, alert.message);
        }
        info!(
            "Monitoring complete: health={} score={} alerts={}",
            report.pipeline_health,
            report.overall_health_score,
            report.alerts.len()
        );

        report
    }

    pub async fn evaluate(&self) -> MonitoringReport {
        self.evaluate_at(Utc::now()).await
    }

    /// Evaluates and writes the report to the output path.
    ///
    /// The report is returned even when it could not be written.
    pub async fn evaluate_and_persist(&self) -> (MonitoringReport, Result<(), ReportError>) {
        let report = self.evaluate().await;
        let persisted = report.persist(&self.output_path);
        match &persisted {
            Ok(()) => info!("Monitoring report written to: {}", self.output_path.display()),
            Err(e) => error!(
                "Failed to write monitoring report to {}: {}",
                self.output_path.display(),
                e
            ),
        }
        (report, persisted)
    }
}
