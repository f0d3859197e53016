//! Monitoring report types.
//!
//! Recomputed on every evaluation and written to a fixed path, replacing the
//! previous report.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::storage::reports;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

/// A fired alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub check: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn warning(check: &str, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            severity: Severity::Warning,
            check: check.to_string(),
            message: message.into(),
            timestamp,
        }
    }

    pub fn critical(check: &str, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            severity: Severity::Critical,
            check: check.to_string(),
            message: message.into(),
            timestamp,
        }
    }
}

/// Overall pipeline health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineHealth {
    Healthy,
    Degraded,
    Critical,
}

impl PipelineHealth {
    /// Verdict for a set of alerts: any critical alert wins, any other alert
    /// degrades, none is healthy.
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        if alerts.iter().any(|a| a.severity == Severity::Critical) {
            PipelineHealth::Critical
        } else if alerts.is_empty() {
            PipelineHealth::Healthy
        } else {
            PipelineHealth::Degraded
        }
    }
}

impl fmt::Display for PipelineHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineHealth::Healthy => write!(f, "healthy"),
            PipelineHealth::Degraded => write!(f, "degraded"),
            PipelineHealth::Critical => write!(f, "critical"),
        }
    }
}

/// Status of a single check. Each check uses a subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Warning,
    Degraded,
    AnomalyDetected,
    Critical,
    Error,
}

/// Direction of a volume anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Spike,
    Drop,
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyType::Spike => write!(f, "spike"),
            AnomalyType::Drop => write!(f, "drop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastExecutionCheck {
    pub status: CheckStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub hours_since_last_run: Option<f64>,
    pub threshold_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessCheck {
    pub status: CheckStatus,
    pub staging_latest_record: Option<DateTime<Utc>>,
    pub production_latest_record: Option<DateTime<Utc>>,
    pub warehouse_latest_record: Option<DateTime<Utc>>,
    pub max_lag_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeCheck {
    pub status: CheckStatus,
    pub expected_range: Option<String>,
    pub actual_count: Option<i64>,
    pub anomaly_detected: bool,
    pub anomaly_type: Option<AnomalyType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub status: CheckStatus,
    pub quality_score: i64,
    pub orphan_records: i64,
    pub null_violations: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityCheck {
    pub status: CheckStatus,
    pub response_time_ms: Option<f64>,
    pub connections_active: Option<i64>,
}

/// Per-check results, keyed by check name in the JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checks {
    pub last_execution: LastExecutionCheck,
    pub data_freshness: FreshnessCheck,
    pub data_volume_anomalies: VolumeCheck,
    pub data_quality: QualityCheck,
    pub database_connectivity: ConnectivityCheck,
}

/// Result of one monitoring evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    #[serde(rename = "monitoring_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub pipeline_health: PipelineHealth,
    pub checks: Checks,
    pub alerts: Vec<Alert>,
    /// Equal to the data quality score; other checks do not contribute.
    pub overall_health_score: i64,
}

impl MonitoringReport {
    pub fn is_healthy(&self) -> bool {
        self.pipeline_health == PipelineHealth::Healthy
    }

    /// Process exit code for callers: 0 when healthy, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_healthy() {
            0
        } else {
            1
        }
    }

    /// Alerts raised by the named check.
    pub fn alerts_for<'a>(&'a self, check: &'a str) -> impl Iterator<Item = &'a Alert> + 'a {
        self.alerts.iter().filter(move |a| a.check == check)
    }

    /// Writes the report to `path`, overwriting any previous report.
    pub fn persist(&self, path: &Path) -> Result<(), ReportError> {
        reports::write_pretty(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, ReportError> {
        reports::read(path)
    }
}
