//! Run report produced by the orchestrator.
//!
//! The report is written once at the end of every run to a well-known path
//! and is the hand-off to the monitoring evaluator:
//!
//! ```json
//! {
//!   "pipeline_execution_id": "PIPE_20240105_020000",
//!   "start_time": "2024-01-05T02:00:00Z",
//!   "end_time": "2024-01-05T02:04:12Z",
//!   "total_duration_seconds": 252.31,
//!   "status": "failed",
//!   "steps_executed": {
//!     "data_generation": {"status": "success", "duration_seconds": 40.1, "retry_attempts": 0},
//!     "data_ingestion": {"status": "failed", "duration_seconds": 212.2, "retry_attempts": 3,
//!                        "error_message": "connection refused"}
//!   },
//!   "errors": ["data_ingestion failed"],
//!   "warnings": []
//! }
//! ```

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ReportError;
use crate::runner::StepResult;
use crate::storage::reports;

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Step results keyed by step name, in execution order.
///
/// Serialized as a JSON object whose key order is the execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResults(Vec<(String, StepResult)>);

impl StepResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a result. A repeated name replaces the earlier entry in place.
    pub fn push(&mut self, name: impl Into<String>, result: StepResult) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = result,
            None => self.0.push((name, result)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StepResult> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Step names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StepResult)> {
        self.0.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn all_succeeded(&self) -> bool {
        self.0.iter().all(|(_, r)| r.is_success())
    }
}

impl Serialize for StepResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, result) in &self.0 {
            map.serialize_entry(name, result)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StepResults {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StepResultsVisitor;

        impl<'de> Visitor<'de> for StepResultsVisitor {
            type Value = StepResults;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of step name to step result")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut results = StepResults::new();
                while let Some((name, result)) = access.next_entry::<String, StepResult>()? {
                    results.push(name, result);
                }
                Ok(results)
            }
        }

        deserializer.deserialize_map(StepResultsVisitor)
    }
}

/// Report of one orchestration run. Written exactly once, immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(rename = "pipeline_execution_id")]
    pub execution_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_duration_seconds: f64,
    pub status: RunStatus,
    #[serde(rename = "steps_executed")]
    pub steps: StepResults,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RunReport {
    /// Execution id derived from the run's start timestamp.
    pub fn execution_id_for(start_time: DateTime<Utc>) -> String {
        format!("PIPE_{}", start_time.format("%Y%m%d_%H%M%S"))
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Name of the step that halted the run, if any.
    pub fn failed_step(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|(_, r)| !r.is_success())
            .map(|(name, _)| name)
    }

    /// Process exit code for callers: 0 on success, 1 on failure.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// One-line summary for operators.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} {} ({} step(s), {:.2}s, ended {})",
            self.execution_id,
            self.status,
            self.steps.len(),
            self.total_duration_seconds,
            self.end_time.to_rfc3339()
        );
        if let Some(step) = self.failed_step() {
            line.push_str(&format!(", failed at {}", step));
        }
        line
    }

    /// Writes the report to `path`, overwriting any previous report.
    pub fn persist(&self, path: &Path) -> Result<(), ReportError> {
        reports::write_pretty(path, self)
    }

    /// Loads a report from `path`.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        reports::read(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample_report() -> RunReport {
        let start = Utc.with_ymd_and_hms(2024, 1, 5, 2, 0, 0).unwrap();
        let mut steps = StepResults::new();
        steps.push("data_generation", StepResult::success(40.1, 0));
        steps.push("data_ingestion", StepResult::failed(12.5, 3, "connection refused"));

        RunReport {
            execution_id: RunReport::execution_id_for(start),
            start_time: start,
            end_time: start + chrono::Duration::seconds(53),
            total_duration_seconds: 52.61,
            status: RunStatus::Failed,
            steps,
            errors: vec!["data_ingestion failed".to_string()],
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_execution_id_format() {
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(RunReport::execution_id_for(start), "PIPE_20240309_140507");
    }

    #[test]
    fn test_json_shape_and_step_order() {
        let report = sample_report();
        let json = serde_json::to_string_pretty(&report).expect("serialize");

        for key in [
            "pipeline_execution_id",
            "start_time",
            "end_time",
            "total_duration_seconds",
            "steps_executed",
            "errors",
            "warnings",
        ] {
            assert!(json.contains(key), "missing key {}", key);
        }

        let generation = json.find("\"data_generation\"").expect("first step");
        let ingestion = json.find("\"data_ingestion\"").expect("second step");
        assert!(generation < ingestion, "steps must keep execution order");

        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["steps_executed"]["data_ingestion"]["retry_attempts"], 3);
    }

    #[test]
    fn test_deserialize_preserves_order() {
        let json = r#"{
            "pipeline_execution_id": "PIPE_20240105_020000",
            "start_time": "2024-01-05T02:00:00+00:00",
            "end_time": "2024-01-05T02:01:00+00:00",
            "total_duration_seconds": 60.0,
            "status": "success",
            "steps_executed": {
                "zeta": {"status": "success", "duration_seconds": 1.0, "retry_attempts": 0},
                "alpha": {"status": "success", "duration_seconds": 2.0, "retry_attempts": 1}
            },
            "errors": [],
            "warnings": []
        }"#;
        let report: RunReport = serde_json::from_str(json).expect("parse");
        let names: Vec<&str> = report.steps.names().collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
        assert!(report.failed_step().is_none());
    }

    #[test]
    fn test_failed_report_helpers() {
        let report = sample_report();
        assert_eq!(report.failed_step(), Some("data_ingestion"));
        assert_eq!(report.exit_code(), 1);
        let summary = report.summary();
        assert!(summary.starts_with("PIPE_20240105_020000 failed"));
        assert!(summary.contains("failed at data_ingestion"));
    }

    #[test]
    fn test_step_results_push_replaces_existing() {
        let mut steps = StepResults::new();
        steps.push("a", StepResult::failed(1.0, 3, "x"));
        steps.push("b", StepResult::success(1.0, 0));
        steps.push("a", StepResult::success(2.0, 1));

        assert_eq!(steps.len(), 2);
        assert_eq!(steps.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(steps.all_succeeded());
        assert!(steps.contains("b"));
    }

    #[test]
    fn test_persist_and_load() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("pipeline_execution_report.json");
        let report = sample_report();

        report.persist(&path).expect("persist");
        let loaded = RunReport::load(&path).expect("load");
        assert_eq!(loaded, report);
    }
}
