//! Fixed-threshold health checks.
//!
//! Every check is a pure function of its inputs and the evaluation time and
//! returns the check result plus the alert it raised, if any. A missing input
//! (`None`) is an unavailable signal and yields neutral values.

use chrono::{DateTime, Utc};

use crate::storage::{DailyVolume, LayerFreshness, QualityCounts};

use super::report::{
    Alert, AnomalyType, CheckStatus, ConnectivityCheck, FreshnessCheck, LastExecutionCheck,
    QualityCheck, VolumeCheck,
};

/// Hours without a finished run before the pipeline is considered stalled.
pub const LAST_EXECUTION_THRESHOLD_HOURS: u32 = 25;

/// Maximum accepted lag per layer, in hours.
pub const STAGING_MAX_LAG_HOURS: f64 = 24.0;
pub const PRODUCTION_MAX_LAG_HOURS: f64 = 1.0;
pub const WAREHOUSE_MAX_LAG_HOURS: f64 = 1.0;

/// Width of the accepted volume band, in standard deviations.
pub const VOLUME_SIGMA: f64 = 3.0;

/// Quality scores below this are degraded.
pub const QUALITY_THRESHOLD: i64 = 95;

/// Alert check names.
pub const CHECK_LAST_EXECUTION: &str = "last_execution";
pub const CHECK_DATABASE: &str = "database_connectivity";
pub const CHECK_FRESHNESS: &str = "data_freshness";
pub const CHECK_VOLUME: &str = "data_volume";
pub const CHECK_QUALITY: &str = "data_quality";

/// Result of a successful connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionProbe {
    pub response_time_ms: f64,
    pub active_connections: Option<i64>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 3_600_000.0
}

/// Time since the last finished run.
///
/// A missing run report is critical: there is no prior run to evaluate.
pub fn last_execution(
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (LastExecutionCheck, Option<Alert>) {
    let Some(last_run) = last_run else {
        let check = LastExecutionCheck {
            status: CheckStatus::Critical,
            last_run: None,
            hours_since_last_run: None,
            threshold_hours: LAST_EXECUTION_THRESHOLD_HOURS,
        };
        let alert = Alert::critical(
            CHECK_LAST_EXECUTION,
            "No pipeline execution report available",
            now,
        );
        return (check, Some(alert));
    };

    let hours = hours_between(last_run, now);
    let stale = hours > f64::from(LAST_EXECUTION_THRESHOLD_HOURS);

    let check = LastExecutionCheck {
        status: if stale {
            CheckStatus::Critical
        } else {
            CheckStatus::Ok
        },
        last_run: Some(last_run),
        hours_since_last_run: Some(round2(hours)),
        threshold_hours: LAST_EXECUTION_THRESHOLD_HOURS,
    };
    let alert = stale.then(|| {
        Alert::critical(
            CHECK_LAST_EXECUTION,
            format!(
                "Pipeline has not run in last {} hours",
                LAST_EXECUTION_THRESHOLD_HOURS
            ),
            now,
        )
    });
    (check, alert)
}

/// Data store reachability.
pub fn database_connectivity(
    probe: Result<&ConnectionProbe, &str>,
    now: DateTime<Utc>,
) -> (ConnectivityCheck, Option<Alert>) {
    match probe {
        Ok(probe) => (
            ConnectivityCheck {
                status: CheckStatus::Ok,
                response_time_ms: Some(round2(probe.response_time_ms)),
                connections_active: probe.active_connections,
            },
            None,
        ),
        Err(reason) => (
            ConnectivityCheck {
                status: CheckStatus::Error,
                response_time_ms: None,
                connections_active: None,
            },
            Some(Alert::critical(
                CHECK_DATABASE,
                format!("Database connection failed: {}", reason),
                now,
            )),
        ),
    }
}

/// Lag of the most recent record in each layer.
///
/// Empty layers are ignored; `max_lag_hours` covers the layers that have data.
pub fn data_freshness(
    latest: Option<&LayerFreshness>,
    now: DateTime<Utc>,
) -> (FreshnessCheck, Option<Alert>) {
    let Some(latest) = latest else {
        return (
            FreshnessCheck {
                status: CheckStatus::Ok,
                staging_latest_record: None,
                production_latest_record: None,
                warehouse_latest_record: None,
                max_lag_hours: None,
            },
            None,
        );
    };

    let layers = [
        (latest.staging, STAGING_MAX_LAG_HOURS),
        (latest.production, PRODUCTION_MAX_LAG_HOURS),
        (latest.warehouse, WAREHOUSE_MAX_LAG_HOURS),
    ];

    let mut max_lag: Option<f64> = None;
    let mut lagging = false;
    for (record, limit) in layers {
        if let Some(record) = record {
            let lag = hours_between(record, now);
            lagging |= lag > limit;
            max_lag = Some(max_lag.map_or(lag, |m| m.max(lag)));
        }
    }

    let check = FreshnessCheck {
        status: if lagging {
            CheckStatus::Warning
        } else {
            CheckStatus::Ok
        },
        staging_latest_record: latest.staging,
        production_latest_record: latest.production,
        warehouse_latest_record: latest.warehouse,
        max_lag_hours: max_lag.map(round2),
    };
    let alert = lagging.then(|| Alert::warning(CHECK_FRESHNESS, "Data freshness lag detected", now));
    (check, alert)
}

/// Band statistics for a volume observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeBand {
    pub mean: f64,
    pub std_dev: f64,
}

impl VolumeBand {
    /// Mean and population standard deviation of `history`.
    ///
    /// Returns `None` for an empty history. A single point has a deviation
    /// of zero.
    pub fn from_history(history: &[i64]) -> Option<Self> {
        if history.is_empty() {
            return None;
        }
        let n = history.len() as f64;
        let mean = history.iter().map(|&c| c as f64).sum::<f64>() / n;
        let std_dev = if history.len() < 2 {
            0.0
        } else {
            let variance = history
                .iter()
                .map(|&c| (c as f64 - mean).powi(2))
                .sum::<f64>()
                / n;
            variance.sqrt()
        };
        Some(Self { mean, std_dev })
    }

    pub fn lower(&self) -> f64 {
        self.mean - VOLUME_SIGMA * self.std_dev
    }

    pub fn upper(&self) -> f64 {
        self.mean + VOLUME_SIGMA * self.std_dev
    }

    /// Band rendered as "low-high", each bound truncated toward zero.
    pub fn expected_range(&self) -> String {
        format!("{}-{}", self.lower().trunc() as i64, self.upper().trunc() as i64)
    }
}

/// Classifies `today` against the band built from `history`.
///
/// Fewer than two historical points never yield an anomaly.
pub fn volume_anomaly(history: &[i64], today: i64) -> Option<AnomalyType> {
    if history.len() < 2 {
        return None;
    }
    let band = VolumeBand::from_history(history)?;
    let today = today as f64;
    if today > band.upper() {
        Some(AnomalyType::Spike)
    } else if today < band.lower() {
        Some(AnomalyType::Drop)
    } else {
        None
    }
}

/// Today's volume against the preceding days.
///
/// `volumes` is ordered oldest first; the last entry is today's count.
pub fn data_volume(
    volumes: Option<&[DailyVolume]>,
    now: DateTime<Utc>,
) -> (VolumeCheck, Option<Alert>) {
    let Some((today, earlier)) = volumes.and_then(|v| v.split_last()) else {
        return (
            VolumeCheck {
                status: CheckStatus::Ok,
                expected_range: None,
                actual_count: None,
                anomaly_detected: false,
                anomaly_type: None,
            },
            None,
        );
    };

    let history: Vec<i64> = earlier.iter().map(|v| v.count).collect();
    let anomaly = volume_anomaly(&history, today.count);
    let expected_range = VolumeBand::from_history(&history).map(|band| band.expected_range());

    let check = VolumeCheck {
        status: if anomaly.is_some() {
            CheckStatus::AnomalyDetected
        } else {
            CheckStatus::Ok
        },
        expected_range,
        actual_count: Some(today.count),
        anomaly_detected: anomaly.is_some(),
        anomaly_type: anomaly,
    };
    let alert = anomaly.map(|kind| {
        Alert::warning(
            CHECK_VOLUME,
            format!("Volume anomaly detected: {}", kind),
            now,
        )
    });
    (check, alert)
}

/// `max(0, 100 - violations)`.
pub fn quality_score(counts: &QualityCounts) -> i64 {
    (100 - counts.total()).max(0)
}

/// Quality score over the violation counts. Unavailable counts score as zero
/// violations.
pub fn data_quality(
    counts: Option<&QualityCounts>,
    now: DateTime<Utc>,
) -> (QualityCheck, Option<Alert>) {
    let counts = counts.copied().unwrap_or_default();
    let score = quality_score(&counts);
    let degraded = score < QUALITY_THRESHOLD;

    let check = QualityCheck {
        status: if degraded {
            CheckStatus::Degraded
        } else {
            CheckStatus::Ok
        },
        quality_score: score,
        orphan_records: counts.orphan_records(),
        null_violations: counts.null_violations,
    };
    let alert =
        degraded.then(|| Alert::warning(CHECK_QUALITY, "Data quality score below threshold", now));
    (check, alert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::report::Severity;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap()
    }

    fn volumes(counts: &[i64]) -> Vec<DailyVolume> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        counts
            .iter()
            .enumerate()
            .map(|(i, &c)| DailyVolume::new(start + Duration::days(i as i64), c))
            .collect()
    }

    #[test]
    fn test_last_execution_thresholds() {
        let (check, alert) = last_execution(Some(now() - Duration::hours(26)), now());
        assert_eq!(check.status, CheckStatus::Critical);
        assert_eq!(check.hours_since_last_run, Some(26.0));
        let alert = alert.expect("stale run alerts");
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.check, "last_execution");

        let (check, alert) = last_execution(Some(now() - Duration::hours(2)), now());
        assert_eq!(check.status, CheckStatus::Ok);
        assert!(alert.is_none());

        // Exactly on the threshold is not stale
        let (check, _) = last_execution(Some(now() - Duration::hours(25)), now());
        assert_eq!(check.status, CheckStatus::Ok);
    }

    #[test]
    fn test_last_execution_without_report() {
        let (check, alert) = last_execution(None, now());
        assert_eq!(check.status, CheckStatus::Critical);
        assert!(check.last_run.is_none());
        assert!(check.hours_since_last_run.is_none());
        assert_eq!(alert.expect("alert").severity, Severity::Critical);
    }

    #[test]
    fn test_connectivity() {
        let probe = ConnectionProbe {
            response_time_ms: 12.3456,
            active_connections: Some(4),
        };
        let (check, alert) = database_connectivity(Ok(&probe), now());
        assert_eq!(check.status, CheckStatus::Ok);
        assert_eq!(check.response_time_ms, Some(12.35));
        assert_eq!(check.connections_active, Some(4));
        assert!(alert.is_none());

        let (check, alert) = database_connectivity(Err("connection refused"), now());
        assert_eq!(check.status, CheckStatus::Error);
        let alert = alert.expect("alert");
        assert_eq!(alert.severity, Severity::Critical);
        assert!(alert.message.contains("connection refused"));
    }

    #[test]
    fn test_freshness_per_layer_limits() {
        let fresh = LayerFreshness {
            staging: Some(now() - Duration::hours(20)),
            production: Some(now() - Duration::minutes(30)),
            warehouse: Some(now() - Duration::minutes(45)),
        };
        let (check, alert) = data_freshness(Some(&fresh), now());
        assert_eq!(check.status, CheckStatus::Ok);
        assert_eq!(check.max_lag_hours, Some(20.0));
        assert!(alert.is_none());

        let stale_warehouse = LayerFreshness {
            warehouse: Some(now() - Duration::minutes(90)),
            ..fresh
        };
        let (check, alert) = data_freshness(Some(&stale_warehouse), now());
        assert_eq!(check.status, CheckStatus::Warning);
        assert_eq!(alert.expect("alert").severity, Severity::Warning);

        let stale_staging = LayerFreshness {
            staging: Some(now() - Duration::hours(25)),
            ..fresh
        };
        let (check, alert) = data_freshness(Some(&stale_staging), now());
        assert_eq!(check.status, CheckStatus::Warning);
        assert_eq!(check.max_lag_hours, Some(25.0));
        let alert = alert.expect("alert");
        assert_eq!(alert.check, "data_freshness");
        assert_eq!(alert.severity, Severity::Warning);

        // 90 minutes is within the staging limit but past the production one
        let stale_production = LayerFreshness {
            production: Some(now() - Duration::minutes(90)),
            ..fresh
        };
        let (check, alert) = data_freshness(Some(&stale_production), now());
        assert_eq!(check.status, CheckStatus::Warning);
        assert_eq!(alert.expect("alert").check, "data_freshness");

        // Exactly at the limit is still fresh
        let staging_at_limit = LayerFreshness {
            staging: Some(now() - Duration::hours(24)),
            ..fresh
        };
        let (check, alert) = data_freshness(Some(&staging_at_limit), now());
        assert_eq!(check.status, CheckStatus::Ok);
        assert_eq!(check.max_lag_hours, Some(24.0));
        assert!(alert.is_none());

        let production_at_limit = LayerFreshness {
            production: Some(now() - Duration::hours(1)),
            ..fresh
        };
        let (check, _) = data_freshness(Some(&production_at_limit), now());
        assert_eq!(check.status, CheckStatus::Ok);
    }

    #[test]
    fn test_freshness_unavailable_and_empty_layers() {
        let (check, alert) = data_freshness(None, now());
        assert_eq!(check.status, CheckStatus::Ok);
        assert!(check.max_lag_hours.is_none());
        assert!(alert.is_none());

        let partial = LayerFreshness {
            staging: Some(now() - Duration::hours(3)),
            production: None,
            warehouse: None,
        };
        let (check, alert) = data_freshness(Some(&partial), now());
        assert_eq!(check.max_lag_hours, Some(3.0));
        assert!(alert.is_none());
    }

    #[test]
    fn test_volume_spike_and_normal() {
        let history = [100, 102, 98, 101, 99];
        assert_eq!(volume_anomaly(&history, 500), Some(AnomalyType::Spike));
        assert_eq!(volume_anomaly(&history, 100), None);
        assert_eq!(volume_anomaly(&history, 10), Some(AnomalyType::Drop));
    }

    #[test]
    fn test_volume_short_history_never_anomalous() {
        assert_eq!(volume_anomaly(&[], 1_000), None);
        assert_eq!(volume_anomaly(&[100], 1_000), None);
    }

    #[test]
    fn test_volume_band_population_stdev() {
        let band = VolumeBand::from_history(&[100, 102, 98, 101, 99]).expect("band");
        assert!((band.mean - 100.0).abs() < 1e-9);
        assert!((band.std_dev - 2f64.sqrt()).abs() < 1e-9);
        assert_eq!(band.expected_range(), "95-104");
    }

    #[test]
    fn test_data_volume_check() {
        let rows = volumes(&[100, 102, 98, 101, 99, 500]);
        let (check, alert) = data_volume(Some(rows.as_slice()), now());
        assert_eq!(check.status, CheckStatus::AnomalyDetected);
        assert!(check.anomaly_detected);
        assert_eq!(check.anomaly_type, Some(AnomalyType::Spike));
        assert_eq!(check.actual_count, Some(500));
        assert_eq!(check.expected_range.as_deref(), Some("95-104"));
        let alert = alert.expect("alert");
        assert_eq!(alert.check, "data_volume");
        assert_eq!(alert.message, "Volume anomaly detected: spike");

        let rows = volumes(&[100, 102, 98, 101, 99, 100]);
        let (check, alert) = data_volume(Some(rows.as_slice()), now());
        assert_eq!(check.status, CheckStatus::Ok);
        assert!(!check.anomaly_detected);
        assert!(alert.is_none());
    }

    #[test]
    fn test_data_volume_unavailable() {
        let (check, alert) = data_volume(None, now());
        assert!(check.actual_count.is_none());
        assert!(check.expected_range.is_none());
        assert!(alert.is_none());

        let (check, _) = data_volume(Some(&[][..]), now());
        assert!(check.actual_count.is_none());
    }

    #[test]
    fn test_quality_score_thresholds() {
        let (check, alert) = data_quality(Some(&QualityCounts::new(2, 1, 0)), now());
        assert_eq!(check.quality_score, 97);
        assert_eq!(check.status, CheckStatus::Ok);
        assert_eq!(check.orphan_records, 3);
        assert!(alert.is_none());

        let (check, alert) = data_quality(Some(&QualityCounts::new(10, 0, 0)), now());
        assert_eq!(check.quality_score, 90);
        assert_eq!(check.status, CheckStatus::Degraded);
        assert_eq!(alert.expect("alert").check, "data_quality");
    }

    #[test]
    fn test_quality_score_floor_and_unavailable() {
        assert_eq!(quality_score(&QualityCounts::new(80, 30, 5)), 0);

        let (check, alert) = data_quality(None, now());
        assert_eq!(check.quality_score, 100);
        assert_eq!(check.status, CheckStatus::Ok);
        assert!(alert.is_none());
    }
}
