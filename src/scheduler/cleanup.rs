//! Retention cleanup run after every scheduled pipeline run.
//!
//! Deletes regular files older than the retention period from the configured
//! directories (non-recursive). Files whose name carries today's `YYYYMMDD`
//! stamp or one of the [`PRESERVE_KEYWORDS`] are always kept.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::UnitError;
use crate::runner::{Runnable, UnitOutput};

/// File name fragments that are never cleaned up.
pub const PRESERVE_KEYWORDS: [&str; 3] = ["summary", "report", "metadata"];

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Counters for one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl std::fmt::Display for CleanupStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Deleted: {} | Skipped: {} | Failed: {}",
            self.deleted, self.skipped, self.failed
        )
    }
}

/// Deletes stale files from a fixed set of directories.
#[derive(Debug, Clone)]
pub struct RetentionCleaner {
    dirs: Vec<PathBuf>,
    retention: Duration,
}

impl RetentionCleaner {
    pub fn new(dirs: Vec<PathBuf>, retention_days: u32) -> Self {
        Self {
            dirs,
            retention: Duration::from_secs(u64::from(retention_days) * SECONDS_PER_DAY),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.cleanup_dirs(), config.scheduler.retention_days)
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Runs one pass against the current time.
    pub fn clean(&self) -> CleanupStats {
        self.clean_at(SystemTime::now(), Utc::now().date_naive())
    }

    /// Runs one pass, judging file age against `now` and preserving files
    /// stamped with `today`.
    pub fn clean_at(&self, now: SystemTime, today: NaiveDate) -> CleanupStats {
        let today_stamp = today.format("%Y%m%d").to_string();
        let mut stats = CleanupStats::default();

        info!("========== CLEANUP JOB STARTED ==========");
        info!("Retention policy: {} days", self.retention.as_secs() / SECONDS_PER_DAY);

        for dir in &self.dirs {
            if !dir.is_dir() {
                warn!("Directory does not exist: {}", dir.display());
                continue;
            }

            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    error!("Failed to read directory {}: {}", dir.display(), e);
                    stats.failed += 1;
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                self.visit(&path, now, &today_stamp, &mut stats);
            }
        }

        info!("Cleanup completed | {}", stats);
        info!("========== CLEANUP JOB FINISHED ==========");
        stats
    }

    fn visit(&self, path: &Path, now: SystemTime, today_stamp: &str, stats: &mut CleanupStats) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if should_preserve(&name, today_stamp) {
            stats.skipped += 1;
            return;
        }

        let modified = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                error!("Failed to stat {}: {}", path.display(), e);
                stats.failed += 1;
                return;
            }
        };

        // Files stamped in the future count as fresh
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= self.retention {
            stats.skipped += 1;
            return;
        }

        match fs::remove_file(path) {
            Ok(()) => {
                info!("Deleted old file: {}", path.display());
                stats.deleted += 1;
            }
            Err(e) => {
                error!("Failed to delete {}: {}", path.display(), e);
                stats.failed += 1;
            }
        }
    }
}

/// Whether a file is exempt from cleanup.
pub fn should_preserve(file_name: &str, today_stamp: &str) -> bool {
    if file_name.contains(today_stamp) {
        return true;
    }
    let lower = file_name.to_lowercase();
    PRESERVE_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[async_trait]
impl Runnable for RetentionCleaner {
    fn describe(&self) -> String {
        format!("retention cleanup of {} directories", self.dirs.len())
    }

    async fn invoke(&self) -> Result<UnitOutput, UnitError> {
        let cleaner = self.clone();
        let stats = tokio::task::spawn_blocking(move || cleaner.clean())
            .await
            .map_err(|e| UnitError::Launch {
                program: "retention cleanup".to_string(),
                reason: e.to_string(),
            })?;
        Ok(UnitOutput::success(stats.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(SECONDS_PER_DAY);

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 20).unwrap()
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "x").expect("write");
        path
    }

    #[test]
    fn test_should_preserve() {
        assert!(should_preserve("transactions_20240120.csv", "20240120"));
        assert!(should_preserve("Daily_SUMMARY.json", "20240120"));
        assert!(should_preserve("quality_report.json", "20240120"));
        assert!(should_preserve("run_metadata.txt", "20240120"));
        assert!(!should_preserve("transactions_20240101.csv", "20240120"));
    }

    #[test]
    fn test_clean_deletes_only_stale_unpreserved_files() {
        let dir = TempDir::new().expect("temp dir");
        let raw = dir.path().join("raw");
        fs::create_dir_all(raw.join("nested")).expect("mkdir");

        let stale = touch(&raw, "customers_20240101.csv");
        let stamped = touch(&raw, "customers_20240120.csv");
        let report = touch(&raw, "load_report.json");
        let nested = touch(&raw.join("nested"), "old.csv");

        let cleaner = RetentionCleaner::new(vec![raw.clone()], 7);
        // Pretend ten days have passed since the files were written
        let now = SystemTime::now() + 10 * DAY;
        let stats = cleaner.clean_at(now, today());

        assert_eq!(stats, CleanupStats { deleted: 1, skipped: 2, failed: 0 });
        assert!(!stale.exists());
        assert!(stamped.exists());
        assert!(report.exists());
        assert!(nested.exists(), "cleanup is not recursive");
    }

    #[test]
    fn test_clean_keeps_recent_files() {
        let dir = TempDir::new().expect("temp dir");
        let recent = touch(dir.path(), "products.csv");

        let cleaner = RetentionCleaner::new(vec![dir.path().to_path_buf()], 7);
        let stats = cleaner.clean_at(SystemTime::now() + 2 * DAY, today());

        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.skipped, 1);
        assert!(recent.exists());
    }

    #[test]
    fn test_missing_directory_is_skipped() {
        let dir = TempDir::new().expect("temp dir");
        let cleaner = RetentionCleaner::new(vec![dir.path().join("absent")], 7);
        assert_eq!(cleaner.clean(), CleanupStats::default());
    }

    #[tokio::test]
    async fn test_invoke_as_unit() {
        let dir = TempDir::new().expect("temp dir");
        touch(dir.path(), "fresh.csv");

        let cleaner = RetentionCleaner::new(vec![dir.path().to_path_buf()], 7);
        let output = cleaner.invoke().await.expect("invoke");
        assert!(output.is_success());
        assert!(output.stdout.contains("Deleted: 0"));
    }

    #[test]
    fn test_from_config_resolves_dirs() {
        let config = PipelineConfig::new().with_base_dir("/srv/pipeline");
        let cleaner = RetentionCleaner::from_config(&config);
        assert_eq!(
            cleaner.dirs(),
            &[
                PathBuf::from("/srv/pipeline/data/raw"),
                PathBuf::from("/srv/pipeline/data/staging"),
                PathBuf::from("/srv/pipeline/logs"),
            ]
        );
    }
}
