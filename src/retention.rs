use crate::errors::RunnerError;
use crate::run_log::LOG_NAME_PATTERN;
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub const DEFAULT_RETENTION_DAYS: u64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_age: Duration,
}

impl RetentionPolicy {
    pub fn days(days: u64) -> Self {
        Self {
            max_age: Duration::from_secs(days * 24 * 60 * 60),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::days(DEFAULT_RETENTION_DAYS)
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    pub kept: usize,
}

/// Delete run logs whose modification time is older than the policy allows.
/// Only files named like run logs are considered.
pub fn sweep(
    logs_dir: &Path,
    policy: RetentionPolicy,
    now: DateTime<Local>,
) -> Result<SweepReport, RunnerError> {
    let mut report = SweepReport::default();
    if !logs_dir.is_dir() {
        return Ok(report);
    }

    let pattern = Regex::new(LOG_NAME_PATTERN)?;
    let cutoff = SystemTime::from(now)
        .checked_sub(policy.max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    for entry in std::fs::read_dir(logs_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !pattern.is_match(name) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        if metadata.modified()? < cutoff {
            let path = entry.path();
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed expired log {}", path.display());
                    report.deleted.push(path);
                }
                Err(e) => warn!("Could not remove expired log {}: {}", path.display(), e),
            }
        } else {
            report.kept += 1;
        }
    }

    report.deleted.sort();
    if !report.deleted.is_empty() {
        info!(
            "Retention sweep removed {} log(s), kept {}",
            report.deleted.len(),
            report.kept
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str, age_days: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_days * 24 * 60 * 60);
        file.set_modified(mtime).unwrap();
        path
    }

    #[test]
    fn test_sweep_deletes_only_expired_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let old = touch(tmp.path(), "scraper_20240101_000000.log", 45);
        let older = touch(tmp.path(), "scraper_20231201_120000.log", 90);
        let fresh = touch(tmp.path(), "scraper_20240301_000000.log", 2);
        let edge = touch(tmp.path(), "scraper_20240215_000000.log", 29);

        let report = sweep(tmp.path(), RetentionPolicy::default(), Local::now()).unwrap();

        assert_eq!(report.deleted, {
            let mut v = vec![old.clone(), older.clone()];
            v.sort();
            v
        });
        assert_eq!(report.kept, 2);
        assert!(!old.exists());
        assert!(!older.exists());
        assert!(fresh.exists());
        assert!(edge.exists());
    }

    #[test]
    fn test_sweep_ignores_unrelated_files() {
        let tmp = tempfile::tempdir().unwrap();
        let notes = touch(tmp.path(), "notes.log", 100);
        let db = touch(tmp.path(), "runs.db", 100);
        let cron = touch(tmp.path(), "scraper_cron.log", 100);
        std::fs::create_dir(tmp.path().join("scraper_20200101_000000.log")).unwrap();

        let report = sweep(tmp.path(), RetentionPolicy::default(), Local::now()).unwrap();

        assert!(report.deleted.is_empty());
        assert!(notes.exists());
        assert!(db.exists());
        assert!(cron.exists());
        assert!(tmp.path().join("scraper_20200101_000000.log").is_dir());
    }

    #[test]
    fn test_sweep_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let report = sweep(
            &tmp.path().join("absent"),
            RetentionPolicy::default(),
            Local::now(),
        )
        .unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn test_custom_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let three_days = touch(tmp.path(), "scraper_20240301_000000.log", 3);

        let report = sweep(tmp.path(), RetentionPolicy::days(1), Local::now()).unwrap();
        assert_eq!(report.deleted, vec![three_days]);
    }
}
