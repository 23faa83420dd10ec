use crate::errors::RunnerError;
use chrono::Local;
use log::{debug, warn};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Run-in-progress marker. Only one holder per path. Dropping the guard
/// removes the file, unless another holder has taken it over since.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    token: String,
}

impl RunLock {
    /// A lock file older than `stale_after` is assumed abandoned and taken over.
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self, RunnerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match Self::create(path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !is_stale(path, stale_after)? {
                    return Err(RunnerError::RunInProgress(path.display().to_string()));
                }
                warn!("Replacing stale run lock {}", path.display());
                std::fs::remove_file(path)?;
                Self::create(path).map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => {
                        RunnerError::RunInProgress(path.display().to_string())
                    }
                    _ => RunnerError::IoError(e),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let token = format!(
            "pid={} seq={} started={}",
            std::process::id(),
            SEQUENCE.fetch_add(1, Ordering::Relaxed),
            Local::now().to_rfc3339()
        );
        writeln!(file, "{}", token)?;
        debug!("Acquired run lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            token,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim_end() == self.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!("Could not release run lock {}: {}", self.path.display(), e);
                }
            }
            Ok(_) => warn!(
                "Run lock {} was taken over by another run, leaving it in place",
                self.path.display()
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Run lock {} was already removed", self.path.display())
            }
            Err(e) => warn!("Could not read run lock {}: {}", self.path.display(), e),
        }
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> Result<bool, RunnerError> {
    let modified = match std::fs::metadata(path) {
        Ok(meta) => meta.modified()?,
        // Released between our attempt and this check.
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    Ok(age > stale_after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs/.run.lock");

        let held = RunLock::acquire(&path, DEFAULT_STALE_AFTER).unwrap();
        assert!(path.exists());

        let err = RunLock::acquire(&path, DEFAULT_STALE_AFTER).unwrap_err();
        assert!(matches!(err, RunnerError::RunInProgress(_)));

        drop(held);
        assert!(!path.exists());
        RunLock::acquire(&path, DEFAULT_STALE_AFTER).unwrap();
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".run.lock");
        let file = std::fs::File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(7 * 60 * 60))
            .unwrap();
        drop(file);

        let lock = RunLock::acquire(&path, DEFAULT_STALE_AFTER).unwrap();
        let content = std::fs::read_to_string(lock.path()).unwrap();
        assert!(content.starts_with(&format!("pid={}", std::process::id())));
    }

    fn age(path: &Path, by: Duration) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_replaced_holder_does_not_release_new_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".run.lock");

        let first = RunLock::acquire(&path, DEFAULT_STALE_AFTER).unwrap();
        age(&path, Duration::from_secs(7 * 60 * 60));
        let second = RunLock::acquire(&path, DEFAULT_STALE_AFTER).unwrap();

        drop(first);
        assert!(path.exists());
        let err = RunLock::acquire(&path, DEFAULT_STALE_AFTER).unwrap_err();
        assert!(matches!(err, RunnerError::RunInProgress(_)));

        drop(second);
        assert!(!path.exists());
    }
}
