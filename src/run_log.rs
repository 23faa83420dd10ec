use crate::errors::RunnerError;
use chrono::{DateTime, Local};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

pub const LOG_PREFIX: &str = "scraper_";
pub const LOG_EXTENSION: &str = "log";
/// Matches file names produced by [`log_file_name`] and nothing else.
pub const LOG_NAME_PATTERN: &str = r"^scraper_\d{8}_\d{6}\.log$";

const MARKER_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// `scraper_YYYYMMDD_HHMMSS.log`. Second resolution: two runs inside the
/// same second share a file.
pub fn log_file_name(at: DateTime<Local>) -> String {
    format!(
        "{}{}.{}",
        LOG_PREFIX,
        at.format("%Y%m%d_%H%M%S"),
        LOG_EXTENSION
    )
}

pub fn format_marker_time(at: DateTime<Local>) -> String {
    at.format(MARKER_FORMAT).to_string()
}

/// Append-only log for a single run.
pub struct LogFile {
    path: PathBuf,
    file: File,
}

impl LogFile {
    /// Opens (or creates) the log for `at`. Existing content is kept.
    pub fn open(logs_dir: &Path, at: DateTime<Local>) -> Result<Self, RunnerError> {
        let path = logs_dir.join(log_file_name(at));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mark_start(&mut self, at: DateTime<Local>) -> Result<(), RunnerError> {
        self.line(&format!("Starting scraper at {}", format_marker_time(at)))
    }

    pub fn mark_finish(&mut self, at: DateTime<Local>) -> Result<(), RunnerError> {
        self.line(&format!("Finished scraper at {}", format_marker_time(at)))
    }

    pub fn note_exit(&mut self, status: &ExitStatus) -> Result<(), RunnerError> {
        self.line(&format!("Scraper exit status: {}", status))
    }

    pub fn line(&mut self, text: &str) -> Result<(), RunnerError> {
        writeln!(self.file, "{}", text)?;
        self.file.flush()?;
        Ok(())
    }

    /// A second handle on the same file, for a child's stdout or stderr.
    pub fn stdio(&self) -> Result<Stdio, RunnerError> {
        Ok(Stdio::from(self.file.try_clone()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failed(i32),
    Signalled,
    TimedOut,
    SpawnFailed(String),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    /// Numeric code for storage; -1 when the process produced none.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failed(code) => *code,
            _ => -1,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(0) => ExitStatus::Success,
            Some(code) => ExitStatus::Failed(code),
            None => ExitStatus::Signalled,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Success => write!(f, "0"),
            ExitStatus::Failed(code) => write!(f, "{}", code),
            ExitStatus::Signalled => write!(f, "terminated by signal"),
            ExitStatus::TimedOut => write!(f, "timed out"),
            ExitStatus::SpawnFailed(msg) => write!(f, "failed to start ({})", msg),
        }
    }
}

/// A run that has started but not finished.
#[derive(Debug)]
pub struct StartedRun {
    start_time: DateTime<Local>,
    log_path: PathBuf,
}

impl StartedRun {
    pub fn finish(self, end_time: DateTime<Local>, exit_status: ExitStatus) -> RunRecord {
        RunRecord {
            start_time: self.start_time,
            end_time,
            log_path: self.log_path,
            exit_status,
        }
    }
}

/// One finalized execution. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    start_time: DateTime<Local>,
    end_time: DateTime<Local>,
    log_path: PathBuf,
    exit_status: ExitStatus,
}

impl RunRecord {
    pub fn started(start_time: DateTime<Local>, log_path: impl Into<PathBuf>) -> StartedRun {
        StartedRun {
            start_time,
            log_path: log_path.into(),
        }
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Local> {
        self.end_time
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn exit_status(&self) -> &ExitStatus {
        &self.exit_status
    }
}
