use thiserror::Error as ThisError;
#[derive(ThisError, Debug)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),
    #[error("SqliteConnectionError: {0}")]
    SqliteConnectionError(#[from] rusqlite::Error),
    #[error("Manifest error: {0}")]
    ManifestError(#[from] serde_json::Error),
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("git {command} failed: {stderr}")]
    VcsError { command: String, stderr: String },
    #[error("Run already in progress (lock held at {0})")]
    RunInProgress(String),
    #[error("Scraper failed: {0}")]
    ScrapeFailed(String),
}
