use crate::errors::RunnerError;
use crate::run_log::{ExitStatus, LogFile};
use async_trait::async_trait;
use log::{error, info, warn};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

pub const DEFAULT_SCRAPER_COMMAND: &str = "python main.py";

/// The external program that fetches listings and writes the data artifacts.
#[async_trait]
pub trait ScraperProcess: Send + Sync {
    /// Run once in `workdir` with both output streams appended to `log`.
    /// Errors are reserved for failures to write the log itself; anything
    /// the scraper does wrong is reported through the returned status.
    async fn run(&self, workdir: &Path, log: &mut LogFile) -> Result<ExitStatus, RunnerError>;
}

/// Runs the scraper as a child process.
#[derive(Debug, Clone)]
pub struct CommandScraper {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl CommandScraper {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            timeout: None,
        }
    }

    /// Split a whitespace-separated command line into program and arguments.
    /// Quotes are not interpreted, so an argument cannot contain spaces; use
    /// [`CommandScraper::arg`] for those, or point the command at a script.
    pub fn from_command_line(line: &str) -> Result<Self, RunnerError> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| RunnerError::ConfigError("scraper command is empty".to_string()))?;
        Ok(Self::new(program).args(parts))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Kill the scraper if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl ScraperProcess for CommandScraper {
    async fn run(&self, workdir: &Path, log: &mut LogFile) -> Result<ExitStatus, RunnerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(log.stdio()?)
            .stderr(log.stdio()?)
            .kill_on_drop(true);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }

        info!("Starting scraper: {}", self.command_line());
        let start_time = Instant::now();

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start {}: {}", self.command_line(), e);
                log.line(&format!("Failed to start {}: {}", self.command_line(), e))?;
                return Ok(ExitStatus::SpawnFailed(e.to_string()));
            }
        };

        let status = match self.timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(waited) => ExitStatus::from(waited?),
                    Err(_) => {
                        warn!("Scraper exceeded {:?}, killing it", limit);
                        child.kill().await?;
                        log.line(&format!("Scraper killed after exceeding {:?}", limit))?;
                        ExitStatus::TimedOut
                    }
                }
            }
            None => ExitStatus::from(child.wait().await?),
        };

        if status.success() {
            info!("Scraper finished after {:?}", start_time.elapsed());
        } else {
            warn!(
                "Scraper ended with status {} after {:?}",
                status,
                start_time.elapsed()
            );
        }
        Ok(status)
    }
}
