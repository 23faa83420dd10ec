use crate::errors::RunnerError;
use crate::retention::{self, RetentionPolicy, SweepReport};
use crate::run_log::{Clock, LogFile, RunRecord};
use crate::scraper_process::ScraperProcess;
use crate::workspace::Workspace;
use log::{info, warn};
use std::sync::Arc;

/// What to do with a scrape that exits unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Report the run as failed and skip publishing.
    #[default]
    Propagate,
    /// Treat every completed run as a success.
    Ignore,
}

impl std::str::FromStr for ExitPolicy {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "propagate" => Ok(ExitPolicy::Propagate),
            "ignore" => Ok(ExitPolicy::Ignore),
            other => Err(RunnerError::ConfigError(format!(
                "unknown exit policy '{}', expected 'propagate' or 'ignore'",
                other
            ))),
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub record: RunRecord,
    pub sweep: SweepReport,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.record.exit_status().success()
    }

    /// Whether the caller should continue to publishing under `policy`.
    pub fn accepted(&self, policy: ExitPolicy) -> bool {
        policy == ExitPolicy::Ignore || self.succeeded()
    }
}

/// Bounds one execution of the scraper with a timestamped log.
pub struct RunWrapper {
    workspace: Workspace,
    scraper: Arc<dyn ScraperProcess>,
    clock: Arc<dyn Clock>,
    retention: RetentionPolicy,
}

impl RunWrapper {
    pub fn new(
        workspace: Workspace,
        scraper: Arc<dyn ScraperProcess>,
        clock: Arc<dyn Clock>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            workspace,
            scraper,
            clock,
            retention,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Run the scraper once. The Finished marker is written whatever the
    /// scraper's exit status; the status is returned in the record.
    pub async fn run(&self) -> Result<RunOutcome, RunnerError> {
        self.workspace.ensure_logs_dir()?;

        let start_time = self.clock.now();
        let mut log = LogFile::open(self.workspace.logs_dir(), start_time)?;
        let started = RunRecord::started(start_time, log.path());
        info!("Run started, logging to {}", log.path().display());

        log.mark_start(start_time)?;
        let status = self.scraper.run(self.workspace.root(), &mut log).await?;
        let end_time = self.clock.now();
        log.note_exit(&status)?;
        log.mark_finish(end_time)?;
        drop(log);

        let record = started.finish(end_time, status);
        if !record.exit_status().success() {
            warn!("Scraper run failed: {}", record.exit_status());
        }

        // The run is already recorded; a failed sweep only costs disk space.
        let sweep = match retention::sweep(self.workspace.logs_dir(), self.retention, end_time) {
            Ok(sweep) => sweep,
            Err(e) => {
                warn!("Log retention sweep failed: {}", e);
                SweepReport::default()
            }
        };

        info!("Run finished with status {}", record.exit_status());
        Ok(RunOutcome { record, sweep })
    }
}
