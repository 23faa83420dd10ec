use crate::bundle::{self, BundleManifest, DATA_BUNDLE, LOGS_BUNDLE};
use crate::config::Config;
use crate::errors::RunnerError;
use crate::git::Git;
use crate::history::HistoryStore;
use crate::lock::{RunLock, DEFAULT_STALE_AFTER};
use crate::publisher::{PublishOutcome, ResultPublisher};
use crate::retention::RetentionPolicy;
use crate::run_log::SystemClock;
use crate::run_wrapper::{ExitPolicy, RunOutcome, RunWrapper};
use crate::scraper_process::CommandScraper;
use crate::workspace::Workspace;
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Every five minutes, crontab form.
pub const DEFAULT_SCHEDULE: &str = "*/5 * * * *";

/// A cron cadence. Accepts the five-field crontab form or the six/seven
/// field form with a leading seconds column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cadence {
    fields: Vec<String>,
}

impl Cadence {
    pub fn parse(expression: &str) -> Result<Self, RunnerError> {
        let fields: Vec<String> = expression.split_whitespace().map(String::from).collect();
        match fields.len() {
            5..=7 => Ok(Self { fields }),
            n => Err(RunnerError::ConfigError(format!(
                "cron expression '{}' has {} fields, expected 5 to 7",
                expression.trim(),
                n
            ))),
        }
    }

    /// Seconds-first form used by the in-process scheduler.
    pub fn scheduler_expression(&self) -> String {
        if self.fields.len() == 5 {
            format!("0 {}", self.fields.join(" "))
        } else {
            self.fields.join(" ")
        }
    }

    /// Five-field form for a system crontab, if the cadence fits one.
    pub fn crontab_expression(&self) -> Option<String> {
        match self.fields.len() {
            5 => Some(self.fields.join(" ")),
            6 if self.fields[0] == "0" => Some(self.fields[1..].join(" ")),
            _ => None,
        }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            fields: DEFAULT_SCHEDULE.split_whitespace().map(String::from).collect(),
        }
    }
}

/// The line the container image installs into its crontab. The image has
/// no repository to commit to, so the entry runs the wrapper only.
pub fn crontab_entry(cadence: &Cadence, binary: &Path, log: &Path) -> Result<String, RunnerError> {
    let schedule = cadence.crontab_expression().ok_or_else(|| {
        RunnerError::ConfigError(format!(
            "'{}' cannot be expressed as a crontab schedule",
            cadence.scheduler_expression()
        ))
    })?;
    Ok(format!(
        "{} {} run --no-publish >> {} 2>&1",
        schedule,
        binary.display(),
        log.display()
    ))
}

#[derive(Debug)]
pub struct TriggerReport {
    pub outcome: RunOutcome,
    pub publish: PublishOutcome,
    pub bundles: Vec<BundleManifest>,
    pub exit_policy: ExitPolicy,
}

impl TriggerReport {
    /// Err when the scrape failed and the policy says failures count.
    pub fn check(&self) -> Result<(), RunnerError> {
        if self.outcome.accepted(self.exit_policy) {
            Ok(())
        } else {
            Err(RunnerError::ScrapeFailed(format!(
                "exit status {}, see {}",
                self.outcome.record.exit_status(),
                self.outcome.record.log_path().display()
            )))
        }
    }

    pub fn log_summary(&self) {
        info!(
            "Run complete: status={} publish={} log={}",
            self.outcome.record.exit_status(),
            self.publish.label(),
            self.outcome.record.log_path().display()
        );
    }
}

/// Wires one trigger through the wrapper and the publisher.
pub struct Orchestrator {
    wrapper: RunWrapper,
    publisher: ResultPublisher,
    exit_policy: ExitPolicy,
    lock_stale_after: Duration,
    publish: bool,
    bundles: bool,
}

impl Orchestrator {
    pub fn new(wrapper: RunWrapper, publisher: ResultPublisher) -> Self {
        Self {
            wrapper,
            publisher,
            exit_policy: ExitPolicy::default(),
            lock_stale_after: DEFAULT_STALE_AFTER,
            publish: true,
            bundles: true,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, RunnerError> {
        let workspace =
            Workspace::resolve(config.root.clone())?.with_artifacts(config.artifacts.clone());
        let scraper = CommandScraper::from_command_line(&config.scraper_command)?
            .with_timeout(config.scraper_timeout);

        let mut git = Git::new(workspace.root())
            .with_remote(config.git_remote.clone())
            .with_branch(config.git_branch.clone());
        if let Some((name, email)) = &config.git_author {
            git = git.with_author(name.clone(), email.clone());
        }
        let publisher = ResultPublisher::new(workspace.root(), Arc::new(git))
            .with_message(config.commit_message.clone())
            .with_push(config.push);

        let wrapper = RunWrapper::new(
            workspace,
            Arc::new(scraper),
            Arc::new(SystemClock),
            RetentionPolicy::days(config.retention_days),
        );

        Ok(Self::new(wrapper, publisher)
            .with_exit_policy(config.exit_policy)
            .with_lock_stale_after(config.lock_stale_after)
            .with_publish(config.publish)
            .with_bundles(config.bundles))
    }

    pub fn with_exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.exit_policy = policy;
        self
    }

    pub fn with_lock_stale_after(mut self, stale_after: Duration) -> Self {
        self.lock_stale_after = stale_after;
        self
    }

    pub fn with_bundles(mut self, bundles: bool) -> Self {
        self.bundles = bundles;
        self
    }

    /// With publishing off, a trigger runs the wrapper and exports bundles
    /// but never touches version control.
    pub fn with_publish(mut self, publish: bool) -> Self {
        self.publish = publish;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        self.wrapper.workspace()
    }

    pub fn publisher(&self) -> &ResultPublisher {
        &self.publisher
    }

    /// One scrape attempt. The run lock is held for the whole trigger, so
    /// wrapper and publisher never overlap with another trigger. Once the
    /// wrapper has finished, history and bundles are written even when
    /// publishing fails; the publish error is returned afterwards.
    pub async fn trigger(&self) -> Result<TriggerReport, RunnerError> {
        let workspace = self.wrapper.workspace();
        let _lock = RunLock::acquire(&workspace.lock_path(), self.lock_stale_after)?;

        let outcome = self.wrapper.run().await?;

        let published = if !self.publish {
            info!("Publishing disabled, leaving data uncommitted");
            Ok(PublishOutcome::Disabled)
        } else if outcome.accepted(self.exit_policy) {
            self.publisher.publish(workspace.data_artifacts()).await
        } else {
            warn!("Skipping publish, scraper exited with {}", outcome.record.exit_status());
            Ok(PublishOutcome::Skipped)
        };
        let label = match &published {
            Ok(publish) => publish.label(),
            Err(_) => "error",
        };
        self.record_history(&outcome, label);

        let bundles = self.export_bundles();
        if let Err(e) = &bundles {
            error!("Could not export bundles: {}", e);
        }
        let publish = published.map_err(|e| {
            error!("Publishing failed: {}", e);
            e
        })?;

        Ok(TriggerReport {
            outcome,
            publish,
            bundles: bundles?,
            exit_policy: self.exit_policy,
        })
    }

    fn export_bundles(&self) -> Result<Vec<BundleManifest>, RunnerError> {
        if !self.bundles {
            return Ok(Vec::new());
        }
        let workspace = self.workspace();
        Ok(vec![
            bundle::export_bundle(LOGS_BUNDLE, workspace.logs_dir(), workspace.bundle_dir())?,
            bundle::export_bundle(DATA_BUNDLE, workspace.data_dir(), workspace.bundle_dir())?,
        ])
    }

    fn record_history(&self, outcome: &RunOutcome, publish: &str) {
        let recorded = HistoryStore::open(&self.workspace().history_path())
            .and_then(|store| store.record(&outcome.record, publish));
        if let Err(e) = recorded {
            warn!("Could not record run history: {}", e);
        }
    }
}

/// Trigger on `cadence` until Ctrl-C. A tick that lands while a run is still
/// going is skipped.
pub async fn run_scheduled(
    orchestrator: Arc<Orchestrator>,
    cadence: &Cadence,
) -> Result<(), RunnerError> {
    let mut scheduler = JobScheduler::new().await?;
    let expression = cadence.scheduler_expression();

    let job = Job::new_async(expression.as_str(), move |_uuid, _scheduler| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            match orchestrator.trigger().await {
                Ok(report) => {
                    report.log_summary();
                    if let Err(e) = report.check() {
                        error!("{}", e);
                    }
                }
                Err(RunnerError::RunInProgress(lock)) => {
                    warn!("Previous run still in progress ({}), skipping", lock)
                }
                Err(e) => error!("Scheduled run failed: {}", e),
            }
        })
    })?;
    scheduler.add(job).await?;
    scheduler.start().await?;
    info!("Scheduler started with cadence '{}'", expression);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down scheduler");
    scheduler.shutdown().await?;
    Ok(())
}
