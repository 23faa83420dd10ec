use chrono::Local;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use turbo_runner::config::Config;
use turbo_runner::errors::RunnerError;
use turbo_runner::history::HistoryStore;
use turbo_runner::lock::RunLock;
use turbo_runner::retention::{self, RetentionPolicy};
use turbo_runner::run_wrapper::ExitPolicy;
use turbo_runner::scheduler::{self, Cadence, Orchestrator};

#[derive(Parser, Debug)]
#[clap(
    name = "turbo-runner",
    about = "Runs the turbo.az scraper on a schedule, keeps its logs and publishes changed data."
)]
struct Cli {
    /// Workspace root (defaults to TURBO_RUNNER_ROOT, then the binary's directory)
    #[clap(long, global = true)]
    root: Option<PathBuf>,

    /// Scraper command line
    #[clap(long, global = true)]
    scraper: Option<String>,

    /// `propagate` or `ignore` a failing scraper exit status
    #[clap(long, global = true)]
    exit_policy: Option<String>,

    /// Commit without pushing
    #[clap(long, global = true)]
    no_push: bool,

    /// Run the scraper and keep its logs, but leave version control alone
    #[clap(long, global = true)]
    no_publish: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scraper once and publish its results
    Run,
    /// Trigger runs on a cron cadence until interrupted
    Schedule {
        /// Cron expression, crontab or seconds-first form
        #[clap(long)]
        cadence: Option<String>,
    },
    /// Delete expired run logs
    Prune,
    /// Commit and push changed data artifacts without scraping
    Publish,
    /// Show recent runs
    History {
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the crontab line for the container image
    Crontab {
        #[clap(long, default_value = "/app/turbo-runner")]
        binary: PathBuf,
        #[clap(long, default_value = "/var/log/cron.log")]
        log: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), RunnerError> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if cli.root.is_some() {
        config.root = cli.root.clone();
    }
    if let Some(scraper) = &cli.scraper {
        config.scraper_command = scraper.clone();
    }
    if let Some(policy) = &cli.exit_policy {
        config.exit_policy = policy.parse::<ExitPolicy>()?;
    }
    if cli.no_push {
        config.push = false;
    }
    if cli.no_publish {
        config.publish = false;
    }

    match cli.command {
        Command::Run => {
            let orchestrator = Orchestrator::from_config(&config)?;
            let report = orchestrator.trigger().await?;
            report.log_summary();
            report.check()?;
        }
        Command::Schedule { cadence } => {
            let cadence = Cadence::parse(cadence.as_deref().unwrap_or(&config.schedule))?;
            let orchestrator = Arc::new(Orchestrator::from_config(&config)?);
            scheduler::run_scheduled(orchestrator, &cadence).await?;
        }
        Command::Prune => {
            let orchestrator = Orchestrator::from_config(&config)?;
            let report = retention::sweep(
                orchestrator.workspace().logs_dir(),
                RetentionPolicy::days(config.retention_days),
                Local::now(),
            )?;
            info!(
                "Removed {} expired log(s), kept {}",
                report.deleted.len(),
                report.kept
            );
        }
        Command::Publish => {
            let orchestrator = Orchestrator::from_config(&config)?;
            let workspace = orchestrator.workspace();
            let _lock = RunLock::acquire(&workspace.lock_path(), config.lock_stale_after)?;
            let outcome = orchestrator
                .publisher()
                .publish(workspace.data_artifacts())
                .await?;
            info!("Publish finished: {}", outcome.label());
        }
        Command::History { limit } => {
            let orchestrator = Orchestrator::from_config(&config)?;
            orchestrator.workspace().ensure_logs_dir()?;
            let store = HistoryStore::open(&orchestrator.workspace().history_path())?;
            store.pretty_print(limit)?;
        }
        Command::Crontab { binary, log } => {
            let cadence = Cadence::parse(&config.schedule)?;
            println!("{}", scheduler::crontab_entry(&cadence, &binary, &log)?);
        }
    }

    Ok(())
}
