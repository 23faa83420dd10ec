use crate::errors::RunnerError;
use crate::git::DEFAULT_REMOTE;
use crate::lock::DEFAULT_STALE_AFTER;
use crate::publisher::DEFAULT_COMMIT_MESSAGE;
use crate::retention::DEFAULT_RETENTION_DAYS;
use crate::run_wrapper::ExitPolicy;
use crate::scheduler::DEFAULT_SCHEDULE;
use crate::scraper_process::DEFAULT_SCRAPER_COMMAND;
use crate::workspace::DEFAULT_ARTIFACTS;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const PREFIX: &str = "TURBO_RUNNER_";

/// Runner configuration loaded from `TURBO_RUNNER_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub root: Option<PathBuf>,
    pub scraper_command: String,
    pub scraper_timeout: Option<Duration>,
    pub schedule: String,
    pub retention_days: u64,
    pub exit_policy: ExitPolicy,
    pub commit_message: String,
    pub git_remote: String,
    pub git_branch: Option<String>,
    pub git_author: Option<(String, String)>,
    pub publish: bool,
    pub push: bool,
    pub artifacts: Vec<PathBuf>,
    pub lock_stale_after: Duration,
    pub bundles: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: None,
            scraper_command: DEFAULT_SCRAPER_COMMAND.to_string(),
            scraper_timeout: None,
            schedule: DEFAULT_SCHEDULE.to_string(),
            retention_days: DEFAULT_RETENTION_DAYS,
            exit_policy: ExitPolicy::default(),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            git_remote: DEFAULT_REMOTE.to_string(),
            git_branch: None,
            git_author: None,
            publish: true,
            push: true,
            artifacts: DEFAULT_ARTIFACTS.iter().map(PathBuf::from).collect(),
            lock_stale_after: DEFAULT_STALE_AFTER,
            bundles: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, RunnerError> {
        // Load .env file if present
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// `lookup` receives the unprefixed key, e.g. `SCHEDULE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RunnerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(&format!("{}{}", PREFIX, key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        config.root = get("ROOT").map(PathBuf::from);
        if let Some(cmd) = get("SCRAPER_CMD") {
            config.scraper_command = cmd;
        }
        config.scraper_timeout = get("SCRAPER_TIMEOUT_SECS")
            .map(|v| parse::<u64>("SCRAPER_TIMEOUT_SECS", &v))
            .transpose()?
            .map(Duration::from_secs);
        if let Some(schedule) = get("SCHEDULE") {
            config.schedule = schedule;
        }
        if let Some(days) = get("RETENTION_DAYS") {
            config.retention_days = parse("RETENTION_DAYS", &days)?;
        }
        if let Some(policy) = get("EXIT_POLICY") {
            config.exit_policy = policy.parse()?;
        }
        if let Some(message) = get("COMMIT_MESSAGE") {
            config.commit_message = message;
        }
        if let Some(remote) = get("GIT_REMOTE") {
            config.git_remote = remote;
        }
        config.git_branch = get("GIT_BRANCH");
        config.git_author = match (get("GIT_AUTHOR_NAME"), get("GIT_AUTHOR_EMAIL")) {
            (Some(name), Some(email)) => Some((name, email)),
            (None, None) => None,
            _ => {
                return Err(RunnerError::ConfigError(format!(
                    "{p}GIT_AUTHOR_NAME and {p}GIT_AUTHOR_EMAIL must be set together",
                    p = PREFIX
                )))
            }
        };
        if let Some(publish) = get("PUBLISH") {
            config.publish = parse_bool("PUBLISH", &publish)?;
        }
        if let Some(push) = get("PUSH") {
            config.push = parse_bool("PUSH", &push)?;
        }
        if let Some(artifacts) = get("ARTIFACTS") {
            config.artifacts = artifacts
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(secs) = get("LOCK_STALE_SECS") {
            config.lock_stale_after = Duration::from_secs(parse("LOCK_STALE_SECS", &secs)?);
        }
        if let Some(bundles) = get("BUNDLES") {
            config.bundles = parse_bool("BUNDLES", &bundles)?;
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, RunnerError> {
    value.parse().map_err(|_| {
        RunnerError::ConfigError(format!("{}{} must be a valid number, got '{}'", PREFIX, key, value))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, RunnerError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RunnerError::ConfigError(format!(
            "{}{} must be true or false, got '{}'",
            PREFIX, key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, RunnerError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("TURBO_RUNNER_{}", k), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.scraper_command, "python main.py");
        assert_eq!(config.schedule, "*/5 * * * *");
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.exit_policy, ExitPolicy::Propagate);
        assert_eq!(config.git_remote, "origin");
        assert!(config.publish);
        assert!(config.push);
        assert!(config.scraper_timeout.is_none());
        assert_eq!(config.artifacts.len(), 2);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("ROOT", "/srv/turbo"),
            ("SCRAPER_TIMEOUT_SECS", "900"),
            ("EXIT_POLICY", "ignore"),
            ("PUBLISH", "no"),
            ("PUSH", "false"),
            ("ARTIFACTS", "data/a.csv, data/b.db,"),
            ("GIT_AUTHOR_NAME", "github-actions"),
            ("GIT_AUTHOR_EMAIL", "actions@github.com"),
            ("RETENTION_DAYS", "7"),
        ])
        .unwrap();

        assert_eq!(config.root, Some(PathBuf::from("/srv/turbo")));
        assert_eq!(config.scraper_timeout, Some(Duration::from_secs(900)));
        assert_eq!(config.exit_policy, ExitPolicy::Ignore);
        assert!(!config.publish);
        assert!(!config.push);
        assert_eq!(
            config.artifacts,
            vec![PathBuf::from("data/a.csv"), PathBuf::from("data/b.db")]
        );
        assert_eq!(
            config.git_author,
            Some(("github-actions".to_string(), "actions@github.com".to_string()))
        );
        assert_eq!(config.retention_days, 7);
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("RETENTION_DAYS", "thirty")]).is_err());
        assert!(load(&[("PUSH", "sometimes")]).is_err());
        assert!(load(&[("GIT_AUTHOR_NAME", "bot")]).is_err());
        assert!(load(&[("EXIT_POLICY", "retry")]).is_err());
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = load(&[("SCRAPER_CMD", "   "), ("SCHEDULE", "")]).unwrap();
        assert_eq!(config.scraper_command, "python main.py");
        assert_eq!(config.schedule, "*/5 * * * *");
    }
}
