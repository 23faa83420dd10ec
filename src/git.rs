use crate::errors::RunnerError;
use crate::publisher::Vcs;
use async_trait::async_trait;
use log::debug;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;

pub const DEFAULT_REMOTE: &str = "origin";

/// `git` command-line client bound to one working tree.
#[derive(Debug, Clone)]
pub struct Git {
    repo: PathBuf,
    remote: String,
    branch: Option<String>,
    author: Option<(String, String)>,
}

impl Git {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            remote: DEFAULT_REMOTE.to_string(),
            branch: None,
            author: None,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Push to this branch instead of the one checked out.
    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author = Some((name.into(), email.into()));
        self
    }

    async fn output(&self, args: &[OsString]) -> Result<Output, RunnerError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.repo);
        if let Some((name, email)) = &self.author {
            cmd.arg("-c")
                .arg(format!("user.name={}", name))
                .arg("-c")
                .arg(format!("user.email={}", email));
        }
        debug!("git {:?}", args);
        Ok(cmd.args(args).output().await?)
    }

    async fn run(&self, args: &[OsString]) -> Result<Output, RunnerError> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(vcs_error(args, &output));
        }
        Ok(output)
    }
}

#[async_trait]
impl Vcs for Git {
    async fn stage(&self, paths: &[PathBuf]) -> Result<(), RunnerError> {
        let mut args = os_args(&["add", "--"]);
        args.extend(paths.iter().map(|p| p.clone().into_os_string()));
        self.run(&args).await?;
        Ok(())
    }

    async fn has_staged_changes(&self, paths: &[PathBuf]) -> Result<bool, RunnerError> {
        let mut args = os_args(&["diff", "--cached", "--quiet", "--"]);
        args.extend(paths.iter().map(|p| p.clone().into_os_string()));
        let output = self.output(&args).await?;
        // --quiet exits 1 when there is a difference.
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(vcs_error(&args, &output)),
        }
    }

    async fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<(), RunnerError> {
        let mut args = os_args(&["commit", "-m", message, "--"]);
        args.extend(paths.iter().map(|p| p.clone().into_os_string()));
        self.run(&args).await?;
        Ok(())
    }

    async fn push(&self) -> Result<(), RunnerError> {
        let refspec = match &self.branch {
            Some(branch) => format!("HEAD:{}", branch),
            None => "HEAD".to_string(),
        };
        self.run(&os_args(&["push", &self.remote, &refspec])).await?;
        Ok(())
    }
}

fn os_args(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

fn vcs_error(args: &[OsString], output: &Output) -> RunnerError {
    RunnerError::VcsError {
        command: args
            .first()
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}
