use crate::errors::RunnerError;
use std::path::{Path, PathBuf};

pub const LOGS_DIR: &str = "logs";
pub const DATA_DIR: &str = "data";
pub const BUNDLE_DIR: &str = "artifacts";

/// Default data artifacts written by the scraper, relative to the workspace root.
pub const DEFAULT_ARTIFACTS: [&str; 2] = ["data/turbo_az_listings.csv", "data/cars.db"];

/// The directories a run reads and writes. Passed explicitly to every
/// component instead of being derived from the process's current directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    logs_dir: PathBuf,
    data_dir: PathBuf,
    bundle_dir: PathBuf,
    artifacts: Vec<PathBuf>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            logs_dir: root.join(LOGS_DIR),
            data_dir: root.join(DATA_DIR),
            bundle_dir: root.join(BUNDLE_DIR),
            artifacts: DEFAULT_ARTIFACTS.iter().map(PathBuf::from).collect(),
            root,
        }
    }

    /// Use `explicit` if given, otherwise the directory holding the running
    /// executable.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self, RunnerError> {
        let root = match explicit {
            Some(root) => root,
            None => {
                let exe = std::env::current_exe()?.canonicalize()?;
                exe.parent()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| {
                        RunnerError::ConfigError(format!(
                            "executable {} has no parent directory",
                            exe.display()
                        ))
                    })?
            }
        };
        Ok(Self::new(root))
    }

    pub fn with_artifacts<I, P>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.artifacts = artifacts.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    /// Artifact paths relative to the root, as handed to version control.
    pub fn data_artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    pub fn ensure_logs_dir(&self) -> Result<(), RunnerError> {
        std::fs::create_dir_all(&self.logs_dir)?;
        Ok(())
    }

    pub fn lock_path(&self) -> PathBuf {
        self.logs_dir.join(".run.lock")
    }

    pub fn history_path(&self) -> PathBuf {
        self.logs_dir.join("runs.db")
    }
}
