use crate::errors::RunnerError;
use async_trait::async_trait;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_COMMIT_MESSAGE: &str = "Update car listings data";

/// The version-control operations the publisher needs.
#[async_trait]
pub trait Vcs: Send + Sync {
    async fn stage(&self, paths: &[PathBuf]) -> Result<(), RunnerError>;
    /// True when the index differs from HEAD for any of `paths`.
    async fn has_staged_changes(&self, paths: &[PathBuf]) -> Result<bool, RunnerError>;
    async fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<(), RunnerError>;
    async fn push(&self) -> Result<(), RunnerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Committed { pushed: bool, missing: Vec<PathBuf> },
    /// Artifacts are byte-identical to the last commit.
    NoChanges { missing: Vec<PathBuf> },
    /// None of the expected artifacts exist.
    NoArtifacts { missing: Vec<PathBuf> },
    /// Publishing was not attempted because the run failed.
    Skipped,
    /// Publishing is turned off for this deployment.
    Disabled,
}

impl PublishOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PublishOutcome::Committed { pushed: true, .. } => "committed",
            PublishOutcome::Committed { pushed: false, .. } => "committed-local",
            PublishOutcome::NoChanges { .. } => "no-changes",
            PublishOutcome::NoArtifacts { .. } => "no-artifacts",
            PublishOutcome::Skipped => "skipped",
            PublishOutcome::Disabled => "disabled",
        }
    }
}

/// Commits changed data artifacts, at most once per call.
pub struct ResultPublisher {
    root: PathBuf,
    vcs: Arc<dyn Vcs>,
    message: String,
    push: bool,
}

impl ResultPublisher {
    pub fn new(root: impl Into<PathBuf>, vcs: Arc<dyn Vcs>) -> Self {
        Self {
            root: root.into(),
            vcs,
            message: DEFAULT_COMMIT_MESSAGE.to_string(),
            push: true,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// `artifacts` are relative to the repository root.
    pub async fn publish(&self, artifacts: &[PathBuf]) -> Result<PublishOutcome, RunnerError> {
        let (present, missing) = partition_existing(&self.root, artifacts);
        for path in &missing {
            warn!("Expected artifact {} is missing", path.display());
        }
        if present.is_empty() {
            warn!("No data artifacts found, nothing to publish");
            return Ok(PublishOutcome::NoArtifacts { missing });
        }

        self.vcs.stage(&present).await?;
        if !self.vcs.has_staged_changes(&present).await? {
            info!("No changes to commit");
            return Ok(PublishOutcome::NoChanges { missing });
        }

        self.vcs.commit(&self.message, &present).await?;
        info!("Committed {} artifact(s): {}", present.len(), self.message);

        if self.push {
            self.vcs.push().await?;
            info!("Pushed data commit");
        }
        Ok(PublishOutcome::Committed {
            pushed: self.push,
            missing,
        })
    }
}

fn partition_existing(root: &Path, artifacts: &[PathBuf]) -> (Vec<PathBuf>, Vec<PathBuf>) {
    artifacts
        .iter()
        .cloned()
        .partition(|path| root.join(path).is_file())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Tracks committed content per path in memory.
    #[derive(Default)]
    pub struct MemoryVcs {
        pub root: PathBuf,
        pub committed: Mutex<HashMap<PathBuf, Vec<u8>>>,
        pub staged: Mutex<HashMap<PathBuf, Vec<u8>>>,
        pub commits: Mutex<Vec<String>>,
        pub pushes: Mutex<usize>,
        pub fail_push: bool,
    }

    impl MemoryVcs {
        pub fn new(root: &Path) -> Self {
            Self {
                root: root.to_path_buf(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Vcs for MemoryVcs {
        async fn stage(&self, paths: &[PathBuf]) -> Result<(), RunnerError> {
            let mut staged = self.staged.lock().unwrap();
            for path in paths {
                staged.insert(path.clone(), std::fs::read(self.root.join(path))?);
            }
            Ok(())
        }

        async fn has_staged_changes(&self, paths: &[PathBuf]) -> Result<bool, RunnerError> {
            let staged = self.staged.lock().unwrap();
            let committed = self.committed.lock().unwrap();
            Ok(paths
                .iter()
                .any(|path| staged.get(path) != committed.get(path)))
        }

        async fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<(), RunnerError> {
            let staged = self.staged.lock().unwrap();
            let mut committed = self.committed.lock().unwrap();
            for path in paths {
                if let Some(bytes) = staged.get(path) {
                    committed.insert(path.clone(), bytes.clone());
                }
            }
            self.commits.lock().unwrap().push(message.to_string());
            Ok(())
        }

        async fn push(&self) -> Result<(), RunnerError> {
            if self.fail_push {
                return Err(RunnerError::VcsError {
                    command: "push".to_string(),
                    stderr: "rejected".to_string(),
                });
            }
            *self.pushes.lock().unwrap() += 1;
            Ok(())
        }
    }

    pub fn write_artifacts(root: &Path, csv: &str, db: &[u8]) -> Vec<PathBuf> {
        std::fs::create_dir_all(root.join("data")).unwrap();
        std::fs::write(root.join("data/turbo_az_listings.csv"), csv).unwrap();
        std::fs::write(root.join("data/cars.db"), db).unwrap();
        vec![
            PathBuf::from("data/turbo_az_listings.csv"),
            PathBuf::from("data/cars.db"),
        ]
    }

    #[tokio::test]
    async fn test_changed_content_commits_and_pushes_once() {
        let tmp = tempfile::tempdir().unwrap();
        let vcs = Arc::new(MemoryVcs::new(tmp.path()));
        let publisher = ResultPublisher::new(tmp.path(), vcs.clone());

        let artifacts = write_artifacts(tmp.path(), "listing_id\n1\n", b"db-v1");
        let outcome = publisher.publish(&artifacts).await.unwrap();

        assert_eq!(
            outcome,
            PublishOutcome::Committed {
                pushed: true,
                missing: vec![]
            }
        );
        assert_eq!(*vcs.commits.lock().unwrap(), vec![DEFAULT_COMMIT_MESSAGE]);
        assert_eq!(*vcs.pushes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_identical_content_is_no_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let vcs = Arc::new(MemoryVcs::new(tmp.path()));
        let publisher = ResultPublisher::new(tmp.path(), vcs.clone());

        let artifacts = write_artifacts(tmp.path(), "listing_id\n1\n", b"db-v1");
        publisher.publish(&artifacts).await.unwrap();

        write_artifacts(tmp.path(), "listing_id\n1\n", b"db-v1");
        let outcome = publisher.publish(&artifacts).await.unwrap();

        assert_eq!(outcome, PublishOutcome::NoChanges { missing: vec![] });
        assert_eq!(vcs.commits.lock().unwrap().len(), 1);
        assert_eq!(*vcs.pushes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_artifacts_are_distinguished() {
        let tmp = tempfile::tempdir().unwrap();
        let vcs = Arc::new(MemoryVcs::new(tmp.path()));
        let publisher = ResultPublisher::new(tmp.path(), vcs.clone());

        let artifacts = vec![
            PathBuf::from("data/turbo_az_listings.csv"),
            PathBuf::from("data/cars.db"),
        ];
        let outcome = publisher.publish(&artifacts).await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::NoArtifacts {
                missing: artifacts.clone()
            }
        );
        assert_eq!(outcome.label(), "no-artifacts");
        assert!(vcs.commits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_artifacts_are_still_committed() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("data")).unwrap();
        std::fs::write(tmp.path().join("data/turbo_az_listings.csv"), "a\n").unwrap();
        let vcs = Arc::new(MemoryVcs::new(tmp.path()));
        let publisher = ResultPublisher::new(tmp.path(), vcs.clone()).with_push(false);

        let outcome = publisher
            .publish(&[
                PathBuf::from("data/turbo_az_listings.csv"),
                PathBuf::from("data/cars.db"),
            ])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PublishOutcome::Committed {
                pushed: false,
                missing: vec![PathBuf::from("data/cars.db")]
            }
        );
        assert_eq!(*vcs.pushes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_push_failure_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let vcs = Arc::new(MemoryVcs {
            fail_push: true,
            ..MemoryVcs::new(tmp.path())
        });
        let publisher = ResultPublisher::new(tmp.path(), vcs).with_message("data refresh");

        let artifacts = write_artifacts(tmp.path(), "x\n", b"y");
        let err = publisher.publish(&artifacts).await.unwrap_err();
        assert!(matches!(err, RunnerError::VcsError { .. }));
    }
}
