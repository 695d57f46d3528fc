use crate::utils::error::{IntegrationError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

/// The git operations the trigger needs from the checked-out repository.
#[async_trait]
pub trait GitRepo: Send + Sync {
    async fn commit_exists(&self, rev: &str) -> Result<bool>;

    /// Runs `git diff` with `args` and returns its stdout.
    async fn diff(&self, args: &[String]) -> Result<String>;
}

#[async_trait]
impl<T: GitRepo + ?Sized> GitRepo for &T {
    async fn commit_exists(&self, rev: &str) -> Result<bool> {
        (**self).commit_exists(rev).await
    }

    async fn diff(&self, args: &[String]) -> Result<String> {
        (**self).diff(args).await
    }
}

/// Shells out to the `git` binary inside `work_dir`.
#[derive(Debug, Clone)]
pub struct CommandGit {
    work_dir: PathBuf,
}

impl CommandGit {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    async fn git(&self, args: &[String]) -> Result<std::process::Output> {
        tracing::debug!("git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(&self.work_dir)
            .output()
            .await
            .map_err(|e| IntegrationError::GitError {
                message: format!("cannot run git in {}: {}", self.work_dir.display(), e),
            })
    }
}

#[async_trait]
impl GitRepo for CommandGit {
    async fn commit_exists(&self, rev: &str) -> Result<bool> {
        let args = vec![
            "cat-file".to_string(),
            "-e".to_string(),
            format!("{}^{{commit}}", rev),
        ];
        Ok(self.git(&args).await?.status.success())
    }

    async fn diff(&self, args: &[String]) -> Result<String> {
        let mut full = vec!["diff".to_string()];
        full.extend_from_slice(args);

        let output = self.git(&full).await?;
        if !output.status.success() {
            return Err(IntegrationError::GitError {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
