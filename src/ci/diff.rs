use super::git::GitRepo;
use super::INTEGRATION_ROOT;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

/// Finds which integration directories changed between two revisions.
pub struct DiffService<G: GitRepo> {
    current_commit: String,
    base_dir: PathBuf,
    repo: G,
}

impl<G: GitRepo> DiffService<G> {
    pub fn new(current_commit: &str, base_dir: impl Into<PathBuf>, repo: G) -> Self {
        Self {
            current_commit: current_commit.to_string(),
            base_dir: base_dir.into(),
            repo,
        }
    }

    pub fn integration_root(&self) -> PathBuf {
        self.base_dir.join(INTEGRATION_ROOT)
    }

    /// Integration directories relative to the base dir, sorted.
    pub fn integrations(&self) -> Result<Vec<String>> {
        let mut integrations = Vec::new();
        for entry in std::fs::read_dir(self.integration_root())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let path = entry.path();
                let relative = path.strip_prefix(&self.base_dir).unwrap_or(&path);
                integrations.push(to_slash(relative));
            }
        }
        integrations.sort();
        Ok(integrations)
    }

    pub async fn changed_integrations(&self, last_commit: &str, is_parent: bool) -> Result<Vec<String>> {
        let integrations = self.integrations()?;
        tracing::info!("Found integrations {:?}", integrations);

        let mut changed = Vec::new();
        for integration in integrations {
            tracing::debug!("getting integration diff for {}", integration);
            let has_diffs = if is_parent {
                self.has_diffs_to_parent(last_commit, &integration).await?
            } else {
                self.has_diffs_to_previous_commit(last_commit, &integration).await?
            };
            if has_diffs {
                tracing::info!("found diffs in integration {}", integration);
                changed.push(integration);
            }
        }
        Ok(changed)
    }

    async fn has_diffs_to_parent(&self, parent_branch: &str, integration: &str) -> Result<bool> {
        let args = [
            "--numstat".to_string(),
            format!("origin/{}...{}", parent_branch, self.current_commit),
            "--".to_string(),
            integration.to_string(),
        ];
        let diff = self.repo.diff(&args).await?;
        tracing::debug!("got diff string: {}", diff);
        Ok(!diff.trim().is_empty())
    }

    async fn has_diffs_to_previous_commit(&self, last_commit: &str, integration: &str) -> Result<bool> {
        let args = [
            "--name-only".to_string(),
            last_commit.to_string(),
            self.current_commit.clone(),
            "--".to_string(),
            integration.to_string(),
        ];
        let diff = self.repo.diff(&args).await?;
        for file in diff.lines() {
            tracing::info!("{}", file);
        }
        Ok(!diff.trim().is_empty())
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
