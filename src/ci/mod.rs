//! Deploy trigger: works out which integrations changed since the last
//! successful deploy and runs one CircleCI pipeline per integration.

pub mod diff;
pub mod git;
pub mod trigger;
pub mod updater;
pub mod workflow;

use crate::clients::circleci::ProjectInfo;
use crate::clients::CircleCiClient;
use crate::config::env;
use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, Validate};
use diff::DiffService;
use git::{CommandGit, GitRepo};
use std::path::PathBuf;
use std::time::Duration;
use trigger::TriggerService;

pub const INTEGRATION_ROOT: &str = "integrations";
pub const DEFAULT_BASE_DIR: &str = "/project";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CiSettings {
    pub token: String,
    pub project: ProjectInfo,
    pub current_commit: String,
    pub current_branch: String,
    pub base_dir: PathBuf,
    pub poll_interval: Duration,
}

/// Expands a leading `~` the way CircleCI writes its working directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => PathBuf::from(format!("{}{}", home, rest)),
        _ => PathBuf::from(path),
    }
}

impl CiSettings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            token: env::required("CIRCLE_TOKEN")?,
            project: ProjectInfo::new(
                &env::required("CIRCLE_PROJECT_USERNAME")?,
                &env::required("CIRCLE_PROJECT_REPONAME")?,
            ),
            current_commit: env::required("CIRCLE_SHA1")?,
            current_branch: env::required("CIRCLE_BRANCH")?,
            base_dir: expand_home(&env::optional("CIRCLE_WORKING_DIRECTORY", DEFAULT_BASE_DIR)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }
}

impl Validate for CiSettings {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("CIRCLE_TOKEN", &self.token)?;
        validate_non_empty_string("CIRCLE_SHA1", &self.current_commit)?;
        validate_non_empty_string("CIRCLE_BRANCH", &self.current_branch)
    }
}

/// Integrations that need a pipeline for the current commit.
pub async fn changed_integrations<G: GitRepo>(
    settings: &CiSettings,
    circleci: &CircleCiClient,
    repo: &G,
) -> Result<Vec<String>> {
    let last = TriggerService::new(&settings.current_branch, circleci, repo)
        .last_commit()
        .await?;
    tracing::info!(
        "comparing diffs from current {} to last {}",
        settings.current_commit,
        last.commit
    );

    let diff = DiffService::new(&settings.current_commit, &settings.base_dir, repo);
    let changed = if last.is_first_run(&settings.current_branch) {
        tracing::info!("First commit. And no previous builds were found.");
        diff.integrations()?
    } else {
        diff.changed_integrations(&last.commit, last.is_parent).await?
    };

    tracing::info!("got changed integrations {:?}", changed);
    Ok(changed)
}

/// Runs the full trigger against the checkout in `settings.base_dir`.
pub async fn trigger(settings: &CiSettings) -> Result<usize> {
    let circleci = CircleCiClient::new(&settings.token, settings.project.clone());
    let repo = CommandGit::new(&settings.base_dir);

    let changed = changed_integrations(settings, &circleci, &repo).await?;
    updater::trigger_pipelines(
        &circleci,
        &settings.base_dir,
        &settings.current_branch,
        &changed,
        settings.poll_interval,
    )
    .await
}

/// Same selection as `trigger` without starting anything.
pub async fn changed(settings: &CiSettings) -> Result<Vec<String>> {
    let circleci = CircleCiClient::new(&settings.token, settings.project.clone());
    let repo = CommandGit::new(&settings.base_dir);
    changed_integrations(settings, &circleci, &repo).await
}
