use super::git::GitRepo;
use crate::clients::circleci::Build;
use crate::clients::CircleCiClient;
use crate::utils::error::Result;

/// Branches whose previous successful deploy is used as the diff base.
pub const TRACKED_BRANCHES: [&str; 2] = ["master", "develop"];
pub const PARENT_BRANCH: &str = "master";
/// Workflow statuses that count as a finished, healthy run.
pub const FINISHED_STATUSES: [&str; 3] = ["success", "on_hold", "not_run"];
const CI_WORKFLOW: &str = "ci";

/// The revision to diff against and whether it names the parent branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastCommit {
    pub commit: String,
    pub is_parent: bool,
}

impl LastCommit {
    fn parent() -> Self {
        Self {
            commit: PARENT_BRANCH.to_string(),
            is_parent: true,
        }
    }

    /// No deploy history at all: every integration is due.
    pub fn is_first_run(&self, current_branch: &str) -> bool {
        self.is_parent && self.commit == PARENT_BRANCH && current_branch == PARENT_BRANCH
    }
}

pub struct TriggerService<'a, G: GitRepo> {
    current_branch: String,
    circleci: &'a CircleCiClient,
    repo: &'a G,
}

impl<'a, G: GitRepo> TriggerService<'a, G> {
    pub fn new(current_branch: &str, circleci: &'a CircleCiClient, repo: &'a G) -> Self {
        Self {
            current_branch: current_branch.to_string(),
            circleci,
            repo,
        }
    }

    async fn latest_build(&self) -> Result<Option<Build>> {
        if !TRACKED_BRANCHES.contains(&self.current_branch.as_str()) {
            tracing::info!("current branch is not master or develop. Not returning last build.");
            return Ok(None);
        }

        let builds = self.circleci.recent_builds(&self.current_branch).await?;
        let last_build = builds.into_iter().find(|b| {
            b.status == "success"
                && b.workflows
                    .as_ref()
                    .is_some_and(|w| w.workflow_name != CI_WORKFLOW)
        });
        tracing::info!("got last build from API: {:?}", last_build);

        let Some(build) = last_build else {
            return Ok(None);
        };
        let Some(workflow) = build.workflows.as_ref() else {
            return Ok(None);
        };

        let workflow = self.circleci.get_workflow(&workflow.workflow_id).await?;
        tracing::info!("got workflow {} with status {}", workflow.id, workflow.status);
        if !FINISHED_STATUSES.contains(&workflow.status.as_str()) {
            tracing::info!("last workflow failed.");
            return Ok(None);
        }
        Ok(Some(build))
    }

    pub async fn last_commit(&self) -> Result<LastCommit> {
        let last_hash = self.latest_build().await?.and_then(|b| b.vcs_revision);
        tracing::info!("Last hash {:?}", last_hash);

        if let Some(hash) = last_hash {
            if self.repo.commit_exists(&hash).await? {
                return Ok(LastCommit {
                    commit: hash,
                    is_parent: false,
                });
            }
            tracing::info!("commit does not exist: {}. reason could be rebase.", hash);
        }

        tracing::info!("last commit not found. setting to parent branch {}", PARENT_BRANCH);
        Ok(LastCommit::parent())
    }
}
