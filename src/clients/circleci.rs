use crate::utils::error::{IntegrationError, Result};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_V1_URL: &str = "https://circleci.com/api/v1.1";
pub const DEFAULT_V2_URL: &str = "https://circleci.com/api/v2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub user_name: String,
    pub project_name: String,
    #[serde(default = "default_vcs_type")]
    pub vcs_type: String,
}

fn default_vcs_type() -> String {
    "github".to_string()
}

impl ProjectInfo {
    pub fn new(user_name: &str, project_name: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            project_name: project_name.to_string(),
            vcs_type: default_vcs_type(),
        }
    }

    pub fn slug(&self) -> String {
        format!("{}/{}/{}", self.vcs_type, self.user_name, self.project_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildWorkflow {
    pub workflow_id: String,
    pub workflow_name: String,
}

/// A completed v1 build as returned by the branch listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Build {
    pub status: String,
    #[serde(default)]
    pub vcs_revision: Option<String>,
    #[serde(default)]
    pub workflows: Option<BuildWorkflow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pipeline {
    pub id: String,
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowPage {
    pub items: Vec<Workflow>,
}

/// Minimal CircleCI client covering the v1 build listing and the v2
/// pipeline endpoints the deploy trigger needs.
#[derive(Clone)]
pub struct CircleCiClient {
    client: Client,
    token: String,
    project: ProjectInfo,
    v1_url: String,
    v2_url: String,
}

impl CircleCiClient {
    pub fn new(token: &str, project: ProjectInfo) -> Self {
        Self::with_base_urls(token, project, DEFAULT_V1_URL, DEFAULT_V2_URL)
    }

    pub fn with_base_urls(token: &str, project: ProjectInfo, v1_url: &str, v2_url: &str) -> Self {
        Self {
            client: Client::new(),
            token: token.to_string(),
            project,
            v1_url: v1_url.trim_end_matches('/').to_string(),
            v2_url: v2_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }

    async fn request(&self, method: Method, url: String, body: Option<Value>) -> Result<Value> {
        tracing::debug!("CircleCI {} {}", method, url);
        let mut builder = self
            .client
            .request(method, &url)
            .header("Circle-Token", self.token.as_str())
            .header("Accept", "application/json");
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IntegrationError::CircleCiError {
                message: format!("{} returned {}: {}", url, status, text),
            });
        }
        Ok(response.json().await?)
    }

    /// Completed builds of `branch`, newest first.
    pub async fn recent_builds(&self, branch: &str) -> Result<Vec<Build>> {
        let url = format!(
            "{}/project/{}/tree/{}?filter=completed&limit=100&shallow=true",
            self.v1_url,
            self.project.slug(),
            branch
        );
        let value = self.request(Method::GET, url, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn run_pipeline(&self, branch: &str, parameters: Value) -> Result<Pipeline> {
        let url = format!("{}/project/{}/pipeline", self.v2_url, self.project.slug());
        let body = serde_json::json!({ "branch": branch, "parameters": parameters });
        let value = self.request(Method::POST, url, Some(body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_pipeline_workflows(&self, pipeline_id: &str) -> Result<WorkflowPage> {
        let url = format!("{}/pipeline/{}/workflow", self.v2_url, pipeline_id);
        let value = self.request(Method::GET, url, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow> {
        let url = format!("{}/workflow/{}", self.v2_url, workflow_id);
        let value = self.request(Method::GET, url, None).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> CircleCiClient {
        CircleCiClient::with_base_urls(
            "circle-token",
            ProjectInfo::new("acme", "integrations"),
            &server.url("/api/v1.1"),
            &server.url("/api/v2"),
        )
    }

    #[tokio::test]
    async fn test_recent_builds_uses_v1_tree_endpoint() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1.1/project/github/acme/integrations/tree/master")
                .query_param("filter", "completed")
                .query_param("limit", "100")
                .header("Circle-Token", "circle-token");
            then.status(200).json_body(serde_json::json!([
                {"status": "success", "vcs_revision": "abc123",
                 "workflows": {"workflow_id": "wf-1", "workflow_name": "deploy"}}
            ]));
        });

        let builds = client_for(&server).recent_builds("master").await.unwrap();
        mock.assert();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].vcs_revision.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_run_pipeline_posts_parameters() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/project/github/acme/integrations/pipeline")
                .json_body(serde_json::json!({
                    "branch": "develop",
                    "parameters": {"integration": "integrations/price_import"}
                }));
            then.status(201)
                .json_body(serde_json::json!({"id": "pipe-1", "number": 7, "state": "created"}));
        });

        let pipeline = client_for(&server)
            .run_pipeline(
                "develop",
                serde_json::json!({"integration": "integrations/price_import"}),
            )
            .await
            .unwrap();
        assert_eq!(pipeline.id, "pipe-1");
    }

    #[tokio::test]
    async fn test_error_status_is_circleci_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/workflow/wf-404");
            then.status(404).body("not found");
        });

        let err = client_for(&server).get_workflow("wf-404").await.unwrap_err();
        assert!(matches!(err, IntegrationError::CircleCiError { .. }));
    }
}
