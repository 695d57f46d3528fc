use super::workflow::run_workflow;
use crate::clients::CircleCiClient;
use crate::utils::error::{IntegrationError, Result};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningPipeline {
    pub id: String,
    pub integration: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Finished,
}

/// Maps a workflow status onto running/finished; anything else is a failure.
pub fn classify(status: &str) -> Result<PipelineState> {
    match status {
        "running" => Ok(PipelineState::Running),
        "success" | "on_hold" | "not_run" => Ok(PipelineState::Finished),
        other => Err(IntegrationError::WorkflowError {
            status: other.to_string(),
        }),
    }
}

/// Pipelines whose first workflow is still running.
pub async fn update_pipelines(circleci: &CircleCiClient, pipelines: Vec<RunningPipeline>) -> Result<Vec<RunningPipeline>> {
    let mut running = Vec::new();
    for pipeline in pipelines {
        let page = circleci.get_pipeline_workflows(&pipeline.id).await?;
        let status = page
            .items
            .first()
            .map(|w| w.status.clone())
            .unwrap_or_else(|| "running".to_string());
        tracing::info!("{} ({}) is {}", pipeline.integration, pipeline.id, status);

        match classify(&status) {
            Ok(PipelineState::Running) => running.push(pipeline),
            Ok(PipelineState::Finished) => {}
            Err(e) => {
                tracing::error!("❌ Pipeline for {} ended with {}", pipeline.integration, status);
                return Err(e);
            }
        }
    }
    Ok(running)
}

/// Starts one pipeline per integration, then polls until all are done.
pub async fn trigger_pipelines(
    circleci: &CircleCiClient,
    base_dir: &Path,
    branch: &str,
    integrations: &[String],
    poll_interval: Duration,
) -> Result<usize> {
    let mut running = Vec::with_capacity(integrations.len());
    for integration in integrations {
        let pipeline = run_workflow(circleci, base_dir, integration, branch).await?;
        tracing::info!("🚀 Started pipeline {} for {}", pipeline.id, integration);
        running.push(RunningPipeline {
            id: pipeline.id,
            integration: integration.clone(),
        });
    }
    let started = running.len();

    while !running.is_empty() {
        tracing::info!("Waiting for pipelines to finish...");
        tokio::time::sleep(poll_interval).await;
        running = update_pipelines(circleci, running).await?;
        if !running.is_empty() {
            tracing::info!("There are still {} running pipelines. Continue to wait.", running.len());
        }
    }

    tracing::info!("✅ Finished all running integrations.");
    Ok(started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::circleci::ProjectInfo;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer) -> CircleCiClient {
        CircleCiClient::with_base_urls(
            "token",
            ProjectInfo::new("acme", "integrations"),
            &server.url("/api/v1.1"),
            &server.url("/api/v2"),
        )
    }

    fn running(id: &str) -> RunningPipeline {
        RunningPipeline {
            id: id.to_string(),
            integration: format!("integrations/{}", id),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("running").unwrap(), PipelineState::Running);
        for status in ["success", "on_hold", "not_run"] {
            assert_eq!(classify(status).unwrap(), PipelineState::Finished);
        }
        for status in ["failed", "failing", "cancelled", "needs_setup", "error"] {
            assert!(matches!(classify(status), Err(IntegrationError::WorkflowError { .. })));
        }
    }

    #[tokio::test]
    async fn test_update_keeps_running_only() {
        let server = MockServer::start();
        for (id, status) in [("p1", "running"), ("p2", "success")] {
            server.mock(|when, then| {
                when.method(GET).path(format!("/api/v2/pipeline/{}/workflow", id));
                then.status(200)
                    .json_body(json!({"items": [{"id": "w", "name": "deploy", "status": status}]}));
            });
        }

        let client = client_for(&server);
        let remaining = update_pipelines(&client, vec![running("p1"), running("p2")]).await.unwrap();
        assert_eq!(remaining, vec![running("p1")]);
    }

    #[tokio::test]
    async fn test_failed_pipeline_aborts() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/pipeline/p1/workflow");
            then.status(200)
                .json_body(json!({"items": [{"id": "w", "name": "deploy", "status": "failed"}]}));
        });

        let client = client_for(&server);
        let err = update_pipelines(&client, vec![running("p1")]).await.unwrap_err();
        assert!(matches!(err, IntegrationError::WorkflowError { status } if status == "failed"));
    }
}
