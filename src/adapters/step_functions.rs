use crate::domain::ports::WorkflowStarter;
use crate::utils::error::{IntegrationError, Result};
use async_trait::async_trait;
use aws_sdk_sfn::error::DisplayErrorContext;
use aws_sdk_sfn::Client as SfnClient;

#[derive(Debug, Clone)]
pub struct StepFunction {
    client: SfnClient,
    state_machine_arn: String,
}

impl StepFunction {
    pub fn new(client: SfnClient, state_machine_arn: &str) -> Self {
        Self {
            client,
            state_machine_arn: state_machine_arn.to_string(),
        }
    }
}

#[async_trait]
impl WorkflowStarter for StepFunction {
    async fn start_execution(&self, input: &str) -> Result<String> {
        let output = self
            .client
            .start_execution()
            .state_machine_arn(&self.state_machine_arn)
            .input(input)
            .send()
            .await
            .map_err(|e| IntegrationError::WorkflowError {
                status: format!("cannot start {}: {}", self.state_machine_arn, DisplayErrorContext(e)),
            })?;
        Ok(output.execution_arn().to_string())
    }
}
