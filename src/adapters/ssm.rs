use crate::domain::ports::{ParameterPage, ParameterSource};
use crate::utils::error::{IntegrationError, Result};
use async_trait::async_trait;
use aws_sdk_ssm::error::DisplayErrorContext;
use aws_sdk_ssm::Client as SsmClient;

#[derive(Debug, Clone)]
pub struct SsmParameters {
    client: SsmClient,
}

impl SsmParameters {
    pub fn new(client: SsmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParameterSource for SsmParameters {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>> {
        match self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
        {
            Ok(output) => Ok(output
                .parameter()
                .and_then(|p| p.value())
                .map(str::to_string)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_parameter_not_found()) => Ok(None),
            Err(e) => Err(IntegrationError::config(format!(
                "Failed to read parameter {}: {}",
                name,
                DisplayErrorContext(e)
            ))),
        }
    }

    async fn get_parameters_by_path(&self, path: &str, next_token: Option<String>) -> Result<ParameterPage> {
        let output = self
            .client
            .get_parameters_by_path()
            .path(path)
            .recursive(true)
            .with_decryption(true)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| {
                IntegrationError::config(format!(
                    "Failed to read parameters under {}: {}",
                    path,
                    DisplayErrorContext(e)
                ))
            })?;

        Ok(ParameterPage {
            parameters: output
                .parameters()
                .iter()
                .filter_map(|p| Some((p.name()?.to_string(), p.value()?.to_string())))
                .collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }
}
