use crate::domain::ports::SecretSource;
use crate::utils::error::{IntegrationError, Result};
use async_trait::async_trait;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use aws_sdk_secretsmanager::Client as SecretsClient;

#[derive(Debug, Clone)]
pub struct SecretsManager {
    client: SecretsClient,
}

impl SecretsManager {
    pub fn new(client: SecretsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretSource for SecretsManager {
    async fn get_secret_string(&self, name: &str) -> Result<String> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| IntegrationError::config(format!("Failed to read secret {}: {}", name, DisplayErrorContext(e))))?;

        output
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| IntegrationError::MissingConfigError {
                field: name.to_string(),
            })
    }
}
