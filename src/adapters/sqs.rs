use crate::domain::model::QueueMessage;
use crate::domain::ports::MessageQueue;
use crate::utils::error::{IntegrationError, Result};
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client as SqsClient;

#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: SqsClient,
    url: String,
}

impl SqsQueue {
    pub fn new(client: SqsClient, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    /// Resolves the queue url from its name.
    pub async fn by_name(client: SqsClient, name: &str) -> Result<Self> {
        let output = client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| IntegrationError::queue(format!("Cannot find queue {}: {}", name, DisplayErrorContext(e))))?;
        let url = output
            .queue_url()
            .ok_or_else(|| IntegrationError::queue(format!("Queue {} has no url", name)))?
            .to_string();
        Ok(Self { client, url })
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    fn queue_url(&self) -> &str {
        &self.url
    }

    async fn send_message(&self, body: &str, group_id: Option<&str>, deduplication_id: Option<&str>) -> Result<String> {
        let output = self
            .client
            .send_message()
            .queue_url(&self.url)
            .message_body(body)
            .set_message_group_id(group_id.map(str::to_string))
            .set_message_deduplication_id(deduplication_id.map(str::to_string))
            .send()
            .await
            .map_err(|e| IntegrationError::queue(format!("Failed to send message: {}", DisplayErrorContext(e))))?;

        output
            .message_id()
            .map(str::to_string)
            .ok_or_else(|| IntegrationError::queue("Queue did not return a message id"))
    }

    async fn receive_messages(&self, max_messages: i32) -> Result<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(0)
            .send()
            .await
            .map_err(|e| IntegrationError::queue(format!("Failed to receive messages: {}", DisplayErrorContext(e))))?;

        Ok(output
            .messages()
            .iter()
            .filter_map(|m| {
                Some(QueueMessage {
                    message_id: m.message_id()?.to_string(),
                    receipt_handle: m.receipt_handle()?.to_string(),
                    body: m.body().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| IntegrationError::queue(format!("Failed to delete message: {}", DisplayErrorContext(e))))?;
        Ok(())
    }
}
