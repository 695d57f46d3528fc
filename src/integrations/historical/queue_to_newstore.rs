use super::BackfillKind;
use crate::clients::NewStoreClient;
use crate::domain::model::{HandlerOutcome, QueueMessage};
use crate::domain::ports::MessageQueue;
use crate::utils::error::{IntegrationError, Result};
use serde_json::Value;

pub const MAX_ROUNDS: usize = 50;
pub const BATCH_SIZE: i32 = 10;

async fn push(newstore: &NewStoreClient, kind: BackfillKind, message: &QueueMessage) -> Result<Value> {
    let body: Value = serde_json::from_str(&message.body)?;
    match kind {
        BackfillKind::Order => newstore.fulfill_order(&body).await,
        BackfillKind::Return => {
            let order_id = body["order_id"]
                .as_str()
                .ok_or_else(|| IntegrationError::processing("return message has no order_id"))?;
            newstore.create_return(order_id, &body["return"]).await
        }
    }
}

/// Drains up to `MAX_ROUNDS` batches into NewStore. Messages that fail stay
/// on the queue. Returns how many were delivered.
pub async fn drain<Q: MessageQueue>(queue: &Q, newstore: &NewStoreClient, kind: BackfillKind) -> Result<usize> {
    let mut delivered = 0;

    for round in 0..MAX_ROUNDS {
        let messages = queue.receive_messages(BATCH_SIZE).await?;
        tracing::info!("Received next {} messages from queue... iteration {}", BATCH_SIZE, round);
        if messages.is_empty() {
            break;
        }

        for message in &messages {
            tracing::info!("Processing message: {}", message.message_id);
            match push(newstore, kind, message).await {
                Ok(response) => {
                    tracing::debug!("Response: {}", response);
                    match queue.delete_message(&message.receipt_handle).await {
                        Ok(()) => delivered += 1,
                        Err(e) => tracing::error!("❌ Failed to delete message {}: {}", message.message_id, e),
                    }
                }
                Err(e) => tracing::error!("❌ Failed to import {} {}: {}", kind.as_str(), message.message_id, e),
            }
        }
    }

    Ok(delivered)
}

pub async fn handle<Q: MessageQueue>(queue: &Q, newstore: &NewStoreClient, kind: BackfillKind) -> Result<HandlerOutcome> {
    let delivered = drain(queue, newstore, kind).await?;
    tracing::info!("✅ Imported {} {}s", delivered, kind.as_str());
    Ok(HandlerOutcome::success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::InvocationContext;
    use crate::config::param_store::NewStoreConfig;
    use crate::domain::testing::MemoryQueue;
    use async_trait::async_trait;
    use httpmock::prelude::*;
    use serde_json::json;

    /// Fails to delete one receipt handle, delegates everything else.
    struct FlakyDeleteQueue {
        inner: MemoryQueue,
        failing_receipt: &'static str,
    }

    #[async_trait]
    impl MessageQueue for FlakyDeleteQueue {
        fn queue_url(&self) -> &str {
            self.inner.queue_url()
        }

        async fn send_message(&self, body: &str, group_id: Option<&str>, deduplication_id: Option<&str>) -> Result<String> {
            self.inner.send_message(body, group_id, deduplication_id).await
        }

        async fn receive_messages(&self, max_messages: i32) -> Result<Vec<QueueMessage>> {
            self.inner.receive_messages(max_messages).await
        }

        async fn delete_message(&self, receipt_handle: &str) -> Result<()> {
            if receipt_handle == self.failing_receipt {
                return Err(IntegrationError::queue("transient delete failure"));
            }
            self.inner.delete_message(receipt_handle).await
        }
    }

    fn client(server: &MockServer) -> NewStoreClient {
        server.mock(|when, then| {
            when.method(POST).path("/v0/token");
            then.status(200)
                .json_body(json!({"access_token": "abc", "expires_in": 3600}));
        });
        NewStoreClient::new(
            NewStoreConfig {
                host: server.base_url(),
                tenant: "frankandoak".to_string(),
                username: "user".to_string(),
                password: "secret".to_string(),
            },
            InvocationContext::default(),
        )
    }

    #[tokio::test]
    async fn test_returns_are_posted_to_their_order() {
        let server = MockServer::start();
        let newstore = client(&server);
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/v0/d/orders/ns-1/returns")
                .json_body(json!({"returned_from": "MTLDC1"}));
            then.status(201).json_body(json!({"id": "ret-1"}));
        });

        let queue = MemoryQueue::new("https://sqs/returns.fifo");
        queue
            .send_message(
                &json!({"rma_id": "R1", "order_id": "ns-1", "return": {"returned_from": "MTLDC1"}}).to_string(),
                None,
                None,
            )
            .await
            .unwrap();

        let delivered = drain(&queue, &newstore, BackfillKind::Return).await.unwrap();
        create.assert();
        assert_eq!(delivered, 1);
        assert_eq!(queue.in_flight_len().await, 0);
    }

    #[tokio::test]
    async fn test_failed_orders_stay_on_the_queue() {
        let server = MockServer::start();
        let newstore = client(&server);
        server.mock(|when, then| {
            when.method(POST).path("/v0/d/fulfill_order").body_contains("#bad");
            then.status(400).body("invalid order");
        });
        server.mock(|when, then| {
            when.method(POST).path("/v0/d/fulfill_order").body_contains("#good");
            then.status(200).json_body(json!({"id": "ns-2"}));
        });

        let queue = MemoryQueue::new("https://sqs/orders.fifo");
        for name in ["#bad", "#good"] {
            queue
                .send_message(&json!({"external_id": name}).to_string(), None, None)
                .await
                .unwrap();
        }

        let delivered = drain(&queue, &newstore, BackfillKind::Order).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(queue.in_flight_len().await, 1);
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_delete_failure_does_not_stop_the_batch() {
        let server = MockServer::start();
        let newstore = client(&server);
        let fulfill = server.mock(|when, then| {
            when.method(POST).path("/v0/d/fulfill_order");
            then.status(200).json_body(json!({"id": "ns-1"}));
        });

        let queue = FlakyDeleteQueue {
            inner: MemoryQueue::new("https://sqs/orders.fifo"),
            failing_receipt: "receipt-0",
        };
        for name in ["#1", "#2", "#3"] {
            queue
                .send_message(&json!({"external_id": name}).to_string(), None, None)
                .await
                .unwrap();
        }

        let delivered = drain(&queue, &newstore, BackfillKind::Order).await.unwrap();

        fulfill.assert_hits(3);
        assert_eq!(delivered, 2);
        assert_eq!(queue.inner.in_flight_len().await, 1);
    }
}
