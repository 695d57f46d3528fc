use super::{BackfillKind, BackfillTransformer};
use crate::domain::model::{HandlerOutcome, RecordStatus, Row};
use crate::domain::ports::{KeyValueTable, MessageQueue};
use crate::utils::error::{IntegrationError, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Orders are pulled in batches so one invocation stays within its timeout.
pub const ORDER_SCAN_LIMIT: usize = 500;

pub fn scan_limit(kind: BackfillKind) -> usize {
    match kind {
        BackfillKind::Order => ORDER_SCAN_LIMIT,
        BackfillKind::Return => usize::MAX,
    }
}

/// Content-based deduplication id for FIFO queues.
pub fn deduplication_id(payload: &str) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn status_update(status: RecordStatus) -> Row {
    Row::from([("status".to_string(), status.to_string())])
}

async fn extract_one<Q, X>(queue: &Q, transformer: &X, item: &Row) -> Result<()>
where
    Q: MessageQueue,
    X: BackfillTransformer + ?Sized,
{
    let payload: Value = item
        .get("payload")
        .map(|p| serde_json::from_str(p))
        .transpose()?
        .ok_or_else(|| IntegrationError::processing("staged item has no payload"))?;

    let transformed = transformer.transform(&payload).await?;
    let body = serde_json::to_string(&transformed)?;
    let dedup = deduplication_id(&body);

    queue
        .send_message(&body, Some(queue.queue_url()), Some(&dedup))
        .await?;
    Ok(())
}

/// Transforms every `new` item and queues it, flagging each item with the
/// outcome. Returns how many were queued.
pub async fn extract_new<T, Q, X>(table: &T, queue: &Q, transformer: &X, kind: BackfillKind) -> Result<usize>
where
    T: KeyValueTable,
    Q: MessageQueue,
    X: BackfillTransformer + ?Sized,
{
    tracing::info!("Getting {}s from table...", kind.as_str());
    let items = table
        .scan_eq("status", RecordStatus::New.as_str(), scan_limit(kind))
        .await?;

    let mut queued = 0;
    for item in &items {
        let Some(key) = item.get(table.key_name()) else {
            tracing::error!("Skipping {} without '{}'", kind.as_str(), table.key_name());
            continue;
        };

        let status = match extract_one(queue, transformer, item).await {
            Ok(()) => {
                queued += 1;
                RecordStatus::Extracted
            }
            Err(e) => {
                tracing::error!("Failed to transform {} {}: {}", kind.as_str(), key, e);
                RecordStatus::ExtractionFailed
            }
        };

        tracing::info!("Updating {} {} with status {}", kind.as_str(), key, status);
        if let Err(e) = table.update_item(key, status_update(status)).await {
            tracing::error!("Failed to update {} {}: {}", kind.as_str(), key, e);
        }
    }

    tracing::info!("✅ Queued {} of {} {}s", queued, items.len(), kind.as_str());
    Ok(queued)
}

pub async fn handle<T, Q, X>(table: &T, queue: &Q, transformer: &X, kind: BackfillKind) -> Result<HandlerOutcome>
where
    T: KeyValueTable,
    Q: MessageQueue,
    X: BackfillTransformer + ?Sized,
{
    extract_new(table, queue, transformer, kind).await?;
    Ok(HandlerOutcome::success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{MemoryQueue, MemoryTable};
    use crate::integrations::historical::csv_to_table::staged_item;
    use async_trait::async_trait;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl BackfillTransformer for Upper {
        async fn transform(&self, payload: &Value) -> Result<Value> {
            let name = payload["name"]
                .as_str()
                .ok_or_else(|| IntegrationError::processing("no name"))?;
            Ok(json!({ "name": name.to_uppercase() }))
        }
    }

    #[test]
    fn test_deduplication_id_is_sha256_hex() {
        assert_eq!(
            deduplication_id("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let table = MemoryTable::new("order_id");
        let queue = MemoryQueue::new("https://sqs/orders.fifo");
        table.put_item(staged_item("order_id", "#1", json!({"name": "a"}).to_string())).await.unwrap();
        table.put_item(staged_item("order_id", "#2", json!({"other": 1}).to_string())).await.unwrap();
        let mut done = staged_item("order_id", "#3", json!({"name": "c"}).to_string());
        done.insert("status".to_string(), "extracted".to_string());
        table.put_item(done).await.unwrap();

        let queued = extract_new(&table, &queue, &Upper, BackfillKind::Order).await.unwrap();
        assert_eq!(queued, 1);

        let statuses: Vec<(String, String)> = table
            .items()
            .await
            .into_iter()
            .map(|i| (i["order_id"].clone(), i["status"].clone()))
            .collect();
        assert!(statuses.contains(&("#1".to_string(), "extracted".to_string())));
        assert!(statuses.contains(&("#2".to_string(), "extraction_failed".to_string())));

        let sent = queue.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, r#"{"name":"A"}"#);
        assert_eq!(sent[0].1.as_deref(), Some("https://sqs/orders.fifo"));
        assert_eq!(sent[0].2, Some(deduplication_id(r#"{"name":"A"}"#)));
    }
}
