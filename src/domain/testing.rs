//! In-memory port implementations used by unit and integration tests.

use crate::domain::model::{QueueMessage, Row};
use crate::domain::ports::{
    KeyValueTable, MessageQueue, ParameterPage, ParameterSource, SecretSource, Storage,
    WorkflowStarter,
};
use crate::utils::error::{IntegrationError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<BTreeMap<(String, String), Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .await
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.files
            .lock()
            .await
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

impl Storage for MemoryStorage {
    async fn read_file(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.get(bucket, key)
            .await
            .ok_or_else(|| IntegrationError::storage(format!("s3://{}/{} not found", bucket, key)))
    }

    async fn write_file(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        self.put(bucket, key, data.to_vec()).await;
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.get(bucket, key).await.is_some())
    }

    async fn copy_file(&self, src_bucket: &str, src_key: &str, dst_bucket: &str, dst_key: &str) -> Result<()> {
        let data = self.read_file(src_bucket, src_key).await?;
        self.put(dst_bucket, dst_key, data).await;
        Ok(())
    }

    async fn delete_file(&self, bucket: &str, key: &str) -> Result<()> {
        self.files
            .lock()
            .await
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .keys(bucket)
            .await
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .take(limit)
            .collect())
    }

    async fn presigned_url(&self, bucket: &str, key: &str) -> Result<String> {
        Ok(format!("https://{}.s3.amazonaws.com/{}?signature=test", bucket, key))
    }
}

#[derive(Clone, Default)]
pub struct MemoryParameters {
    values: Arc<std::sync::Mutex<BTreeMap<String, String>>>,
    page_size: usize,
    calls: Arc<std::sync::atomic::AtomicUsize>,
}

impl MemoryParameters {
    pub fn new(values: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            values: Arc::new(std::sync::Mutex::new(values.into_iter().collect())),
            page_size: 3,
            calls: Arc::default(),
        }
    }

    /// Number of lookups that reached this source.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.values
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ParameterSource for MemoryParameters {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.snapshot().get(name).cloned())
    }

    async fn get_parameters_by_path(&self, path: &str, next_token: Option<String>) -> Result<ParameterPage> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let offset: usize = next_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let matching: Vec<(String, String)> = self
            .snapshot()
            .into_iter()
            .filter(|(name, _)| {
                name.starts_with(path) && !name[path.len()..].trim_start_matches('/').contains('/')
            })
            .collect();
        let page_size = self.page_size.max(1);
        let parameters: Vec<_> = matching.iter().skip(offset).take(page_size).cloned().collect();
        let next = offset + parameters.len();
        Ok(ParameterPage {
            parameters,
            next_token: (next < matching.len()).then(|| next.to_string()),
        })
    }
}

#[derive(Clone)]
pub struct MemoryQueue {
    url: String,
    pending: Arc<Mutex<VecDeque<QueueMessage>>>,
    in_flight: Arc<Mutex<HashMap<String, QueueMessage>>>,
    sent: Arc<Mutex<Vec<(String, Option<String>, Option<String>)>>>,
    counter: Arc<std::sync::atomic::AtomicUsize>,
}

impl MemoryQueue {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            pending: Arc::default(),
            in_flight: Arc::default(),
            sent: Arc::default(),
            counter: Arc::default(),
        }
    }

    /// Bodies sent so far with their group and deduplication ids.
    pub async fn sent(&self) -> Vec<(String, Option<String>, Option<String>)> {
        self.sent.lock().await.clone()
    }

    /// Messages neither received nor deleted.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Messages received but not deleted.
    pub async fn in_flight_len(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn queue_url(&self) -> &str {
        &self.url
    }

    async fn send_message(&self, body: &str, group_id: Option<&str>, deduplication_id: Option<&str>) -> Result<String> {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let message = QueueMessage {
            message_id: format!("msg-{}", n),
            receipt_handle: format!("receipt-{}", n),
            body: body.to_string(),
        };
        self.sent.lock().await.push((
            body.to_string(),
            group_id.map(str::to_string),
            deduplication_id.map(str::to_string),
        ));
        let id = message.message_id.clone();
        self.pending.lock().await.push_back(message);
        Ok(id)
    }

    async fn receive_messages(&self, max_messages: i32) -> Result<Vec<QueueMessage>> {
        let mut pending = self.pending.lock().await;
        let mut in_flight = self.in_flight.lock().await;
        let mut received = Vec::new();
        while received.len() < max_messages.max(0) as usize {
            match pending.pop_front() {
                Some(message) => {
                    in_flight.insert(message.receipt_handle.clone(), message.clone());
                    received.push(message);
                }
                None => break,
            }
        }
        Ok(received)
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<()> {
        self.in_flight.lock().await.remove(receipt_handle);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryTable {
    key: String,
    items: Arc<Mutex<BTreeMap<String, Row>>>,
}

impl MemoryTable {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            items: Arc::default(),
        }
    }

    pub async fn items(&self) -> Vec<Row> {
        self.items.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl KeyValueTable for MemoryTable {
    fn key_name(&self) -> &str {
        &self.key
    }

    async fn get_item(&self, key: &str) -> Result<Option<Row>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn put_item(&self, item: Row) -> Result<()> {
        let key = item
            .get(&self.key)
            .cloned()
            .ok_or_else(|| IntegrationError::table(format!("item is missing key '{}'", self.key)))?;
        self.items.lock().await.insert(key, item);
        Ok(())
    }

    async fn update_item(&self, key: &str, attributes: Row) -> Result<()> {
        let mut items = self.items.lock().await;
        let item = items.entry(key.to_string()).or_insert_with(|| {
            let mut row = Row::new();
            row.insert(self.key.clone(), key.to_string());
            row
        });
        item.extend(attributes);
        Ok(())
    }

    async fn scan_eq(&self, attribute: &str, value: &str, limit: usize) -> Result<Vec<Row>> {
        Ok(self
            .items
            .lock()
            .await
            .values()
            .filter(|item| item.get(attribute).map(String::as_str) == Some(value))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct MemoryWorkflows {
    executions: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl MemoryWorkflows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn executions(&self) -> Vec<String> {
        self.executions.lock().await.clone()
    }
}

#[async_trait]
impl WorkflowStarter for MemoryWorkflows {
    async fn start_execution(&self, input: &str) -> Result<String> {
        if self.fail {
            return Err(IntegrationError::processing("state machine unavailable"));
        }
        let mut executions = self.executions.lock().await;
        executions.push(input.to_string());
        Ok(format!("arn:aws:states:execution:{}", executions.len()))
    }
}

#[derive(Clone, Default)]
pub struct MemorySecrets {
    secrets: BTreeMap<String, String>,
}

impl MemorySecrets {
    pub fn new(secrets: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            secrets: secrets.into_iter().collect(),
        }
    }
}

#[async_trait]
impl SecretSource for MemorySecrets {
    async fn get_secret_string(&self, name: &str) -> Result<String> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| IntegrationError::config(format!("secret {} not found", name)))
    }
}
