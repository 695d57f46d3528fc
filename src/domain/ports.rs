use crate::domain::model::{QueueMessage, Row};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Object storage addressed by bucket and key.
pub trait Storage: Send + Sync {
    fn read_file(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;

    fn write_file(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn exists(&self, bucket: &str, key: &str) -> impl std::future::Future<Output = Result<bool>> + Send;

    fn copy_file(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn delete_file(&self, bucket: &str, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Keys under `prefix` in lexical order, at most `limit` of them.
    fn list_keys(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;

    /// A URL a third party can fetch the object from.
    fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct ParameterPage {
    /// Full parameter names with their values.
    pub parameters: Vec<(String, String)>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ParameterSource: Send + Sync {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>>;

    async fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<String>,
    ) -> Result<ParameterPage>;
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    fn queue_url(&self) -> &str;

    async fn send_message(
        &self,
        body: &str,
        group_id: Option<&str>,
        deduplication_id: Option<&str>,
    ) -> Result<String>;

    async fn receive_messages(&self, max_messages: i32) -> Result<Vec<QueueMessage>>;

    async fn delete_message(&self, receipt_handle: &str) -> Result<()>;
}

/// A single-hash-key table holding string attributes.
#[async_trait]
pub trait KeyValueTable: Send + Sync {
    fn key_name(&self) -> &str;

    async fn get_item(&self, key: &str) -> Result<Option<Row>>;

    async fn put_item(&self, item: Row) -> Result<()>;

    /// Sets the given attributes on an existing item.
    async fn update_item(&self, key: &str, attributes: Row) -> Result<()>;

    /// Items whose `attribute` equals `value`, stopping once `limit` is
    /// reached or exceeded.
    async fn scan_eq(&self, attribute: &str, value: &str, limit: usize) -> Result<Vec<Row>>;
}

#[async_trait]
pub trait WorkflowStarter: Send + Sync {
    /// Starts one execution and returns its identifier.
    async fn start_execution(&self, input: &str) -> Result<String>;
}

#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn get_secret_string(&self, name: &str) -> Result<String>;
}

/// One extract/transform/load pass, driven by `core::etl::EtlEngine`.
#[async_trait]
pub trait Pipeline: Send + Sync {
    type Extracted: Send;
    type Transformed: Send;
    type Loaded: Send;

    async fn extract(&self) -> Result<Self::Extracted>;
    async fn transform(&self, data: Self::Extracted) -> Result<Self::Transformed>;
    async fn load(&self, result: Self::Transformed) -> Result<Self::Loaded>;
}
