//! NetSuite availability CSV exports to NewStore ATP availability imports.

use crate::clients::NewStoreClient;
use crate::config::env;
use crate::config::param_store::ParamStore;
use crate::core::import_files::{archive_file, import_step_input, object_prefix, start_import_workflow, ChunkWriter};
use crate::core::EtlEngine;
use crate::domain::model::{
    AvailabilityHead, AvailabilityItem, CompletedFulfillmentWindow, HandlerOutcome, Row, S3Event, S3EventRecord,
    StoreMapping,
};
use crate::domain::ports::{KeyValueTable, ParameterSource, Pipeline, Storage, WorkflowStarter};
use crate::utils::error::{IntegrationError, Result};
use crate::utils::validation::{validate_positive_number, validate_s3_bucket_name, validate_s3_prefix, Validate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub const CFR_ID: &str = "main";
const ENTRY_NAME: &str = "availabilities.json";
const KIND: &str = "availabilities";
const MODE: &str = "atp";

#[derive(Debug, Clone)]
pub struct Settings {
    pub bucket: String,
    pub s3_prefix: String,
    pub chunk_size: usize,
    pub chunk_interval: u64,
    pub import_store_data: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bucket: env::required("S3_BUCKET_NAME")?,
            s3_prefix: env::required("S3_PREFIX")?,
            chunk_size: env::parse_required("S3_CHUNK_SIZE")?,
            chunk_interval: env::parse_required("S3_CHUNK_INTERVAL")?,
            import_store_data: env::flag("IMPORT_STORE_DATA"),
        })
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validate_s3_bucket_name("S3_BUCKET_NAME", &self.bucket)?;
        validate_s3_prefix("S3_PREFIX", &self.s3_prefix)?;
        validate_positive_number("S3_CHUNK_SIZE", self.chunk_size, 1)
    }
}

/// The completed-fulfillment-request window kept in the cursor table.
#[derive(Debug, Clone, PartialEq)]
pub struct CfrCursor {
    pub last: i64,
    pub current: i64,
}

impl CfrCursor {
    pub fn from_row(row: &Row) -> Result<Self> {
        let field = |name: &str| -> Result<i64> {
            let raw = row
                .get(name)
                .ok_or_else(|| IntegrationError::table(format!("cursor is missing '{}'", name)))?;
            raw.trim()
                .parse::<f64>()
                .map(|v| v as i64)
                .map_err(|_| IntegrationError::table(format!("cursor '{}' is not a number: {}", name, raw)))
        };
        Ok(Self {
            last: field("last")?,
            current: field("current")?,
        })
    }

    pub fn window(&self) -> CompletedFulfillmentWindow {
        CompletedFulfillmentWindow {
            logical_timestamp_start: self.last,
            logical_timestamp_end: self.current,
        }
    }
}

pub async fn load_cursor<T: KeyValueTable + ?Sized>(table: &T) -> Result<CfrCursor> {
    let row = table
        .get_item(CFR_ID)
        .await?
        .ok_or_else(|| IntegrationError::table(format!("cursor row '{}' not found", CFR_ID)))?;
    CfrCursor::from_row(&row)
}

/// Moves `last` up to `current` and stamps the run time.
pub async fn advance_cursor<T: KeyValueTable + ?Sized>(table: &T, cursor: &CfrCursor, now: DateTime<Utc>) -> Result<()> {
    let mut attributes = Row::new();
    attributes.insert("last".to_string(), cursor.current.to_string());
    attributes.insert("last_run".to_string(), now.to_rfc3339());
    table.update_item(CFR_ID, attributes).await?;
    tracing::info!("Last logical timestamp: {}", cursor.current);
    Ok(())
}

fn parse_quantity(raw: &str) -> Option<i64> {
    raw.replace(',', "").trim().parse::<f64>().ok().map(|v| v.trunc() as i64)
}

/// Reads `Location,ProductSKU,Available` rows. Rows missing a column or
/// with an unreadable quantity are logged and skipped.
pub fn get_items(data: &[u8]) -> Result<Vec<AvailabilityItem>> {
    let mut reader = csv::Reader::from_reader(data);
    let mut items = Vec::new();

    for row in reader.deserialize::<Row>() {
        let row = row?;
        let (Some(location), Some(sku), Some(available)) =
            (row.get("Location"), row.get("ProductSKU"), row.get("Available"))
        else {
            tracing::error!("Error when reading inventory file, missing column. Skipping {:?}", row);
            continue;
        };
        let Some(quantity) = parse_quantity(available) else {
            tracing::error!("Invalid quantity '{}'. Skipping {:?}", available, row);
            continue;
        };

        items.push(AvailabilityItem {
            fulfillment_node_id: location.clone(),
            product_id: sku.clone(),
            quantity,
        });
    }

    Ok(items)
}

/// One mapping per distribution centre, plus NewStore stores when given.
pub fn build_store_mapping(distribution_centres: impl IntoIterator<Item = String>, stores: Option<&serde_json::Value>) -> Vec<StoreMapping> {
    let mut mapping: Vec<StoreMapping> = distribution_centres
        .into_iter()
        .map(|node| StoreMapping {
            fulfillment_node_id: node,
            store_id: String::new(),
        })
        .collect();

    let listed = stores
        .and_then(|s| s.get("stores"))
        .and_then(|s| s.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();
    for store in listed {
        match store.get("store_id").and_then(|id| id.as_str()) {
            Some(store_id) => mapping.push(StoreMapping {
                fulfillment_node_id: store_id.to_string(),
                store_id: store_id.to_string(),
            }),
            None => tracing::warn!("Store without store_id: {}", store),
        }
    }

    mapping
}

pub struct AvailabilityImport {
    pub head: AvailabilityHead,
    pub items: Vec<AvailabilityItem>,
    pub cursor: CfrCursor,
}

pub struct AvailabilityPipeline<'a, S, T, W, P>
where
    S: Storage,
    T: KeyValueTable,
    W: WorkflowStarter,
    P: ParameterSource,
{
    storage: &'a S,
    cursor_table: &'a T,
    workflows: &'a W,
    params: &'a ParamStore<P>,
    newstore: Option<&'a NewStoreClient>,
    settings: &'a Settings,
    records: Vec<S3EventRecord>,
    now: DateTime<Utc>,
}

impl<'a, S, T, W, P> AvailabilityPipeline<'a, S, T, W, P>
where
    S: Storage,
    T: KeyValueTable,
    W: WorkflowStarter,
    P: ParameterSource,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: &'a S,
        cursor_table: &'a T,
        workflows: &'a W,
        params: &'a ParamStore<P>,
        newstore: Option<&'a NewStoreClient>,
        settings: &'a Settings,
        records: Vec<S3EventRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            storage,
            cursor_table,
            workflows,
            params,
            newstore,
            settings,
            records,
            now,
        }
    }

    async fn read_and_archive(&self, record: &S3EventRecord) -> Result<Vec<AvailabilityItem>> {
        let key = record.decoded_key();
        tracing::info!("bucket name: {}, key: {}", record.bucket(), key);

        let data = self.storage.read_file(record.bucket(), &key).await?;
        let items = get_items(&data)?;
        archive_file(self.storage, record.bucket(), &key).await?;
        Ok(items)
    }
}

#[async_trait]
impl<'a, S, T, W, P> Pipeline for AvailabilityPipeline<'a, S, T, W, P>
where
    S: Storage,
    T: KeyValueTable,
    W: WorkflowStarter,
    P: ParameterSource,
{
    type Extracted = Vec<AvailabilityItem>;
    type Transformed = AvailabilityImport;
    type Loaded = String;

    async fn extract(&self) -> Result<Self::Extracted> {
        let mut items = Vec::new();
        for record in &self.records {
            match self.read_and_archive(record).await {
                Ok(found) => items.extend(found),
                Err(e) => tracing::error!("Error while reading CSV: {}", e),
            }
        }
        Ok(items)
    }

    async fn transform(&self, items: Self::Extracted) -> Result<Self::Transformed> {
        if items.is_empty() {
            return Err(IntegrationError::processing("No items found in CSV files"));
        }

        let cursor = load_cursor(self.cursor_table).await?;
        let distribution_centres = self.params.distribution_centres().await?;

        let stores = match (self.settings.import_store_data, self.newstore) {
            (true, Some(client)) => Some(client.get_stores().await?),
            (true, None) => {
                tracing::warn!("IMPORT_STORE_DATA is set but no NewStore client is configured");
                None
            }
            _ => None,
        };
        let store_mapping = build_store_mapping(distribution_centres.into_values(), stores.as_ref());
        tracing::debug!("store_mapping: {:?}", store_mapping);

        Ok(AvailabilityImport {
            head: AvailabilityHead {
                store_mapping,
                completed_fulfillment_requests: cursor.window(),
                mode: MODE.to_string(),
            },
            items,
            cursor,
        })
    }

    async fn load(&self, import: Self::Transformed) -> Result<Self::Loaded> {
        let prefix = object_prefix(&self.settings.s3_prefix, KIND, self.now);
        let writer = ChunkWriter::new(self.storage, &self.settings.bucket, ENTRY_NAME, self.settings.chunk_size);
        writer.write(&prefix, &import.head, &import.items, 0).await?;

        let input = import_step_input(
            &self.settings.bucket,
            &prefix,
            &self.settings.s3_prefix,
            self.settings.chunk_interval,
        );
        start_import_workflow(self.workflows, &input).await.inspect_err(|e| {
            tracing::error!("Failed to execute import step function. CSV files have already been archived. Error: {}", e);
        })?;

        advance_cursor(self.cursor_table, &import.cursor, self.now).await?;
        Ok(prefix)
    }
}

pub async fn handle<S, T, W, P>(
    storage: &S,
    cursor_table: &T,
    workflows: &W,
    params: &ParamStore<P>,
    newstore: Option<&NewStoreClient>,
    settings: &Settings,
    event: &S3Event,
) -> HandlerOutcome
where
    S: Storage,
    T: KeyValueTable,
    W: WorkflowStarter,
    P: ParameterSource,
{
    let pipeline = AvailabilityPipeline::new(
        storage,
        cursor_table,
        workflows,
        params,
        newstore,
        settings,
        event.records.clone(),
        Utc::now(),
    );

    match EtlEngine::new("availability import", pipeline).run().await {
        Ok(prefix) => {
            tracing::info!("Availabilities queued under {}", prefix);
            HandlerOutcome::success()
        }
        Err(e) => {
            tracing::info!("Availability import not completed: {}", e);
            HandlerOutcome::failure()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_items_parses_and_skips() {
        let csv = b"Location,ProductSKU,Available\nMTLDC1,SKU1,\"1,204.0\"\nMTLDC1,SKU2,3.9\nMTLDC1,SKU3,n/a\n";
        let items = get_items(csv).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 1204);
        assert_eq!(items[1].quantity, 3);
        assert_eq!(items[1].fulfillment_node_id, "MTLDC1");

        let missing_column = b"Location,ProductSKU\nMTLDC1,SKU1\n";
        assert!(get_items(missing_column).unwrap().is_empty());
    }

    #[test]
    fn test_store_mapping_adds_stores() {
        let stores = serde_json::json!({"stores": [{"store_id": "S1"}, {"label": "no id"}]});
        let mapping = build_store_mapping(vec!["DC1".to_string()], Some(&stores));
        assert_eq!(
            mapping,
            vec![
                StoreMapping {
                    fulfillment_node_id: "DC1".to_string(),
                    store_id: String::new()
                },
                StoreMapping {
                    fulfillment_node_id: "S1".to_string(),
                    store_id: "S1".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_cursor_from_row() {
        let mut row = Row::new();
        row.insert("id".to_string(), "main".to_string());
        row.insert("last".to_string(), "10".to_string());
        row.insert("current".to_string(), "25".to_string());
        let cursor = CfrCursor::from_row(&row).unwrap();
        assert_eq!(cursor.window().logical_timestamp_end, 25);

        row.remove("current");
        assert!(CfrCursor::from_row(&row).is_err());
    }
}
