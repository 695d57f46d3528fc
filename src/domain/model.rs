use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Generic key/value row, as read from CSV files and DynamoDB tables.
pub type Row = BTreeMap<String, String>;

/// The subset of an S3 notification the handlers look at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3EventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Object {
    pub key: String,
}

impl S3EventRecord {
    pub fn new(event_name: &str, bucket: &str, key: &str) -> Self {
        Self {
            event_name: event_name.to_string(),
            s3: S3Entity {
                bucket: S3Bucket {
                    name: bucket.to_string(),
                },
                object: S3Object {
                    key: key.to_string(),
                },
            },
        }
    }

    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    /// Object keys arrive URL-encoded in notifications (`+` for spaces).
    pub fn decoded_key(&self) -> String {
        let encoded = format!("k={}", self.s3.object.key.replace('&', "%26"));
        url::form_urlencoded::parse(encoded.as_bytes())
            .next()
            .map(|(_, v)| v.into_owned())
            .unwrap_or_else(|| self.s3.object.key.clone())
    }

    pub fn is_object_created(&self) -> bool {
        self.event_name.starts_with("ObjectCreated:")
    }
}

/// A NewStore import file body: a shared head and a slice of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDocument<H, I> {
    pub head: H,
    pub items: Vec<I>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBookHead {
    pub pricebook: String,
    pub catalog: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceItem {
    pub product_id: String,
    pub value: f64,
}

pub type PriceBook = ImportDocument<PriceBookHead, PriceItem>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMapping {
    pub fulfillment_node_id: String,
    pub store_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedFulfillmentWindow {
    pub logical_timestamp_start: i64,
    pub logical_timestamp_end: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityHead {
    pub store_mapping: Vec<StoreMapping>,
    pub completed_fulfillment_requests: CompletedFulfillmentWindow,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityItem {
    pub fulfillment_node_id: String,
    pub product_id: String,
    pub quantity: i64,
}

/// Input handed to the import state machine and passed between its steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    pub bucket: String,
    pub prefix: String,
    pub chunk_prefix: String,
    pub secs_between_chunks: u64,
    pub dest_bucket: String,
    pub dest_prefix: String,
    #[serde(rename = "continue", default, skip_serializing_if = "Option::is_none")]
    pub continue_: Option<bool>,
}

/// Processing state of a backfill row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    New,
    Extracted,
    ExtractionFailed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::New => "new",
            RecordStatus::Extracted => "extracted",
            RecordStatus::ExtractionFailed => "extraction_failed",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result shape most S3/schedule triggered handlers return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    pub success: bool,
}

impl HandlerOutcome {
    pub fn success() -> Self {
        Self { success: true }
    }

    pub fn failure() -> Self {
        Self { success: false }
    }
}

#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_event_deserialization() {
        let event: S3Event = serde_json::from_value(serde_json::json!({
            "Records": [{
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "testbucket"},
                    "object": {"key": "import_CSVs/my+file%281%29.csv"}
                }
            }]
        }))
        .unwrap();

        assert_eq!(event.records.len(), 1);
        let record = &event.records[0];
        assert!(record.is_object_created());
        assert_eq!(record.bucket(), "testbucket");
        assert_eq!(record.decoded_key(), "import_CSVs/my file(1).csv");
    }

    #[test]
    fn test_step_input_continue_flag() {
        let mut input = StepInput {
            bucket: "b".to_string(),
            prefix: "p".to_string(),
            chunk_prefix: "c".to_string(),
            secs_between_chunks: 30,
            dest_bucket: "b".to_string(),
            dest_prefix: "import_files/".to_string(),
            continue_: None,
        };
        let json = serde_json::to_value(&input).unwrap();
        assert!(json.get("continue").is_none());

        input.continue_ = Some(true);
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["continue"], serde_json::json!(true));
    }
}
