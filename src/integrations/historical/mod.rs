//! Backfill of historical orders and returns.
//!
//! CSV exports are staged in a table (`csv_to_table`), transformed and queued
//! (`table_to_queue`), and finally pushed to NewStore (`queue_to_newstore`).

pub mod csv_to_table;
pub mod order_transformer;
pub mod queue_to_newstore;
pub mod return_transformer;
pub mod table_to_queue;

use crate::domain::model::Row;
use crate::utils::error::{IntegrationError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use order_transformer::{OrderTransformer, OrderTransformerConfig};
pub use return_transformer::ReturnTransformer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillKind {
    Order,
    Return,
}

impl BackfillKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackfillKind::Order => "order",
            BackfillKind::Return => "return",
        }
    }
}

impl std::str::FromStr for BackfillKind {
    type Err = IntegrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "order" => Ok(BackfillKind::Order),
            "return" => Ok(BackfillKind::Return),
            other => Err(IntegrationError::InvalidConfigValueError {
                field: "TYPE".to_string(),
                value: other.to_string(),
                reason: "expected 'order' or 'return'".to_string(),
            }),
        }
    }
}

/// Rows of one Shopify order export, grouped by what they describe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalOrder {
    pub details: Row,
    pub items: Vec<Row>,
    pub shipping: Row,
    pub payment: Row,
}

/// Turns a staged payload into the body queued for NewStore.
#[async_trait]
pub trait BackfillTransformer: Send + Sync {
    async fn transform(&self, payload: &Value) -> Result<Value>;
}
