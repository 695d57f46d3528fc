use crate::domain::model::Row;
use crate::domain::ports::KeyValueTable;
use crate::utils::error::{IntegrationError, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;

/// A table keyed by a single string hash key.
#[derive(Debug, Clone)]
pub struct DynamoTable {
    client: DynamoClient,
    table_name: String,
    key_name: String,
    numeric: Vec<String>,
}

impl DynamoTable {
    pub fn new(client: DynamoClient, table_name: &str, key_name: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
            key_name: key_name.to_string(),
            numeric: Vec::new(),
        }
    }

    /// Attributes written as DynamoDB numbers instead of strings.
    pub fn with_numeric_attributes(mut self, names: &[&str]) -> Self {
        self.numeric = names.iter().map(|n| n.to_string()).collect();
        self
    }

    fn to_attribute(&self, name: &str, value: String) -> AttributeValue {
        if self.numeric.iter().any(|n| n == name) {
            AttributeValue::N(value)
        } else {
            AttributeValue::S(value)
        }
    }

    fn to_item(&self, row: Row) -> HashMap<String, AttributeValue> {
        row.into_iter()
            .map(|(k, v)| {
                let value = self.to_attribute(&k, v);
                (k, value)
            })
            .collect()
    }

    fn error(&self, action: &str, e: impl std::error::Error) -> IntegrationError {
        IntegrationError::table(format!(
            "Failed to {} {}: {}",
            action,
            self.table_name,
            DisplayErrorContext(e)
        ))
    }
}

/// Strings stay strings; numbers and booleans keep their text form.
fn attribute_to_string(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::S(s) | AttributeValue::N(s) => Some(s.clone()),
        AttributeValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn to_row(item: &HashMap<String, AttributeValue>) -> Row {
    item.iter()
        .filter_map(|(k, v)| Some((k.clone(), attribute_to_string(v)?)))
        .collect()
}

#[async_trait]
impl KeyValueTable for DynamoTable {
    fn key_name(&self) -> &str {
        &self.key_name
    }

    async fn get_item(&self, key: &str) -> Result<Option<Row>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(&self.key_name, AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| self.error("get item from", e))?;
        Ok(output.item().map(to_row))
    }

    async fn put_item(&self, item: Row) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(self.to_item(item)))
            .send()
            .await
            .map_err(|e| self.error("put item into", e))?;
        Ok(())
    }

    async fn update_item(&self, key: &str, attributes: Row) -> Result<()> {
        if attributes.is_empty() {
            return Ok(());
        }

        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(&self.key_name, AttributeValue::S(key.to_string()));

        let mut assignments = Vec::with_capacity(attributes.len());
        for (i, (name, value)) in attributes.into_iter().enumerate() {
            assignments.push(format!("#a{i} = :v{i}"));
            let value = self.to_attribute(&name, value);
            request = request
                .expression_attribute_names(format!("#a{i}"), name)
                .expression_attribute_values(format!(":v{i}"), value);
        }

        request
            .update_expression(format!("SET {}", assignments.join(", ")))
            .send()
            .await
            .map_err(|e| self.error("update item in", e))?;
        Ok(())
    }

    async fn scan_eq(&self, attribute: &str, value: &str, limit: usize) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("#attr = :value")
                .expression_attribute_names("#attr", attribute)
                .expression_attribute_values(":value", AttributeValue::S(value.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| self.error("scan", e))?;

            rows.extend(output.items().iter().map(to_row));

            match output.last_evaluated_key() {
                Some(last) if rows.len() < limit => start_key = Some(last.clone()),
                _ => break,
            }
        }
        Ok(rows)
    }
}
