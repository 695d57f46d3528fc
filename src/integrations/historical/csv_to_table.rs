use super::{BackfillKind, HistoricalOrder};
use crate::config::env;
use crate::core::import_files::archive_file;
use crate::domain::model::{HandlerOutcome, RecordStatus, Row, S3Event};
use crate::domain::ports::{KeyValueTable, Storage};
use crate::integrations::csv_split::parse_delimiter;
use crate::utils::error::{IntegrationError, Result};
use serde_json::{Map, Value};

const JSON_COLUMNS: [&str; 2] = ["items", "returned_from"];

#[derive(Debug, Clone)]
pub struct Settings {
    pub kind: BackfillKind,
    pub delimiter: u8,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            kind: env::required("TYPE")?.parse()?,
            delimiter: parse_delimiter(&env::optional("CSV_DELIMITER", ","))?,
        })
    }
}

fn read_rows(data: &[u8], delimiter: u8) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new().delimiter(delimiter).from_reader(data);
    let mut rows = Vec::new();
    for row in reader.deserialize::<Row>() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Groups consecutive rows sharing `Name` into orders. Empty cells are
/// dropped, so a row's remaining columns tell what it describes.
pub fn group_orders(data: &[u8], delimiter: u8) -> Result<Vec<(String, HistoricalOrder)>> {
    let mut orders = Vec::new();
    let mut current = HistoricalOrder::default();
    let mut current_id = String::new();

    for row in read_rows(data, delimiter)? {
        let name = row
            .get("Name")
            .cloned()
            .ok_or_else(|| IntegrationError::processing("order row without 'Name' column"))?;

        if !current_id.is_empty() && name != current_id {
            orders.push((std::mem::take(&mut current_id), std::mem::take(&mut current)));
        }
        current_id = name;

        let row: Row = row.into_iter().filter(|(_, v)| !v.trim().is_empty()).collect();
        if row.contains_key("Processed At") {
            current.details = row;
        } else if row.contains_key("Lineitem name") {
            current.items.push(row);
        } else if row.get("Transaction Kind").map(String::as_str) == Some("capture") {
            current.payment = row;
        } else if row.contains_key("Shipping Line Price") {
            current.shipping = row;
        }
    }

    if !current_id.is_empty() {
        orders.push((current_id, current));
    }
    Ok(orders)
}

/// One return per row keyed by `rma_id`, with the JSON columns decoded.
pub fn parse_returns(data: &[u8], delimiter: u8) -> Result<Vec<(String, Value)>> {
    let mut returns = Vec::new();
    for row in read_rows(data, delimiter)? {
        let rma_id = row
            .get("rma_id")
            .cloned()
            .ok_or_else(|| IntegrationError::processing("return row without 'rma_id' column"))?;

        let mut payload = Map::new();
        for (column, value) in row {
            let decoded = if JSON_COLUMNS.contains(&column.as_str()) && !value.is_empty() {
                serde_json::from_str(&value)?
            } else {
                Value::String(value)
            };
            payload.insert(column, decoded);
        }
        returns.push((rma_id, Value::Object(payload)));
    }
    Ok(returns)
}

pub fn staged_item(key_name: &str, key: &str, payload: String) -> Row {
    let mut item = Row::new();
    item.insert(key_name.to_string(), key.to_string());
    item.insert("payload".to_string(), payload);
    item.insert("status".to_string(), RecordStatus::New.to_string());
    item
}

/// Stages the records of one CSV and archives it. Returns the staged count.
pub async fn stage_file<S, T>(storage: &S, table: &T, settings: &Settings, bucket: &str, key: &str) -> Result<usize>
where
    S: Storage,
    T: KeyValueTable,
{
    let data = storage.read_file(bucket, key).await?;
    let records: Vec<(String, String)> = match settings.kind {
        BackfillKind::Order => group_orders(&data, settings.delimiter)?
            .into_iter()
            .map(|(id, order)| -> Result<(String, String)> { Ok((id, serde_json::to_string(&order)?)) })
            .collect::<Result<_>>()?,
        BackfillKind::Return => parse_returns(&data, settings.delimiter)?
            .into_iter()
            .map(|(id, value)| -> Result<(String, String)> { Ok((id, serde_json::to_string(&value)?)) })
            .collect::<Result<_>>()?,
    };

    for (id, payload) in &records {
        if let Err(e) = table.put_item(staged_item(table.key_name(), id, payload.clone())).await {
            tracing::error!("Failed to add {} {} to table: {}", settings.kind.as_str(), id, e);
        }
    }

    archive_file(storage, bucket, key).await?;
    tracing::info!("Staged {} {}s from {}", records.len(), settings.kind.as_str(), key);
    Ok(records.len())
}

pub async fn handle<S, T>(storage: &S, table: &T, settings: &Settings, event: &S3Event) -> HandlerOutcome
where
    S: Storage,
    T: KeyValueTable,
{
    for record in &event.records {
        let key = record.decoded_key();
        if let Err(e) = stage_file(storage, table, settings, record.bucket(), &key).await {
            tracing::error!("Error while reading CSV {}: {}", key, e);
        }
    }
    HandlerOutcome::success()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: &str = "\
Name,Processed At,Currency,Lineitem name,Lineitem sku,Transaction Kind,Transaction Amount,Shipping Line Price
#1001,2021-01-05 10:00:00 -0500,CAD,,,,,
#1001,,,Shirt,SKU1,,,
#1001,,,Pants,SKU2,,,
#1001,,,,,authorization,50,
#1001,,,,,capture,50,
#1001,,,,,,,5.00
#1002,2021-01-06 11:00:00 -0500,CAD,,,,,
#1002,,,Hat,SKU3,,,
";

    #[test]
    fn test_group_orders_by_row_shape() {
        let orders = group_orders(ORDERS.as_bytes(), b',').unwrap();
        assert_eq!(orders.len(), 2);

        let (id, first) = &orders[0];
        assert_eq!(id, "#1001");
        assert_eq!(first.details.get("Currency").map(String::as_str), Some("CAD"));
        assert!(!first.details.contains_key("Lineitem name"));
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.payment.get("Transaction Amount").map(String::as_str), Some("50"));
        assert_eq!(first.shipping.get("Shipping Line Price").map(String::as_str), Some("5.00"));

        assert_eq!(orders[1].1.items.len(), 1);
        assert!(orders[1].1.payment.is_empty());
    }

    #[test]
    fn test_parse_returns_decodes_json_columns() {
        let csv = "rma_id,order_increment_id,items,returned_from\nR1,#1001,\"[{\"\"sku\"\": \"\"SKU1\"\"}]\",\n";
        let returns = parse_returns(csv.as_bytes(), b',').unwrap();
        assert_eq!(returns[0].0, "R1");
        assert_eq!(returns[0].1["items"][0]["sku"], "SKU1");
        assert_eq!(returns[0].1["returned_from"], "");
    }
}
