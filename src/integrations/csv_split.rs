//! Splits large CSV uploads into pieces small enough for one invocation of
//! the downstream loader, keeping rows of the same group together.

use crate::config::env;
use crate::core::import_files::archive_file;
use crate::domain::model::{HandlerOutcome, S3Event};
use crate::domain::ports::Storage;
use crate::utils::error::{IntegrationError, Result};
use crate::utils::validation::{validate_positive_number, validate_s3_bucket_name, Validate};

#[derive(Debug, Clone)]
pub struct Settings {
    pub bucket: String,
    pub output_location: String,
    pub row_limit: usize,
    pub delimiter: u8,
    /// Rows sharing this column's value never end up in different pieces.
    pub group_column: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let delimiter = env::optional("CSV_DELIMITER", ",");
        let group_column = env::optional("CHECK_ROW_NAME", "");
        Ok(Self {
            bucket: env::required("S3_BUCKET")?,
            output_location: env::required("S3_OUTPUT_LOCATION")?,
            row_limit: env::parse_required("CSV_ROW_LIMIT")?,
            delimiter: parse_delimiter(&delimiter)?,
            group_column: (!group_column.is_empty()).then_some(group_column),
        })
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validate_s3_bucket_name("S3_BUCKET", &self.bucket)?;
        validate_positive_number("CSV_ROW_LIMIT", self.row_limit, 1)
    }
}

pub fn parse_delimiter(raw: &str) -> Result<u8> {
    match raw.as_bytes() {
        [b] => Ok(*b),
        _ => Err(IntegrationError::InvalidConfigValueError {
            field: "CSV_DELIMITER".to_string(),
            value: raw.to_string(),
            reason: "must be a single byte".to_string(),
        }),
    }
}

pub fn piece_key(output_location: &str, piece: usize, source_key: &str) -> String {
    format!("{}{:03}-{}", output_location, piece, source_key)
}

struct PieceWriter {
    writer: csv::Writer<Vec<u8>>,
}

impl PieceWriter {
    fn new(headers: &csv::StringRecord, delimiter: u8) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new().delimiter(delimiter).from_writer(Vec::new());
        writer.write_record(headers)?;
        Ok(Self { writer })
    }

    fn finish(self) -> Result<Vec<u8>> {
        self.writer
            .into_inner()
            .map_err(|e| IntegrationError::processing(format!("cannot flush CSV piece: {}", e)))
    }
}

/// Splits `data` after every `row_limit` rows, moving the cut forward while
/// the group column keeps the same value. Each piece repeats the header.
pub fn split_csv(data: &[u8], delimiter: u8, row_limit: usize, group_column: Option<&str>) -> Result<Vec<Vec<u8>>> {
    let row_limit = row_limit.max(1);
    let mut reader = csv::ReaderBuilder::new().delimiter(delimiter).from_reader(data);
    let headers = reader.headers()?.clone();

    let group_index = match group_column {
        Some(name) => Some(headers.iter().position(|h| h == name).ok_or_else(|| {
            IntegrationError::processing(format!("column '{}' not found in CSV header", name))
        })?),
        None => None,
    };

    let mut pieces = Vec::new();
    let mut current = PieceWriter::new(&headers, delimiter)?;
    let mut current_limit = row_limit;
    let mut current_group = String::new();

    for (i, row) in reader.records().enumerate() {
        let row = row?;
        let group = group_index.and_then(|idx| row.get(idx)).unwrap_or_default();

        if i >= current_limit && (group_index.is_none() || current_group != group) {
            let finished = std::mem::replace(&mut current, PieceWriter::new(&headers, delimiter)?);
            pieces.push(finished.finish()?);
            current_limit += row_limit;
        }

        current_group = group.to_string();
        current.writer.write_record(&row)?;
    }
    pieces.push(current.finish()?);

    Ok(pieces)
}

/// Splits one object, writes the pieces and archives the source.
pub async fn split_object<S: Storage>(storage: &S, settings: &Settings, bucket: &str, key: &str) -> Result<Vec<String>> {
    let data = storage.read_file(bucket, key).await?;
    let pieces = split_csv(&data, settings.delimiter, settings.row_limit, settings.group_column.as_deref())?;

    let mut keys = Vec::with_capacity(pieces.len());
    for (i, piece) in pieces.iter().enumerate() {
        let piece_key = piece_key(&settings.output_location, i + 1, key);
        storage.write_file(&settings.bucket, &piece_key, piece).await?;
        tracing::info!("Created s3://{}/{}", settings.bucket, piece_key);
        keys.push(piece_key);
    }

    archive_file(storage, bucket, key).await?;
    Ok(keys)
}

pub async fn handle<S: Storage>(storage: &S, settings: &Settings, event: &S3Event) -> HandlerOutcome {
    for record in &event.records {
        let key = record.decoded_key();
        if let Err(e) = split_object(storage, settings, record.bucket(), &key).await {
            tracing::error!("Error while creating CSV from {}: {}", key, e);
        }
    }
    HandlerOutcome::success()
}
