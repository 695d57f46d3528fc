//! Zipped NewStore import chunks and the hand-off to the import state machine.

use crate::domain::model::{ImportDocument, StepInput};
use crate::domain::ports::{Storage, WorkflowStarter};
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

pub const IMPORT_FILES_PREFIX: &str = "import_files/";

/// `<s3_prefix><kind>/<YYYY-mm-dd>/<HH:MM:SS>`
pub fn object_prefix(s3_prefix: &str, kind: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}{}/{}/{}",
        s3_prefix,
        kind,
        now.format("%Y-%m-%d"),
        now.format("%H:%M:%S")
    )
}

pub fn chunk_key(object_prefix: &str, index: usize) -> String {
    format!("{}-{:03}.zip", object_prefix, index)
}

/// A zip archive holding `value` serialized as JSON under `entry_name`.
pub fn zip_json<T: Serialize>(entry_name: &str, value: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(value)?;

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(entry_name, options)?;
    zip.write_all(&json)?;
    let cursor = zip.finish()?;

    Ok(cursor.into_inner())
}

/// Splits an import document into zipped chunks of `chunk_size` items that
/// all repeat the same head.
pub struct ChunkWriter<'a, S: Storage> {
    storage: &'a S,
    bucket: &'a str,
    entry_name: &'a str,
    chunk_size: usize,
}

impl<'a, S: Storage> ChunkWriter<'a, S> {
    pub fn new(storage: &'a S, bucket: &'a str, entry_name: &'a str, chunk_size: usize) -> Self {
        Self {
            storage,
            bucket,
            entry_name,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Writes the chunks numbered from `first_index + 1` and returns how
    /// many were written.
    pub async fn write<H, I>(&self, object_prefix: &str, head: &H, items: &[I], first_index: usize) -> Result<usize>
    where
        H: Serialize + Clone + Sync,
        I: Serialize + Clone + Sync,
    {
        let mut written = 0;
        for (i, chunk) in items.chunks(self.chunk_size).enumerate() {
            let document = ImportDocument {
                head: head.clone(),
                items: chunk.to_vec(),
            };
            let key = chunk_key(object_prefix, first_index + i + 1);
            let data = zip_json(self.entry_name, &document)?;

            tracing::debug!("Zipped chunk {} ({} bytes)", i + 1, data.len());
            self.storage.write_file(self.bucket, &key, &data).await?;
            tracing::info!("Zipped and uploaded s3://{}/{}", self.bucket, key);
            written += 1;
        }
        Ok(written)
    }
}

/// Moves `key` to `archive/<key>` in the same bucket.
pub async fn archive_file<S: Storage>(storage: &S, bucket: &str, key: &str) -> Result<String> {
    let archived = format!("archive/{}", key);
    storage.copy_file(bucket, key, bucket, &archived).await?;
    storage.delete_file(bucket, key).await?;
    tracing::info!("Archived s3://{}/{} to {}", bucket, key, archived);
    Ok(archived)
}

pub fn import_step_input(bucket: &str, object_prefix: &str, chunk_prefix: &str, secs_between_chunks: u64) -> StepInput {
    StepInput {
        bucket: bucket.to_string(),
        prefix: object_prefix.to_string(),
        chunk_prefix: chunk_prefix.to_string(),
        secs_between_chunks,
        dest_bucket: bucket.to_string(),
        dest_prefix: IMPORT_FILES_PREFIX.to_string(),
        continue_: None,
    }
}

pub async fn start_import_workflow<W: WorkflowStarter + ?Sized>(workflows: &W, input: &StepInput) -> Result<String> {
    let body = serde_json::to_string(input)?;
    let execution = workflows.start_execution(&body).await?;
    tracing::info!("Started import state machine {} for {}", execution, input.prefix);
    Ok(execution)
}
