//! State machine task that releases queued import chunks one at a time.
//!
//! Each invocation moves the first object under `prefix` into the import
//! location and reports through `continue` whether another round is needed.

use crate::domain::model::StepInput;
use crate::domain::ports::Storage;
use crate::utils::error::{IntegrationError, Result};

/// Destination key: `dest_prefix` followed by whatever comes after the
/// first occurrence of `chunk_prefix` in `key`.
pub fn destination_key(key: &str, chunk_prefix: &str, dest_prefix: &str) -> Result<String> {
    let (_, name_part) = key.split_once(chunk_prefix).ok_or_else(|| {
        IntegrationError::processing(format!("key {} does not contain chunk prefix {}", key, chunk_prefix))
    })?;
    Ok(format!("{}{}", dest_prefix, name_part))
}

/// Moves the next chunk, returning the destination key if one was moved.
pub async fn move_next_chunk<S: Storage>(storage: &S, input: &StepInput) -> Result<Option<String>> {
    let Some(key) = storage.list_keys(&input.bucket, &input.prefix, 1).await?.into_iter().next() else {
        return Ok(None);
    };

    let dest_key = destination_key(&key, &input.chunk_prefix, &input.dest_prefix)?;
    storage
        .copy_file(&input.bucket, &key, &input.dest_bucket, &dest_key)
        .await?;
    storage.delete_file(&input.bucket, &key).await?;
    tracing::info!("Moved s3://{}/{} to s3://{}/{}", input.bucket, key, input.dest_bucket, dest_key);
    Ok(Some(dest_key))
}

/// Returns the input with `continue` set. Errors end the loop.
pub async fn handle<S: Storage>(storage: &S, mut input: StepInput) -> StepInput {
    tracing::debug!("Event: {:?}", input);

    let more = match move_next_chunk(storage, &input).await {
        Ok(moved) => moved.is_some(),
        Err(e) => {
            tracing::error!("Failed to move import chunk: {}", e);
            false
        }
    };
    if !more {
        tracing::info!("No more chunks under {}", input.prefix);
    }

    input.continue_ = Some(more);
    input
}
