use crate::domain::ports::Storage;
use crate::utils::error::{IntegrationError, Result};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::time::Duration;

/// Presigned URLs handed to NewStore stay valid for a day.
pub const PRESIGNED_URL_TTL: Duration = Duration::from_secs(86_400);
const LIST_PAGE_SIZE: usize = 1000;

// unreserved characters stay as they are, `/` separates segments
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// `x-amz-copy-source` value for an object, each key segment URL-encoded.
pub fn copy_source(bucket: &str, key: &str) -> String {
    let key = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", bucket, key)
}

#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
}

impl S3Storage {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

fn s3_error(action: &str, bucket: &str, key: &str, e: impl std::error::Error) -> IntegrationError {
    IntegrationError::storage(format!(
        "Failed to {} s3://{}/{}: {}",
        action,
        bucket,
        key,
        DisplayErrorContext(e)
    ))
}

impl Storage for S3Storage {
    async fn read_file(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("read", bucket, key, e))?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| s3_error("collect", bucket, key, e))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn write_file(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| s3_error("write", bucket, key, e))?;
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(s3_error("stat", bucket, key, e)),
        }
    }

    async fn copy_file(&self, src_bucket: &str, src_key: &str, dst_bucket: &str, dst_key: &str) -> Result<()> {
        self.client
            .copy_object()
            .copy_source(copy_source(src_bucket, src_key))
            .bucket(dst_bucket)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| s3_error("copy", src_bucket, src_key, e))?;
        Ok(())
    }

    async fn delete_file(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("delete", bucket, key, e))?;
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        while keys.len() < limit {
            let page_size = (limit - keys.len()).min(LIST_PAGE_SIZE);
            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .max_keys(page_size as i32)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| s3_error("list", bucket, prefix, e))?;

            keys.extend(resp.contents().iter().filter_map(|o| o.key().map(str::to_string)));

            match resp.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        keys.truncate(limit);
        Ok(keys)
    }

    async fn presigned_url(&self, bucket: &str, key: &str) -> Result<String> {
        let config = PresigningConfig::expires_in(PRESIGNED_URL_TTL)
            .map_err(|e| s3_error("presign", bucket, key, e))?;
        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| s3_error("presign", bucket, key, e))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_source_encodes_key_segments() {
        assert_eq!(
            copy_source("frankandoak-prices", "drop/FAONSPRC_CAD_RET_20210428.csv"),
            "frankandoak-prices/drop/FAONSPRC_CAD_RET_20210428.csv"
        );
        assert_eq!(
            copy_source("uploads", "import CSVs/a+b%é.csv"),
            "uploads/import%20CSVs/a%2Bb%25%C3%A9.csv"
        );
    }
}
