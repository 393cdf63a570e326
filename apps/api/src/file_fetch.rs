//! Byte-oriented file fetch: given a reference, return the raw bytes.

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::info;

use crate::errors::AppError;

#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<Bytes, AppError>;
}

/// Reads uploaded files from an S3 (or MinIO) bucket; the reference is the object key.
pub struct S3FileFetcher {
    client: S3Client,
    bucket: String,
}

impl S3FileFetcher {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl FileFetcher for S3FileFetcher {
    async fn fetch(&self, reference: &str) -> Result<Bytes, AppError> {
        let key = reference.trim_start_matches('/');
        if key.is_empty() {
            return Err(AppError::Validation("file_ref cannot be empty".to_string()));
        }

        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::NotFound(format!("File '{key}' could not be fetched: {e}")))?;

        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| anyhow::anyhow!("S3 body read failed: {e}"))?
            .into_bytes();

        info!("Fetched s3://{}/{} ({} bytes)", self.bucket, key, bytes.len());
        Ok(bytes)
    }
}
