//! S3 access: raw emails in, parsed bookings out.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::info;

use crate::{BookingRecord, Error, Result};

/// Source of raw email bytes.
#[async_trait]
pub trait EmailSource: Send + Sync {
    async fn fetch_email(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// Destination for a JSON copy of each parsed booking.
#[async_trait]
pub trait ResultExporter: Send + Sync {
    async fn export(&self, record: &BookingRecord) -> Result<()>;
}

/// Reads emails from S3.
pub struct S3EmailSource {
    client: S3Client,
}

impl S3EmailSource {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EmailSource for S3EmailSource {
    async fn fetch_email(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to get s3://{}/{}: {}", bucket, key, e)))?;

        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| Error::Aws(format!("Failed to read s3://{}/{}: {}", bucket, key, e)))?
            .into_bytes();

        Ok(bytes.to_vec())
    }
}

/// Writes `{prefix}{id}.json` objects to an output bucket.
pub struct S3ResultExporter {
    client: S3Client,
    bucket: String,
    prefix: String,
}

impl S3ResultExporter {
    pub fn new(client: S3Client, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix,
        }
    }

    /// Object key for a record.
    pub fn object_key(&self, record: &BookingRecord) -> String {
        let id = record.id.as_deref().unwrap_or("unknown");
        format!("{}{}.json", self.prefix, id)
    }
}

#[async_trait]
impl ResultExporter for S3ResultExporter {
    async fn export(&self, record: &BookingRecord) -> Result<()> {
        let key = self.object_key(record);
        let body = serde_json::to_vec(record)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to put s3://{}/{}: {}", self.bucket, key, e)))?;

        info!(bucket = %self.bucket, key = %key, "Exported booking");
        Ok(())
    }
}
