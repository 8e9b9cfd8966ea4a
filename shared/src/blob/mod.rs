//! Blob-store boundary: chunked resumable uploads, deletion by path, and
//! durable download references. Backends: [`memory::MemoryBlobStore`] and
//! [`s3::S3BlobStore`].

pub mod memory;
pub mod s3;

use crate::error::DataError;

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a chunked upload to `path`. The upload is not visible at `path`
    /// until [`BlobUpload::finish`] succeeds.
    async fn begin_upload(
        &self,
        path: &str,
        total_bytes: u64,
    ) -> Result<Box<dyn BlobUpload>, DataError>;

    async fn delete(&self, path: &str) -> Result<(), DataError>;

    /// Durable public download reference for a committed blob.
    async fn download_url(&self, path: &str) -> Result<String, DataError>;
}

#[async_trait::async_trait]
pub trait BlobUpload: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), DataError>;

    async fn finish(self: Box<Self>) -> Result<(), DataError>;

    /// Best-effort cancellation. Bytes already committed by the backend may
    /// remain as an orphan; callers accept that.
    async fn abort(self: Box<Self>) -> Result<(), DataError>;
}
