//! S3-backed [`BlobStore`] using multipart uploads so transfers can be
//! aborted mid-flight.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;

use crate::blob::{BlobStore, BlobUpload};
use crate::error::DataError;

// S3 rejects multipart parts under 5 MiB (last part excepted).
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        S3BlobStore {
            client,
            bucket: bucket.into(),
        }
    }
}

struct S3Upload {
    client: S3Client,
    bucket: String,
    key: String,
    upload_id: String,
    buffer: Vec<u8>,
    parts: Vec<CompletedPart>,
    next_part_number: i32,
}

impl S3Upload {
    async fn flush_part(&mut self) -> Result<(), DataError> {
        let body = std::mem::take(&mut self.buffer);
        let part_number = self.next_part_number;
        self.next_part_number += 1;

        let result = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("S3 upload_part error: {}", e)))?;

        self.parts.push(
            CompletedPart::builder()
                .set_e_tag(result.e_tag().map(str::to_string))
                .part_number(part_number)
                .build(),
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobUpload for S3Upload {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), DataError> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() >= MIN_PART_SIZE {
            self.flush_part().await?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<(), DataError> {
        // The final part may be under the minimum size; empty uploads still
        // need one part.
        if !self.buffer.is_empty() || self.parts.is_empty() {
            self.flush_part().await?;
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(self.parts.clone()))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                DataError::Transport(format!("S3 complete_multipart_upload error: {}", e))
            })?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), DataError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("S3 abort_multipart_upload error: {}", e)))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    async fn begin_upload(
        &self,
        path: &str,
        _total_bytes: u64,
    ) -> Result<Box<dyn BlobUpload>, DataError> {
        let result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                DataError::Transport(format!("S3 create_multipart_upload error: {}", e))
            })?;

        let upload_id = result
            .upload_id()
            .ok_or_else(|| {
                DataError::Transport("S3 did not return a multipart upload id".to_string())
            })?
            .to_string();

        Ok(Box::new(S3Upload {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: path.to_string(),
            upload_id,
            buffer: Vec::new(),
            parts: Vec::new(),
            next_part_number: 1,
        }))
    }

    async fn delete(&self, path: &str) -> Result<(), DataError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("S3 delete_object error: {}", e)))?;
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String, DataError> {
        // Bucket policy exposes uploaded objects read-only; the canonical
        // object URL is the durable reference stored on metadata records.
        Ok(format!(
            "https://{}.s3.amazonaws.com/{}",
            self.bucket, path
        ))
    }
}
