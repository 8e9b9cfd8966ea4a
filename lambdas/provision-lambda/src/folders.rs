//! S3-backed folder service. A "folder" is a key prefix under the folder
//! bucket, made durable with a zero-byte `.keep` marker; access grants go
//! out as SES share notifications.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;

use taskhub_shared::error::DataError;

use crate::provisioner::FolderService;

pub struct S3FolderService {
    s3: S3Client,
    ses: SesClient,
    bucket: String,
    from_address: String,
}

impl S3FolderService {
    pub fn new(
        s3: S3Client,
        ses: SesClient,
        bucket: impl Into<String>,
        from_address: impl Into<String>,
    ) -> Self {
        S3FolderService {
            s3,
            ses,
            bucket: bucket.into(),
            from_address: from_address.into(),
        }
    }
}

#[async_trait::async_trait]
impl FolderService for S3FolderService {
    async fn create_folder(&self, name: &str) -> Result<String, DataError> {
        let prefix = format!("folders/{}/", name);
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(format!("{}.keep", prefix))
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("S3 put_object error: {}", e)))?;
        Ok(prefix)
    }

    async fn grant_access(&self, folder_id: &str, email: &str) -> Result<(), DataError> {
        let subject = Content::builder()
            .data("A project folder was shared with you")
            .build()
            .map_err(|e| DataError::Transport(format!("SES content error: {}", e)))?;
        let text = Content::builder()
            .data(format!(
                "Your project folder is ready at s3://{}/{}",
                self.bucket, folder_id
            ))
            .build()
            .map_err(|e| DataError::Transport(format!("SES content error: {}", e)))?;
        let message = Message::builder()
            .subject(subject)
            .body(Body::builder().text(text).build())
            .build();

        self.ses
            .send_email()
            .from_email_address(&self.from_address)
            .destination(Destination::builder().to_addresses(email).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("SES send_email error: {}", e)))?;
        Ok(())
    }
}
