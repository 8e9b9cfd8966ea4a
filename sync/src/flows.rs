//! Upload-then-record flows. A metadata record is written only after the
//! blob transfer finished and yielded a durable download reference; a blob
//! without its record (failed second step, dismissed form) is an accepted
//! orphan and never surfaced as data.

use std::sync::Arc;

use taskhub_shared::blob::BlobStore;
use taskhub_shared::error::DataError;
use taskhub_shared::session::SessionUser;
use taskhub_shared::store::DocumentStore;

use taskhub_atoms::documents;
use taskhub_atoms::expenses::{self, model::CreateExpensePayload, model::Receipt};

use crate::upload::{document_path, receipt_path, start_upload};

/// A file picked in a form, ready to stream.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Upload a project document and record its metadata. Exactly one record
/// write happens, and only on a completed transfer.
pub async fn upload_document(
    store: &dyn DocumentStore,
    blobs: Arc<dyn BlobStore>,
    project_id: &str,
    task_id: Option<&str>,
    file: FileUpload,
    session: &SessionUser,
) -> Result<String, DataError> {
    let path = document_path(project_id, task_id, &file.name);
    let result = start_upload(blobs, path, file.bytes).wait().await?;
    documents::service::create_document(
        store,
        project_id,
        task_id,
        &file.name,
        &result.path,
        &result.url,
        session,
    )
    .await
}

/// Log an expense, uploading the receipt first when one was attached. The
/// payload is validated before the receipt upload so an invalid form never
/// commits bytes.
pub async fn add_expense(
    store: &dyn DocumentStore,
    blobs: Arc<dyn BlobStore>,
    project_id: &str,
    mut payload: CreateExpensePayload,
    receipt_file: Option<FileUpload>,
    session: &SessionUser,
) -> Result<String, DataError> {
    expenses::service::validate_expense(&payload)?;

    if let Some(file) = receipt_file {
        let path = receipt_path(project_id, &file.name);
        let result = start_upload(blobs, path, file.bytes).wait().await?;
        payload.receipt = Some(Receipt {
            name: file.name,
            path: result.path,
            url: result.url,
        });
    }

    expenses::service::create_expense(store, project_id, payload, session).await
}
