use serde_json::Value;

use taskhub_shared::blob::BlobStore;
use taskhub_shared::error::DataError;
use taskhub_shared::session::SessionUser;
use taskhub_shared::store::{null_or_string, Direction, DocumentStore, Fields, Query};

use crate::gateway;

/// Standing query for a project's document list, newest upload first.
pub fn project_documents_query(project_id: &str) -> Query {
    Query::new("documents", "projectId", project_id).order_by("uploadedAt", Direction::Desc)
}

/// Record metadata for a blob that has finished uploading. Both the storage
/// path and the durable download URL must already exist; the upload
/// coordinator guarantees that before calling in.
pub async fn create_document(
    store: &dyn DocumentStore,
    project_id: &str,
    task_id: Option<&str>,
    name: &str,
    storage_path: &str,
    download_url: &str,
    session: &SessionUser,
) -> Result<String, DataError> {
    if name.trim().is_empty() {
        return Err(DataError::Validation("document name is required".to_string()));
    }
    if storage_path.is_empty() || download_url.is_empty() {
        return Err(DataError::Validation(
            "storage path and download URL are required".to_string(),
        ));
    }

    let mut fields = Fields::new();
    fields.insert(
        "projectId".to_string(),
        Value::String(project_id.to_string()),
    );
    fields.insert(
        "taskId".to_string(),
        null_or_string(task_id.map(str::to_string)),
    );
    fields.insert("name".to_string(), Value::String(name.to_string()));
    fields.insert(
        "storagePath".to_string(),
        Value::String(storage_path.to_string()),
    );
    fields.insert(
        "downloadURL".to_string(),
        Value::String(download_url.to_string()),
    );

    gateway::create_stamped(store, "documents", fields, "uploaderId", "uploadedAt", session).await
}

/// Two-step delete: metadata record first, then the blob. Only the
/// uploader may delete.
pub async fn delete_document(
    store: &dyn DocumentStore,
    blobs: &dyn BlobStore,
    document_id: &str,
    session: &SessionUser,
) -> Result<(), DataError> {
    gateway::delete_owned(
        store,
        Some(blobs),
        "documents",
        document_id,
        "uploaderId",
        Some("storagePath"),
        session,
    )
    .await
}
