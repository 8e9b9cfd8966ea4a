//! Mutation gateway: every write the entity services make goes through
//! these functions. Creates stamp the acting session's identity and a
//! server timestamp; deletes apply the ownership predicate before touching
//! the store, and run blob-bearing deletes as two explicit sequential calls.

use serde_json::Value;

use taskhub_shared::blob::BlobStore;
use taskhub_shared::error::DataError;
use taskhub_shared::session::SessionUser;
use taskhub_shared::store::{server_timestamp, DocumentStore, Fields};

use crate::authz;

/// Create a record stamped with the session user's id in `identity_field`
/// and a server timestamp in `timestamp_field`. The caller's payload never
/// supplies either; the session is the only identity source.
pub async fn create_stamped(
    store: &dyn DocumentStore,
    collection: &str,
    mut fields: Fields,
    identity_field: &str,
    timestamp_field: &str,
    session: &SessionUser,
) -> Result<String, DataError> {
    fields.insert(
        identity_field.to_string(),
        Value::String(session.user_id.clone()),
    );
    fields.insert(timestamp_field.to_string(), server_timestamp());
    store.create(collection, fields).await
}

/// Partial field patch.
pub async fn update_record(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    patch: Fields,
) -> Result<(), DataError> {
    store.update(collection, id, patch).await
}

/// Delete a record that has no per-user owner field (tasks). Scoping to the
/// parent project is the only gate, as with the rest of the project data.
pub async fn delete_record(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<(), DataError> {
    store.delete(collection, id).await
}

/// Ownership-checked delete. Re-fetches the record, compares its
/// `owner_field` against the session, and only then deletes — a mismatch
/// never reaches the store. When `blob_path_field` is given and set on the
/// record, the blob is deleted after the metadata record; the two calls are
/// not atomic, and a blob failure leaves an orphan rather than re-creating
/// the record.
pub async fn delete_owned(
    store: &dyn DocumentStore,
    blobs: Option<&dyn BlobStore>,
    collection: &str,
    id: &str,
    owner_field: &str,
    blob_path_field: Option<&str>,
    session: &SessionUser,
) -> Result<(), DataError> {
    let record = store
        .get(collection, id)
        .await?
        .ok_or_else(|| DataError::not_found(collection, id))?;

    let owner = record.str(owner_field).unwrap_or_default();
    if !authz::can_delete(owner, session) {
        return Err(DataError::PermissionDenied(format!(
            "user {} may not delete {}/{}",
            session.user_id, collection, id
        )));
    }

    store.delete(collection, id).await?;

    if let (Some(blobs), Some(path_field)) = (blobs, blob_path_field) {
        if let Some(path) = record.str(path_field) {
            if let Err(e) = blobs.delete(path).await {
                tracing::warn!(
                    collection,
                    id,
                    path,
                    error = %e,
                    "metadata deleted but blob delete failed; orphan blob left behind"
                );
            }
        }
    }
    Ok(())
}
