/// Error taxonomy shared by the store, blob, session, and gateway layers.
///
/// Orphaned resources (a blob left behind after its metadata record was
/// deleted, or vice versa) are a logged condition, not an error variant:
/// the two-step create/delete paths in `taskhub-atoms` report success and
/// emit a `tracing::warn!` instead.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl DataError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        DataError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}
