//! Folder provisioning for freshly created projects.
//!
//! Every new project gets an external folder named `{name} [{id}]`, shared
//! with the owner, with the folder id written back onto the project record.
//! Sharing is best-effort: a failed contact lookup or access grant leaves
//! the folder unshared but still provisioned and recorded.

use std::sync::Arc;

use serde_json::Value;

use taskhub_shared::error::DataError;
use taskhub_shared::session::ContactDirectory;
use taskhub_shared::store::{DocumentStore, Fields};

/// Project fields pulled off a stream insert record.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
}

/// External folder backend: creates a named folder and grants a contact
/// address access to it.
#[async_trait::async_trait]
pub trait FolderService: Send + Sync {
    async fn create_folder(&self, name: &str) -> Result<String, DataError>;

    async fn grant_access(&self, folder_id: &str, email: &str) -> Result<(), DataError>;
}

pub struct Provisioner {
    contacts: Arc<dyn ContactDirectory>,
    folders: Arc<dyn FolderService>,
    store: Arc<dyn DocumentStore>,
}

impl Provisioner {
    pub fn new(
        contacts: Arc<dyn ContactDirectory>,
        folders: Arc<dyn FolderService>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Provisioner {
            contacts,
            folders,
            store,
        }
    }

    /// Provision a folder for one new project and record its id.
    pub async fn provision(&self, project: &NewProject) -> Result<(), DataError> {
        let Some(owner_id) = project.owner_id.as_deref() else {
            tracing::warn!(project = %project.id, "project has no owner, skipping folder provisioning");
            return Ok(());
        };

        let folder_name = format!("{} [{}]", project.name, project.id);
        let folder_id = self.folders.create_folder(&folder_name).await?;

        match self.contacts.email_for(owner_id).await {
            Ok(Some(email)) => {
                if let Err(e) = self.folders.grant_access(&folder_id, &email).await {
                    tracing::warn!(folder = %folder_id, error = %e, "access grant failed, folder left unshared");
                }
            }
            Ok(None) => {
                tracing::warn!(owner = %owner_id, "owner has no contact address, folder left unshared");
            }
            Err(e) => {
                tracing::warn!(owner = %owner_id, error = %e, "contact lookup failed, folder left unshared");
            }
        }

        let mut patch = Fields::new();
        patch.insert(
            "driveFolderId".to_string(),
            Value::String(folder_id.clone()),
        );
        self.store.update("projects", &project.id, patch).await?;

        tracing::info!(project = %project.id, folder = %folder_id, "folder provisioned");
        Ok(())
    }
}
