use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskhub_shared::store::{FromRecord, Record};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Immutable after creation; set from the session at create time.
    pub owner_id: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Written asynchronously by the folder provisioner, so absent on a
    /// freshly created project.
    pub drive_folder_id: Option<String>,
}

impl FromRecord for Project {
    fn from_record(record: &Record) -> Project {
        Project {
            id: record.id.clone(),
            name: record.string("name").unwrap_or_default(),
            description: record.string("description"),
            owner_id: record.string("ownerId").unwrap_or_default(),
            created_at: record.timestamp("createdAt"),
            drive_folder_id: record.string("driveFolderId"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectPayload {
    pub name: String,
    pub description: Option<String>,
}
