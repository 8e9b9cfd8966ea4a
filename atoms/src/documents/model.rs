use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskhub_shared::store::{FromRecord, Record};

/// Metadata record for an uploaded file. `storage_path` and `download_url`
/// travel together: deleting the record must also delete the blob at the
/// path.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub project_id: String,
    /// Set when the file was attached to a specific task.
    pub task_id: Option<String>,
    /// Original file name.
    pub name: String,
    pub storage_path: String,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub uploader_id: String,
}

impl FromRecord for Document {
    fn from_record(record: &Record) -> Document {
        Document {
            id: record.id.clone(),
            project_id: record.string("projectId").unwrap_or_default(),
            task_id: record.string("taskId"),
            name: record.string("name").unwrap_or_default(),
            storage_path: record.string("storagePath").unwrap_or_default(),
            download_url: record.string("downloadURL").unwrap_or_default(),
            uploaded_at: record.timestamp("uploadedAt"),
            uploader_id: record.string("uploaderId").unwrap_or_default(),
        }
    }
}
