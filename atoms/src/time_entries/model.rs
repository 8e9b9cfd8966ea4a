use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskhub_shared::store::{FromRecord, Record};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: String,
    pub project_id: String,
    pub task_id: Option<String>,
    /// User who logged the time; gates deletion.
    pub user_id: String,
    /// Date the work was done.
    pub date: Option<DateTime<Utc>>,
    pub hours: f64,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl FromRecord for TimeEntry {
    fn from_record(record: &Record) -> TimeEntry {
        TimeEntry {
            id: record.id.clone(),
            project_id: record.string("projectId").unwrap_or_default(),
            task_id: record.string("taskId"),
            user_id: record.string("userId").unwrap_or_default(),
            date: record.timestamp("date"),
            hours: record.f64("hours").unwrap_or_default(),
            notes: record.string("notes"),
            created_at: record.timestamp("createdAt"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTimeEntryPayload {
    pub date: DateTime<Utc>,
    pub hours: f64,
    pub notes: Option<String>,
    pub task_id: Option<String>,
}
