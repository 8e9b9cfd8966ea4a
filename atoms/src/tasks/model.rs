use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskhub_shared::store::{FromRecord, Record};

/// Task workflow states. Wire values match the store schema exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "TODO")]
    Todo,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "DONE")]
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
        }
    }

    pub fn parse(raw: &str) -> Option<TaskStatus> {
        match raw {
            "TODO" => Some(TaskStatus::Todo),
            "IN_PROGRESS" => Some(TaskStatus::InProgress),
            "DONE" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    /// None until the server timestamp has committed.
    pub created_at: Option<DateTime<Utc>>,
}

impl FromRecord for Task {
    fn from_record(record: &Record) -> Task {
        Task {
            id: record.id.clone(),
            project_id: record.string("projectId").unwrap_or_default(),
            title: record.string("title").unwrap_or_default(),
            description: record.string("description"),
            status: record
                .str("status")
                .and_then(TaskStatus::parse)
                .unwrap_or_default(),
            due_date: record.timestamp("dueDate"),
            created_at: record.timestamp("createdAt"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskPayload {
    pub title: String,
    pub description: Option<String>,
    /// Defaults to TODO when unspecified.
    pub status: Option<TaskStatus>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Full-edit payload; the edit form always writes every editable field,
/// including an explicit null for a cleared due date.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTaskPayload {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
}
