use serde_json::Value;

use taskhub_shared::error::DataError;
use taskhub_shared::session::SessionUser;
use taskhub_shared::store::{null_or_string, Direction, DocumentStore, Fields, Query};

use crate::gateway;
use crate::time_entries::model::CreateTimeEntryPayload;

// One entry logs at most a day of work.
const MAX_HOURS: f64 = 24.0;

/// Standing query for a project's time log, most recent date first.
pub fn project_time_entries_query(project_id: &str) -> Query {
    Query::new("timeEntries", "projectId", project_id).order_by("date", Direction::Desc)
}

pub async fn create_time_entry(
    store: &dyn DocumentStore,
    project_id: &str,
    payload: CreateTimeEntryPayload,
    session: &SessionUser,
) -> Result<String, DataError> {
    if !payload.hours.is_finite() || payload.hours <= 0.0 {
        return Err(DataError::Validation("hours must be positive".to_string()));
    }
    if payload.hours > MAX_HOURS {
        return Err(DataError::Validation(
            "cannot log more than 24 hours at once".to_string(),
        ));
    }
    let hours = serde_json::Number::from_f64(payload.hours)
        .ok_or_else(|| DataError::Validation("hours must be a number".to_string()))?;

    let mut fields = Fields::new();
    fields.insert(
        "projectId".to_string(),
        Value::String(project_id.to_string()),
    );
    fields.insert("taskId".to_string(), null_or_string(payload.task_id));
    fields.insert(
        "date".to_string(),
        Value::String(payload.date.to_rfc3339()),
    );
    fields.insert("hours".to_string(), Value::Number(hours));
    fields.insert("notes".to_string(), null_or_string(payload.notes));

    gateway::create_stamped(store, "timeEntries", fields, "userId", "createdAt", session).await
}

/// Only the user who logged the entry may delete it. No blob involved.
pub async fn delete_time_entry(
    store: &dyn DocumentStore,
    entry_id: &str,
    session: &SessionUser,
) -> Result<(), DataError> {
    gateway::delete_owned(store, None, "timeEntries", entry_id, "userId", None, session).await
}
