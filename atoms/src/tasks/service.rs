use serde_json::Value;

use taskhub_shared::error::DataError;
use taskhub_shared::store::{
    null_or_string, null_or_timestamp, server_timestamp, Direction, DocumentStore, Fields, Query,
};

use crate::gateway;
use crate::tasks::model::{CreateTaskPayload, TaskStatus, UpdateTaskPayload};

/// Standing query for a project's task list, creation order ascending.
pub fn project_tasks_query(project_id: &str) -> Query {
    Query::new("tasks", "projectId", project_id).order_by("createdAt", Direction::Asc)
}

/// Create a task in a project. Status defaults to TODO.
pub async fn create_task(
    store: &dyn DocumentStore,
    project_id: &str,
    payload: CreateTaskPayload,
) -> Result<String, DataError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(DataError::Validation("task title is required".to_string()));
    }
    let status = payload.status.unwrap_or_default();

    let mut fields = Fields::new();
    fields.insert(
        "projectId".to_string(),
        Value::String(project_id.to_string()),
    );
    fields.insert("title".to_string(), Value::String(title.to_string()));
    fields.insert("description".to_string(), null_or_string(payload.description));
    fields.insert(
        "status".to_string(),
        Value::String(status.as_str().to_string()),
    );
    fields.insert("dueDate".to_string(), null_or_timestamp(payload.due_date));
    fields.insert("createdAt".to_string(), server_timestamp());

    store.create("tasks", fields).await
}

/// Full edit: writes every editable field, clearing the due date with an
/// explicit null when absent.
pub async fn update_task(
    store: &dyn DocumentStore,
    task_id: &str,
    payload: UpdateTaskPayload,
) -> Result<(), DataError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(DataError::Validation("task title is required".to_string()));
    }

    let mut patch = Fields::new();
    patch.insert("title".to_string(), Value::String(title.to_string()));
    patch.insert("description".to_string(), null_or_string(payload.description));
    patch.insert(
        "status".to_string(),
        Value::String(payload.status.as_str().to_string()),
    );
    patch.insert("dueDate".to_string(), null_or_timestamp(payload.due_date));

    gateway::update_record(store, "tasks", task_id, patch).await
}

/// Quick status change from the list view; single-field patch.
pub async fn set_task_status(
    store: &dyn DocumentStore,
    task_id: &str,
    status: TaskStatus,
) -> Result<(), DataError> {
    let mut patch = Fields::new();
    patch.insert(
        "status".to_string(),
        Value::String(status.as_str().to_string()),
    );
    gateway::update_record(store, "tasks", task_id, patch).await
}

/// Tasks carry no creator field; deletion is gated only by project scoping.
pub async fn delete_task(store: &dyn DocumentStore, task_id: &str) -> Result<(), DataError> {
    gateway::delete_record(store, "tasks", task_id).await
}
