use serde_json::Value;

use taskhub_shared::blob::BlobStore;
use taskhub_shared::error::DataError;
use taskhub_shared::session::SessionUser;
use taskhub_shared::store::{Direction, DocumentStore, Fields, Query};

use crate::expenses::model::CreateExpensePayload;
use crate::gateway;

// Form-level minimum; matches the smallest representable currency step.
const MIN_AMOUNT: f64 = 0.01;

/// Standing query for a project's expense list, most recent date first.
pub fn project_expenses_query(project_id: &str) -> Query {
    Query::new("expenses", "projectId", project_id).order_by("date", Direction::Desc)
}

/// Form-level checks, applied before any write (and before a receipt
/// upload when the flow includes one).
pub fn validate_expense(payload: &CreateExpensePayload) -> Result<(), DataError> {
    if !payload.amount.is_finite() || payload.amount < MIN_AMOUNT {
        return Err(DataError::Validation("amount must be positive".to_string()));
    }
    if payload.description.trim().is_empty() {
        return Err(DataError::Validation("description is required".to_string()));
    }
    Ok(())
}

/// Log an expense against a project. Receipt fields are written as explicit
/// nulls when no receipt was uploaded, matching the store schema.
pub async fn create_expense(
    store: &dyn DocumentStore,
    project_id: &str,
    payload: CreateExpensePayload,
    session: &SessionUser,
) -> Result<String, DataError> {
    validate_expense(&payload)?;
    let description = payload.description.trim();
    let amount = serde_json::Number::from_f64(payload.amount)
        .ok_or_else(|| DataError::Validation("amount must be a number".to_string()))?;

    let mut fields = Fields::new();
    fields.insert(
        "projectId".to_string(),
        Value::String(project_id.to_string()),
    );
    fields.insert(
        "date".to_string(),
        Value::String(payload.date.to_rfc3339()),
    );
    fields.insert("amount".to_string(), Value::Number(amount));
    fields.insert(
        "description".to_string(),
        Value::String(description.to_string()),
    );
    match payload.receipt {
        Some(receipt) => {
            fields.insert("receiptName".to_string(), Value::String(receipt.name));
            fields.insert("receiptPath".to_string(), Value::String(receipt.path));
            fields.insert("receiptURL".to_string(), Value::String(receipt.url));
        }
        None => {
            fields.insert("receiptName".to_string(), Value::Null);
            fields.insert("receiptPath".to_string(), Value::Null);
            fields.insert("receiptURL".to_string(), Value::Null);
        }
    }

    gateway::create_stamped(store, "expenses", fields, "userId", "createdAt", session).await
}

/// Two-step delete: expense record first, then the receipt blob if one was
/// attached. Only the user who logged the expense may delete it.
pub async fn delete_expense(
    store: &dyn DocumentStore,
    blobs: &dyn BlobStore,
    expense_id: &str,
    session: &SessionUser,
) -> Result<(), DataError> {
    gateway::delete_owned(
        store,
        Some(blobs),
        "expenses",
        expense_id,
        "userId",
        Some("receiptPath"),
        session,
    )
    .await
}
