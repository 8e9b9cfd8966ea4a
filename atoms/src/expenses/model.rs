use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskhub_shared::store::{FromRecord, Record};

/// Uploaded receipt reference. The three fields are a unit; a record either
/// has all of them or explicit nulls for all of them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Receipt {
    pub name: String,
    pub path: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub project_id: String,
    /// User who logged the expense; gates deletion.
    pub user_id: String,
    /// Date the expense was incurred (caller-supplied, unlike createdAt).
    pub date: Option<DateTime<Utc>>,
    pub amount: f64,
    pub description: String,
    pub receipt: Option<Receipt>,
    pub created_at: Option<DateTime<Utc>>,
}

impl FromRecord for Expense {
    fn from_record(record: &Record) -> Expense {
        let receipt = match (
            record.string("receiptName"),
            record.string("receiptPath"),
            record.string("receiptURL"),
        ) {
            (Some(name), Some(path), Some(url)) => Some(Receipt { name, path, url }),
            _ => None,
        };
        Expense {
            id: record.id.clone(),
            project_id: record.string("projectId").unwrap_or_default(),
            user_id: record.string("userId").unwrap_or_default(),
            date: record.timestamp("date"),
            amount: record.f64("amount").unwrap_or_default(),
            description: record.string("description").unwrap_or_default(),
            receipt,
            created_at: record.timestamp("createdAt"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateExpensePayload {
    pub date: DateTime<Utc>,
    pub amount: f64,
    pub description: String,
    /// Already-uploaded receipt, if any; the all-or-nothing triple is
    /// enforced by the type.
    pub receipt: Option<Receipt>,
}
