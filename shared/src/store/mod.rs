//! Document-store boundary: filtered, ordered queries over schemaless
//! records, atomic single-record writes, and a per-collection change feed
//! that the subscription layer re-queries on.
//!
//! Backends: [`memory::MemoryStore`] (tests, reference semantics) and
//! [`dynamo::DynamoStore`].

pub mod dynamo;
pub mod memory;

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::DataError;

/// Raw field map of a stored record. Field names are camelCase to match the
/// existing store schema; absent optionals are written as explicit `null`.
pub type Fields = serde_json::Map<String, Value>;

/// Sentinel written into create/update payloads where the store must stamp
/// its own commit time.
pub const SERVER_TIMESTAMP: &str = "__SERVER_TIMESTAMP__";

/// Field value requesting a server-assigned timestamp.
pub fn server_timestamp() -> Value {
    Value::String(SERVER_TIMESTAMP.to_string())
}

/// Explicit-null encoding for an optional string field.
pub fn null_or_string(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

/// Explicit-null encoding for an optional timestamp field.
pub fn null_or_timestamp(value: Option<DateTime<Utc>>) -> Value {
    value
        .map(|t| Value::String(t.to_rfc3339()))
        .unwrap_or(Value::Null)
}

/// A record as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

impl Record {
    pub fn str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn string(&self, field: &str) -> Option<String> {
        self.str(field).map(str::to_string)
    }

    pub fn f64(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }

    /// Parse an RFC 3339 timestamp field. Returns `None` when the field is
    /// missing, null, unparseable, or still the unresolved server-timestamp
    /// sentinel — callers render that as "processing", never an error.
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        let raw = self.str(field)?;
        if raw == SERVER_TIMESTAMP {
            return None;
        }
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Tolerant mapping from a stored record into a typed entity. Missing
/// optional fields map to defaults; mapping never fails.
pub trait FromRecord: Sized {
    fn from_record(record: &Record) -> Self;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub field: String,
    pub direction: Direction,
}

/// Live-query shape: one equality filter on a scoping field, optionally
/// ordered by a single field. Matches what the remote store supports.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter_field: String,
    pub filter_value: Value,
    pub order: Option<OrderSpec>,
}

impl Query {
    pub fn new(collection: &str, filter_field: &str, filter_value: impl Into<Value>) -> Self {
        Query {
            collection: collection.to_string(),
            filter_field: filter_field.to_string(),
            filter_value: filter_value.into(),
            order: None,
        }
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some(OrderSpec {
            field: field.to_string(),
            direction,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Change notice broadcast after every committed write. Subscribers re-run
/// their query rather than patching from the notice.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    pub kind: ChangeKind,
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a record with an auto-generated id, resolving any
    /// server-timestamp sentinels to the commit instant.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, DataError>;

    /// Partial field patch of an existing record.
    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), DataError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DataError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, DataError>;

    /// One-shot evaluation of a query. Ordering is applied by the store;
    /// callers must not re-sort.
    async fn query(&self, query: &Query) -> Result<Vec<Record>, DataError>;

    /// Change feed for one collection.
    fn changes(&self, collection: &str) -> broadcast::Receiver<ChangeEvent>;
}

/// Replace server-timestamp sentinels with the commit instant.
pub(crate) fn resolve_server_timestamps(fields: &mut Fields) {
    let now = Utc::now().to_rfc3339();
    for value in fields.values_mut() {
        if value.as_str() == Some(SERVER_TIMESTAMP) {
            *value = Value::String(now.clone());
        }
    }
}

/// Order records by one field. Records missing the field sort last in
/// either direction; only the comparison between present values reverses.
pub(crate) fn sort_records(records: &mut [Record], order: &OrderSpec) {
    records.sort_by(|a, b| {
        match (a.fields.get(&order.field), b.fields.get(&order.field)) {
            (Some(x), Some(y)) => {
                let cmp = compare_values(x, y);
                match order.direction {
                    Direction::Asc => cmp,
                    Direction::Desc => cmp.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
