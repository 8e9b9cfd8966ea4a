//! DynamoDB-backed [`DocumentStore`].
//!
//! Single-table layout: PK = collection name, SK = record id, entity fields
//! stored as top-level attributes. DynamoDB cannot order a query by an
//! arbitrary attribute, so the adapter applies the order spec before
//! returning; the contract that callers never re-sort still holds.
//!
//! Change notices are broadcast after each successful local write. Writes
//! made by other processes are only observed if a stream consumer feeds them
//! in through [`DynamoStore::notify_external`].

use std::collections::HashMap;
use std::sync::Mutex;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::DataError;
use crate::store::{
    resolve_server_timestamps, sort_records, ChangeEvent, ChangeKind, DocumentStore, Fields,
    Query, Record,
};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
    channels: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        DynamoStore {
            client,
            table_name: table_name.into(),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Feed a change observed out-of-band (e.g. from a table stream) into
    /// the local change feed so standing subscriptions re-query.
    pub fn notify_external(&self, event: ChangeEvent) {
        let channels = self.channels.lock().unwrap();
        if let Some(sender) = channels.get(&event.collection) {
            let _ = sender.send(event);
        }
    }

    fn notify(&self, collection: &str, id: &str, kind: ChangeKind) {
        self.notify_external(ChangeEvent {
            collection: collection.to_string(),
            id: id.to_string(),
            kind,
        });
    }
}

#[async_trait::async_trait]
impl DocumentStore for DynamoStore {
    async fn create(&self, collection: &str, mut fields: Fields) -> Result<String, DataError> {
        resolve_server_timestamps(&mut fields);
        let id = uuid::Uuid::new_v4().to_string();

        let mut builder = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("PK", AttributeValue::S(collection.to_string()))
            .item("SK", AttributeValue::S(id.clone()));
        for (field, value) in &fields {
            builder = builder.item(field, json_to_attr(value));
        }

        builder
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("DynamoDB put_item error: {}", e)))?;

        self.notify(collection, &id, ChangeKind::Created);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, mut patch: Fields) -> Result<(), DataError> {
        if patch.is_empty() {
            return Ok(());
        }
        resolve_server_timestamps(&mut patch);

        let mut update_expr = vec![];
        let mut builder = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(collection.to_string()))
            .key("SK", AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(PK)");

        for (i, (field, value)) in patch.iter().enumerate() {
            let name = format!("#f{}", i);
            let placeholder = format!(":v{}", i);
            update_expr.push(format!("{} = {}", name, placeholder));
            builder = builder
                .expression_attribute_names(name, field)
                .expression_attribute_values(placeholder, json_to_attr(value));
        }

        builder
            .update_expression(format!("SET {}", update_expr.join(", ")))
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_conditional_check_failed_exception() {
                    DataError::not_found(collection, id)
                } else {
                    DataError::Transport(format!("DynamoDB update_item error: {}", service))
                }
            })?;

        self.notify(collection, id, ChangeKind::Updated);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DataError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(collection.to_string()))
            .key("SK", AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(PK)")
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_conditional_check_failed_exception() {
                    DataError::not_found(collection, id)
                } else {
                    DataError::Transport(format!("DynamoDB delete_item error: {}", service))
                }
            })?;

        self.notify(collection, id, ChangeKind::Deleted);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, DataError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(collection.to_string()))
            .key("SK", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("DynamoDB get_item error: {}", e)))?;

        Ok(result.item().map(|item| Record {
            id: id.to_string(),
            fields: item_to_fields(item),
        }))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Record>, DataError> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("PK = :pk")
            .filter_expression("#filter = :fv")
            .expression_attribute_names("#filter", &query.filter_field)
            .expression_attribute_values(":pk", AttributeValue::S(query.collection.clone()))
            .expression_attribute_values(":fv", json_to_attr(&query.filter_value))
            .send()
            .await
            .map_err(|e| DataError::Transport(format!("DynamoDB query error: {}", e)))?;

        let mut records = Vec::new();
        for item in result.items() {
            if let Some(id) = item.get("SK").and_then(|v| v.as_s().ok()) {
                records.push(Record {
                    id: id.to_string(),
                    fields: item_to_fields(item),
                });
            }
        }

        if let Some(order) = &query.order {
            sort_records(&mut records, order);
        }
        Ok(records)
    }

    fn changes(&self, collection: &str) -> broadcast::Receiver<ChangeEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(CHANGE_CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

fn item_to_fields(item: &HashMap<String, AttributeValue>) -> Fields {
    let mut fields = Fields::new();
    for (name, attr) in item {
        if name == "PK" || name == "SK" {
            continue;
        }
        fields.insert(name.clone(), attr_to_json(attr));
    }
    fields
}

fn json_to_attr(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attr).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attr(v)))
                .collect(),
        ),
    }
}

fn attr_to_json(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => n
            .parse::<f64>()
            .ok()
            .and_then(|f| serde_json::Number::from_f64(f))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::Array(items.iter().map(attr_to_json).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), attr_to_json(v)))
                .collect(),
        ),
        _ => Value::Null,
    }
}
