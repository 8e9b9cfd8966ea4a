//! In-memory [`DocumentStore`]. Primary test double and the reference for
//! ordering and change-feed semantics.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::DataError;
use crate::store::{
    resolve_server_timestamps, sort_records, ChangeEvent, ChangeKind, DocumentStore, Fields,
    Query, Record,
};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

pub struct MemoryStore {
    // BTreeMap keyed by id keeps unordered query results deterministic.
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
    channels: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            collections: RwLock::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn notify(&self, collection: &str, id: &str, kind: ChangeKind) {
        let channels = self.channels.lock().unwrap();
        if let Some(sender) = channels.get(collection) {
            // No receivers is fine; notices are best-effort.
            let _ = sender.send(ChangeEvent {
                collection: collection.to_string(),
                id: id.to_string(),
                kind,
            });
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, mut fields: Fields) -> Result<String, DataError> {
        resolve_server_timestamps(&mut fields);
        let id = uuid::Uuid::new_v4().to_string();
        {
            let mut collections = self.collections.write().unwrap();
            collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), fields);
        }
        self.notify(collection, &id, ChangeKind::Created);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, mut patch: Fields) -> Result<(), DataError> {
        resolve_server_timestamps(&mut patch);
        {
            let mut collections = self.collections.write().unwrap();
            let record = collections
                .get_mut(collection)
                .and_then(|records| records.get_mut(id))
                .ok_or_else(|| DataError::not_found(collection, id))?;
            for (field, value) in patch {
                record.insert(field, value);
            }
        }
        self.notify(collection, id, ChangeKind::Updated);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DataError> {
        {
            let mut collections = self.collections.write().unwrap();
            let removed = collections
                .get_mut(collection)
                .and_then(|records| records.remove(id));
            if removed.is_none() {
                return Err(DataError::not_found(collection, id));
            }
        }
        self.notify(collection, id, ChangeKind::Deleted);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, DataError> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(collection)
            .and_then(|records| records.get(id))
            .map(|fields| Record {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Record>, DataError> {
        let mut results = {
            let collections = self.collections.read().unwrap();
            collections
                .get(&query.collection)
                .map(|records| {
                    records
                        .iter()
                        .filter(|(_, fields)| {
                            fields.get(&query.filter_field).unwrap_or(&Value::Null)
                                == &query.filter_value
                        })
                        .map(|(id, fields)| Record {
                            id: id.clone(),
                            fields: fields.clone(),
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };
        if let Some(order) = &query.order {
            sort_records(&mut results, order);
        }
        Ok(results)
    }

    fn changes(&self, collection: &str) -> broadcast::Receiver<ChangeEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(CHANGE_CHANNEL_CAPACITY).0)
            .subscribe()
    }
}
