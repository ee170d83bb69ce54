use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use super::{Collection, DurableStore, StoreBackend};
use crate::sync::lock_or_recover;
use crate::StoreError;

/// Process-local store. Nothing survives the process; used by tests and `--store memory`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<(&'static str, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStore for MemoryStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }

    fn read(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        let documents = lock_or_recover(&self.documents, "memory store");
        Ok(documents.get(&(collection.as_str(), key.to_owned())).cloned())
    }

    fn upsert(&self, collection: Collection, key: &str, document: &Value) -> Result<(), StoreError> {
        let mut documents = lock_or_recover(&self.documents, "memory store");
        documents.insert((collection.as_str(), key.to_owned()), document.clone());
        Ok(())
    }

    fn remove(&self, collection: Collection, key: &str) -> Result<bool, StoreError> {
        let mut documents = lock_or_recover(&self.documents, "memory store");
        Ok(documents
            .remove(&(collection.as_str(), key.to_owned()))
            .is_some())
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(String, Value)>, StoreError> {
        let documents = lock_or_recover(&self.documents, "memory store");
        Ok(documents
            .iter()
            .filter(|((name, _), _)| *name == collection.as_str())
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect())
    }

    fn clear(&self, collection: Collection) -> Result<(), StoreError> {
        let mut documents = lock_or_recover(&self.documents, "memory store");
        documents.retain(|(name, _), _| *name != collection.as_str());
        Ok(())
    }
}
