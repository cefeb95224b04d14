//! In-memory repository.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{AttestorError, Result};

use super::Repository;

/// Mutex-guarded in-memory store. The `BTreeMap` keeps keys ordered,
/// matching the `keys` contract without a sort on every call.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>> {
        self.records
            .lock()
            .map_err(|_| AttestorError::StorageError("memory store lock poisoned".into()))
    }
}

impl Repository for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, record: Value) -> Result<()> {
        self.lock()?.insert(key.to_string(), record);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        store.put("a", json!({"x": 1})).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!({"x": 1})));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_delete() {
        let store = MemoryStore::new();
        store.put("a", json!(1)).unwrap();
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_keys_prefix_ordered() {
        let store = MemoryStore::new();
        store.put("b:2", json!(2)).unwrap();
        store.put("b:1", json!(1)).unwrap();
        store.put("a:1", json!(0)).unwrap();
        assert_eq!(store.keys("b:").unwrap(), vec!["b:1", "b:2"]);
    }

    #[test]
    fn test_list_in_key_order() {
        let store = MemoryStore::new();
        store.put("k:02", json!("second")).unwrap();
        store.put("k:01", json!("first")).unwrap();
        let records = store.list("k:").unwrap();
        assert_eq!(records, vec![json!("first"), json!("second")]);
    }
}
