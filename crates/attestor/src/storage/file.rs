//! Filesystem-backed repository.
//!
//! One JSON file per record under a base directory. Keys are sanitized
//! into filenames (`:` and `/` become `__`), so `delegation:deleg_abc`
//! lands at `{base_dir}/delegation__deleg_abc.json`.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{AttestorError, Result};

use super::Repository;

const FILE_SUFFIX: &str = ".json";

/// Directory-of-JSON-files store.
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `base_dir`, creating the directory if
    /// it does not exist.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| match c {
                ':' | '/' => "__".to_string(),
                c if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' => c.to_string(),
                _ => format!("%{:02x}", c as u32),
            })
            .collect();
        self.base_dir.join(format!("{sanitized}{FILE_SUFFIX}"))
    }

    fn key_from_file(name: &str) -> Option<String> {
        name.strip_suffix(FILE_SUFFIX)
            .map(|stem| stem.replace("__", ":"))
    }
}

/// Write `bytes` to `path` atomically: write a temp file in the same
/// directory, then rename over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| AttestorError::StorageError(format!("no parent dir: {}", path.display())))?;
    let tmp = dir.join(format!(
        ".{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "record".into())
    ));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl Repository for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let record = serde_json::from_slice(&bytes).map_err(|e| {
            AttestorError::SerializationError(format!(
                "corrupt record file {}: {e}",
                path.display()
            ))
        })?;
        Ok(Some(record))
    }

    fn put(&self, key: &str, record: Value) -> Result<()> {
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
        write_atomic(&self.path_for(key), json.as_bytes())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        Ok(true)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(key) = Self::key_from_file(&name.to_string_lossy()) else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, JsonFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("records")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (_dir, store) = store();
        store
            .put("identity:agent_abc", json!({"agent_id": "agent_abc"}))
            .unwrap();
        assert_eq!(
            store.get("identity:agent_abc").unwrap(),
            Some(json!({"agent_id": "agent_abc"}))
        );
    }

    #[test]
    fn test_get_missing_is_none() {
        let (_dir, store) = store();
        assert_eq!(store.get("nope").unwrap(), None);
    }

    #[test]
    fn test_delete() {
        let (_dir, store) = store();
        store.put("k", json!(1)).unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn test_keys_sorted_with_prefix() {
        let (_dir, store) = store();
        store.put("audit:agent_a:00000002", json!(2)).unwrap();
        store.put("audit:agent_a:00000001", json!(1)).unwrap();
        store.put("identity:agent_a", json!(0)).unwrap();
        assert_eq!(
            store.keys("audit:agent_a:").unwrap(),
            vec!["audit:agent_a:00000001", "audit:agent_a:00000002"]
        );
    }

    #[test]
    fn test_overwrite_replaces() {
        let (_dir, store) = store();
        store.put("k", json!({"v": 1})).unwrap();
        store.put("k", json!({"v": 2})).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!({"v": 2})));
    }

    #[test]
    fn test_corrupt_file_reports_serialization_error() {
        let (_dir, store) = store();
        store.put("k", json!(1)).unwrap();
        let path = store.path_for("k");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            store.get("k"),
            Err(AttestorError::SerializationError(_))
        ));
    }
}
