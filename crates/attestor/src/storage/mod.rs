//! Keyed record storage.
//!
//! The engine persists every artifact through the [`Repository`]
//! abstraction: an opaque keyed store of JSON records. Locking, atomic
//! writes, and backups are the implementation's concern; the contract the
//! engine relies on is read-your-writes within a process and
//! lexicographic key ordering from [`Repository::keys`] (the audit chain
//! encodes per-agent sequence numbers into keys).
//!
//! # Implementations
//!
//! - [`MemoryStore`] — mutex-guarded in-memory map; tests and embedding.
//! - [`JsonFileStore`] — one JSON file per record under a directory,
//!   written atomically via temp-file-then-rename.

pub mod file;
pub mod memory;

use serde_json::Value;

use crate::error::Result;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// An abstract keyed store of JSON records.
pub trait Repository: Send + Sync {
    /// Fetch a record by key, `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store (or replace) a record.
    fn put(&self, key: &str, record: Value) -> Result<()>;

    /// Delete a record. Returns `true` if something was deleted.
    fn delete(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, in ascending lexicographic order.
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// All records whose key starts with `prefix`, in key order.
    fn list(&self, prefix: &str) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        for key in self.keys(prefix)? {
            if let Some(record) = self.get(&key)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
