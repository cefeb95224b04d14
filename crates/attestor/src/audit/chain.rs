//! Per-agent hash-chained audit logs.
//!
//! Entries for one agent form a singly linked hash chain; appends for
//! the same agent serialize behind a per-agent mutex so two concurrent
//! appends can never compute `chain_hash` against the same "previous"
//! snapshot. Appends for distinct agents proceed in parallel.
//!
//! Store keys are `{agent_id}:{sequence:08}` so lexicographic key order
//! is chain order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::crypto::random::random_id;
use crate::error::{AttestorError, Result};
use crate::storage::Repository;

use super::entry::{ActionType, AuditEntry, GENESIS_HASH};

/// Result of recomputing an agent's chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub length: usize,
    /// Index of the first entry whose recomputed hash mismatches.
    pub broken_at: Option<usize>,
}

/// Append-only, tamper-evident audit log.
pub struct AuditChain {
    store: Arc<dyn Repository>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AuditChain {
    pub fn new(store: Arc<dyn Repository>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn agent_lock(&self, agent_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| AttestorError::StorageError("audit lock table poisoned".into()))?;
        Ok(Arc::clone(
            locks
                .entry(agent_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        ))
    }

    /// Append an entry to `agent_id`'s log and return it, chain hash
    /// included.
    pub fn append(
        &self,
        agent_id: &str,
        action_type: ActionType,
        input_summary: &str,
        output_summary: &str,
        rationale: &str,
        human_override: bool,
    ) -> Result<AuditEntry> {
        let lock = self.agent_lock(agent_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| AttestorError::StorageError("audit agent lock poisoned".into()))?;

        let (sequence, previous_hash) = match self.last_entry(agent_id)? {
            Some(last) => (last.sequence + 1, last.chain_hash),
            None => (0, GENESIS_HASH.to_string()),
        };

        let mut entry = AuditEntry {
            entry_id: random_id("audit"),
            sequence,
            agent_id: agent_id.to_string(),
            action_type,
            input_summary: input_summary.to_string(),
            output_summary: output_summary.to_string(),
            rationale: rationale.to_string(),
            human_override,
            timestamp: crate::time::now_rfc3339(),
            chain_hash: String::new(),
        };
        entry.chain_hash = entry.compute_chain_hash(&previous_hash)?;

        let value = serde_json::to_value(&entry)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
        self.store.put(&entry_key(agent_id, sequence), value)?;

        Ok(entry)
    }

    /// All entries for an agent, in chain order.
    pub fn entries(&self, agent_id: &str) -> Result<Vec<AuditEntry>> {
        let mut entries = Vec::new();
        for value in self.store.list(&format!("{agent_id}:"))? {
            entries.push(
                serde_json::from_value(value)
                    .map_err(|e| AttestorError::SerializationError(e.to_string()))?,
            );
        }
        Ok(entries)
    }

    fn last_entry(&self, agent_id: &str) -> Result<Option<AuditEntry>> {
        let keys = self.store.keys(&format!("{agent_id}:"))?;
        let Some(last_key) = keys.last() else {
            return Ok(None);
        };
        let value = self.store.get(last_key)?.ok_or_else(|| {
            AttestorError::StorageError(format!("audit entry vanished: {last_key}"))
        })?;
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))
    }

    /// Recompute every hash in an agent's chain.
    ///
    /// Tampering is reported (`broken_at`), never repaired.
    pub fn verify_chain(&self, agent_id: &str) -> Result<ChainVerification> {
        let entries = self.entries(agent_id)?;
        let mut previous = GENESIS_HASH.to_string();

        for (index, entry) in entries.iter().enumerate() {
            let expected = entry.compute_chain_hash(&previous)?;
            if entry.sequence != index as u64 || expected != entry.chain_hash {
                log::warn!("audit chain for {agent_id} broken at entry {index}");
                return Ok(ChainVerification {
                    valid: false,
                    length: entries.len(),
                    broken_at: Some(index),
                });
            }
            previous = entry.chain_hash.clone();
        }

        Ok(ChainVerification {
            valid: true,
            length: entries.len(),
            broken_at: None,
        })
    }

    /// Like [`verify_chain`](Self::verify_chain) but surfaces tampering
    /// as a typed `ChainBroken` error, for callers that must refuse to
    /// proceed over a broken chain.
    pub fn ensure_intact(&self, agent_id: &str) -> Result<()> {
        let report = self.verify_chain(agent_id)?;
        match report.broken_at {
            Some(index) => Err(AttestorError::ChainBroken { index }),
            None => Ok(()),
        }
    }

    /// Filtered read over an agent's log. Does not affect the chain.
    ///
    /// `start`/`end` bound the RFC 3339 timestamp (inclusive).
    pub fn query(
        &self,
        agent_id: &str,
        action_type: Option<&ActionType>,
        start: Option<&str>,
        end: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        let mut results = Vec::new();
        for entry in self.entries(agent_id)? {
            if let Some(wanted) = action_type {
                if &entry.action_type != wanted {
                    continue;
                }
            }
            if let Some(start) = start {
                if entry.timestamp.as_str() < start {
                    continue;
                }
            }
            if let Some(end) = end {
                if entry.timestamp.as_str() > end {
                    continue;
                }
            }
            results.push(entry);
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// Delete every entry for an agent. Returns the number removed.
    pub fn delete_agent_entries(&self, agent_id: &str) -> Result<usize> {
        let lock = self.agent_lock(agent_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| AttestorError::StorageError("audit agent lock poisoned".into()))?;

        let keys = self.store.keys(&format!("{agent_id}:"))?;
        let mut deleted = 0;
        for key in keys {
            if self.store.delete(&key)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

fn entry_key(agent_id: &str, sequence: u64) -> String {
    format!("{agent_id}:{sequence:08}")
}
