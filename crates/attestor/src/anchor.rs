//! External anchoring of artifact hashes and Merkle roots.
//!
//! The engine never constructs or signs chain transactions. It computes
//! SHA-256 hashes over canonical artifact JSON (or Merkle roots over
//! audit batches), hands them to an [`AnchorGateway`] collaborator, and
//! records the opaque receipt it gets back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::MerkleBatch;
use crate::crypto::canonical;
use crate::crypto::random::random_id;
use crate::error::{AttestorError, Result};
use crate::storage::Repository;

/// What kind of artifact a hash commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Identity,
    Credential,
    AuditBatch,
}

/// Receipt returned by the chain-submission collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorReceipt {
    /// Opaque transaction reference.
    pub tx_ref: String,
    /// Opaque block reference.
    pub block_ref: String,
}

/// Chain-submission collaborator.
pub trait AnchorGateway: Send + Sync {
    /// Submit a hex hash or Merkle root; returns the anchor receipt.
    fn submit(&self, hash_hex: &str) -> Result<AnchorReceipt>;
}

/// Stored record of one anchoring operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub anchor_id: String,
    pub artifact_type: ArtifactType,
    /// Id of the anchored artifact (agent id, credential id, or the
    /// audited agent's id for a batch).
    pub artifact_id: String,
    /// Hex artifact hash or Merkle root.
    pub artifact_hash: String,
    /// Leaf count for audit batches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf_count: Option<usize>,
    pub tx_ref: String,
    pub block_ref: String,
    pub anchored_at: String,
}

/// Anchors artifact hashes through a gateway and records receipts.
pub struct AnchorService {
    gateway: Option<Arc<dyn AnchorGateway>>,
    store: Arc<dyn Repository>,
}

impl AnchorService {
    pub fn new(gateway: Option<Arc<dyn AnchorGateway>>, store: Arc<dyn Repository>) -> Self {
        Self { gateway, store }
    }

    /// SHA-256 over the canonical JSON of an artifact, hex encoded.
    pub fn compute_artifact_hash(value: &Value) -> Result<String> {
        canonical::canonical_sha256_hex(value)
    }

    fn gateway(&self) -> Result<&Arc<dyn AnchorGateway>> {
        self.gateway.as_ref().ok_or_else(|| {
            AttestorError::UnsupportedMethod("no anchor gateway configured".into())
        })
    }

    /// Anchor a single artifact's hash.
    pub fn anchor_artifact(
        &self,
        artifact_type: ArtifactType,
        artifact_id: &str,
        artifact: &Value,
    ) -> Result<AnchorRecord> {
        let hash = Self::compute_artifact_hash(artifact)?;
        self.submit_and_record(artifact_type, artifact_id, hash, None)
    }

    /// Anchor the Merkle root of an audit batch.
    pub fn anchor_audit_batch(&self, agent_id: &str, batch: &MerkleBatch) -> Result<AnchorRecord> {
        self.submit_and_record(
            ArtifactType::AuditBatch,
            agent_id,
            batch.root_hex(),
            Some(batch.leaf_count()),
        )
    }

    fn submit_and_record(
        &self,
        artifact_type: ArtifactType,
        artifact_id: &str,
        hash: String,
        leaf_count: Option<usize>,
    ) -> Result<AnchorRecord> {
        let receipt = self.gateway()?.submit(&hash)?;
        let record = AnchorRecord {
            anchor_id: random_id("anchor"),
            artifact_type,
            artifact_id: artifact_id.to_string(),
            artifact_hash: hash,
            leaf_count,
            tx_ref: receipt.tx_ref,
            block_ref: receipt.block_ref,
            anchored_at: crate::time::now_rfc3339(),
        };

        let value = serde_json::to_value(&record)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
        self.store.put(&record.anchor_id, value)?;

        log::info!(
            "anchored {:?} {} as {} (tx {})",
            record.artifact_type,
            record.artifact_id,
            record.anchor_id,
            record.tx_ref
        );
        Ok(record)
    }

    /// Fetch an anchor record by id.
    pub fn get(&self, anchor_id: &str) -> Result<Option<AnchorRecord>> {
        match self.store.get(anchor_id)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| AttestorError::SerializationError(e.to_string())),
            None => Ok(None),
        }
    }

    /// Recompute an artifact's hash and compare it to the stored anchor.
    ///
    /// Returns `false` (not an error) when the artifact no longer
    /// matches what was anchored.
    pub fn verify_anchor(&self, anchor_id: &str, artifact: &Value) -> Result<bool> {
        let record = self
            .get(anchor_id)?
            .ok_or_else(|| AttestorError::NotFound(format!("anchor {anchor_id}")))?;
        Ok(Self::compute_artifact_hash(artifact)? == record.artifact_hash)
    }

    /// Delete every anchor record referencing an artifact id. Returns
    /// the number removed.
    pub fn delete_for_artifact(&self, artifact_id: &str) -> Result<usize> {
        let mut deleted = 0;
        for value in self.store.list("")? {
            let record: AnchorRecord = serde_json::from_value(value)
                .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
            if record.artifact_id == artifact_id && self.store.delete(&record.anchor_id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Gateway that fabricates receipts and counts submissions.
    struct MockGateway {
        submissions: AtomicUsize,
    }

    impl MockGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                submissions: AtomicUsize::new(0),
            })
        }
    }

    impl AnchorGateway for MockGateway {
        fn submit(&self, hash_hex: &str) -> Result<AnchorReceipt> {
            let n = self.submissions.fetch_add(1, Ordering::SeqCst);
            Ok(AnchorReceipt {
                tx_ref: format!("0xtx{n}_{}", &hash_hex[..8]),
                block_ref: format!("block-{n}"),
            })
        }
    }

    fn service(gateway: Option<Arc<dyn AnchorGateway>>) -> AnchorService {
        AnchorService::new(gateway, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_anchor_artifact_records_receipt() {
        let gateway = MockGateway::new();
        let service = service(Some(gateway.clone()));
        let artifact = json!({"agent_id": "agent_a", "capabilities": ["x"]});

        let record = service
            .anchor_artifact(ArtifactType::Identity, "agent_a", &artifact)
            .unwrap();
        assert!(record.anchor_id.starts_with("anchor_"));
        assert!(record.tx_ref.starts_with("0xtx0_"));
        assert_eq!(gateway.submissions.load(Ordering::SeqCst), 1);

        let loaded = service.get(&record.anchor_id).unwrap().unwrap();
        assert_eq!(loaded.artifact_hash, record.artifact_hash);
    }

    #[test]
    fn test_no_gateway_is_typed_error() {
        let service = service(None);
        assert!(matches!(
            service.anchor_artifact(ArtifactType::Identity, "a", &json!({})),
            Err(AttestorError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_verify_anchor_detects_drift() {
        let service = service(Some(MockGateway::new()));
        let artifact = json!({"k": "v"});
        let record = service
            .anchor_artifact(ArtifactType::Credential, "urn:c", &artifact)
            .unwrap();

        assert!(service.verify_anchor(&record.anchor_id, &artifact).unwrap());
        assert!(!service
            .verify_anchor(&record.anchor_id, &json!({"k": "tampered"}))
            .unwrap());
    }

    #[test]
    fn test_artifact_hash_is_canonical() {
        let h1 = AnchorService::compute_artifact_hash(&json!({"b": 1, "a": 2})).unwrap();
        let h2 = AnchorService::compute_artifact_hash(&json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_delete_for_artifact() {
        let service = service(Some(MockGateway::new()));
        service
            .anchor_artifact(ArtifactType::Identity, "agent_a", &json!({"v": 1}))
            .unwrap();
        service
            .anchor_artifact(ArtifactType::Identity, "agent_a", &json!({"v": 2}))
            .unwrap();
        service
            .anchor_artifact(ArtifactType::Identity, "agent_b", &json!({"v": 3}))
            .unwrap();

        assert_eq!(service.delete_for_artifact("agent_a").unwrap(), 2);
        assert_eq!(service.delete_for_artifact("agent_a").unwrap(), 0);
    }
}
