//! Merkle batch anchoring for audit entries.
//!
//! SHA-256 with domain separation (`0x00` prefix for leaves, `0x01` for
//! internal nodes) following the RFC 6962 convention to prevent
//! second-preimage attacks. A level with an odd node count duplicates
//! its last node before pairing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::crypto::canonical;
use crate::error::{AttestorError, Result};

use super::entry::AuditEntry;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// SHA-256 of a canonical JSON value with the leaf domain prefix.
pub fn leaf_hash(value: &Value) -> Result<[u8; 32]> {
    let canonical = canonical::canonical_bytes(value)?;
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(&canonical);
    Ok(hasher.finalize().into())
}

/// SHA-256 of two child hashes with the internal node domain prefix.
pub fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// One step of an inclusion proof: a sibling hash and which side it
/// sits on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProofStep {
    /// Hex sibling hash.
    pub sibling: String,
    /// True if the sibling is the left child at this level.
    pub sibling_is_left: bool,
}

/// A batch of audit-entry hashes committed to a single root.
pub struct MerkleBatch {
    /// Tree levels, bottom-up: `levels[0]` are the leaves,
    /// `levels.last()` is `[root]`.
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleBatch {
    /// Build a batch over audit entries (leaf order = entry order).
    pub fn from_entries(entries: &[AuditEntry]) -> Result<Self> {
        let leaves = entries
            .iter()
            .map(|entry| {
                let value = serde_json::to_value(entry)
                    .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
                leaf_hash(&value)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_leaf_hashes(leaves)
    }

    /// Build a batch from precomputed leaf hashes.
    pub fn from_leaf_hashes(leaves: Vec<[u8; 32]>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(AttestorError::SerializationError(
                "cannot build a Merkle batch from zero leaves".into(),
            ));
        }

        let mut levels = vec![leaves];
        while levels.last().map(Vec::len).unwrap_or(0) > 1 {
            let current = levels.last().expect("levels never empty");
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                let left = &pair[0];
                // Odd level: duplicate the last node
                let right = pair.get(1).unwrap_or(left);
                next.push(node_hash(left, right));
            }
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// Number of leaves in the batch.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Hex leaf hashes in batch order.
    pub fn leaf_hashes_hex(&self) -> Vec<String> {
        self.levels[0].iter().map(hex::encode).collect()
    }

    /// Hex Merkle root.
    pub fn root_hex(&self) -> String {
        hex::encode(self.levels.last().expect("levels never empty")[0])
    }

    /// Sibling path proving that leaf `index` is in the batch.
    pub fn prove_inclusion(&self, index: usize) -> Result<Vec<MerkleProofStep>> {
        if index >= self.leaf_count() {
            return Err(AttestorError::NotFound(format!(
                "leaf index {index} out of range (batch has {} leaves)",
                self.leaf_count()
            )));
        }

        let mut proof = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling_index, sibling_is_left) = if position % 2 == 0 {
                (position + 1, false)
            } else {
                (position - 1, true)
            };
            // Duplicated last node: the sibling is the node itself
            let sibling = level.get(sibling_index).unwrap_or(&level[position]);
            proof.push(MerkleProofStep {
                sibling: hex::encode(sibling),
                sibling_is_left,
            });
            position /= 2;
        }
        Ok(proof)
    }
}

/// Recompute a root from a leaf hash and a sibling path; true iff it
/// matches `root_hex`. Pure — needs no access to the batch.
pub fn verify_inclusion(root_hex: &str, leaf_hash_hex: &str, proof: &[MerkleProofStep]) -> bool {
    let Some(mut current) = decode_hash(leaf_hash_hex) else {
        return false;
    };
    for step in proof {
        let Some(sibling) = decode_hash(&step.sibling) else {
            return false;
        };
        current = if step.sibling_is_left {
            node_hash(&sibling, &current)
        } else {
            node_hash(&current, &sibling)
        };
    }
    hex::encode(current) == root_hex
}

fn decode_hash(hex_str: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}
