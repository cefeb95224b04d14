//! Audit entries and chain hash computation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::crypto::canonical;
use crate::error::{AttestorError, Result};

/// Fixed "previous hash" for the first entry of every agent's log.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Type of action being recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionType {
    Inference,
    Delegation,
    Revocation,
    DataAccess,
    ExternalCall,
    IdentityOperation,
    CredentialOperation,
    Custom(String),
}

impl ActionType {
    /// Stable string tag used in persisted entries and hashing.
    pub fn as_tag(&self) -> &str {
        match self {
            Self::Inference => "inference",
            Self::Delegation => "delegation",
            Self::Revocation => "revocation",
            Self::DataAccess => "data_access",
            Self::ExternalCall => "external_call",
            Self::IdentityOperation => "identity_operation",
            Self::CredentialOperation => "credential_operation",
            Self::Custom(s) => s.as_str(),
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "inference" => Self::Inference,
            "delegation" => Self::Delegation,
            "revocation" => Self::Revocation,
            "data_access" => Self::DataAccess,
            "external_call" => Self::ExternalCall,
            "identity_operation" => Self::IdentityOperation,
            "credential_operation" => Self::CredentialOperation,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl Serialize for ActionType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// One append-only audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    /// Position in the agent's log, starting at 0.
    pub sequence: u64,
    pub agent_id: String,
    pub action_type: ActionType,
    pub input_summary: String,
    pub output_summary: String,
    pub rationale: String,
    pub human_override: bool,
    pub timestamp: String,
    /// `SHA-256(previous_chain_hash ‖ canonical(entry without chain_hash))`.
    pub chain_hash: String,
}

impl AuditEntry {
    /// The entry's content payload: everything except `chain_hash`.
    pub fn content_payload(&self) -> Result<Value> {
        let value = serde_json::to_value(self)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
        Ok(canonical::payload_without(&value, &["chain_hash"]))
    }

    /// Recompute this entry's chain hash against a previous hash.
    pub fn compute_chain_hash(&self, previous_hash: &str) -> Result<String> {
        let content = canonical::canonical_bytes(&self.content_payload()?)?;
        let mut hasher = Sha256::new();
        hasher.update(previous_hash.as_bytes());
        hasher.update(&content);
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AuditEntry {
        AuditEntry {
            entry_id: "audit_x".to_string(),
            sequence: 0,
            agent_id: "agent_a".to_string(),
            action_type: ActionType::Inference,
            input_summary: "prompt".to_string(),
            output_summary: "completion".to_string(),
            rationale: "asked".to_string(),
            human_override: false,
            timestamp: crate::time::now_rfc3339(),
            chain_hash: String::new(),
        }
    }

    #[test]
    fn test_action_type_tag_roundtrip() {
        for tag in [
            "inference",
            "delegation",
            "revocation",
            "data_access",
            "external_call",
            "identity_operation",
            "credential_operation",
            "deployment",
        ] {
            assert_eq!(ActionType::from_tag(tag).as_tag(), tag);
        }
    }

    #[test]
    fn test_action_type_serializes_as_string() {
        let json = serde_json::to_string(&ActionType::DataAccess).unwrap();
        assert_eq!(json, r#""data_access""#);
        let back: ActionType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ActionType::DataAccess);
    }

    #[test]
    fn test_content_payload_excludes_chain_hash() {
        let mut entry = sample();
        entry.chain_hash = "abc".to_string();
        let payload = entry.content_payload().unwrap();
        assert!(payload.get("chain_hash").is_none());
        assert_eq!(payload["agent_id"], "agent_a");
    }

    #[test]
    fn test_chain_hash_deterministic() {
        let entry = sample();
        let h1 = entry.compute_chain_hash(GENESIS_HASH).unwrap();
        let h2 = entry.compute_chain_hash(GENESIS_HASH).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_chain_hash_depends_on_previous() {
        let entry = sample();
        let from_genesis = entry.compute_chain_hash(GENESIS_HASH).unwrap();
        let from_other = entry.compute_chain_hash("ff").unwrap();
        assert_ne!(from_genesis, from_other);
    }

    #[test]
    fn test_chain_hash_depends_on_content() {
        let entry = sample();
        let mut tampered = entry.clone();
        tampered.output_summary = "altered".to_string();
        assert_ne!(
            entry.compute_chain_hash(GENESIS_HASH).unwrap(),
            tampered.compute_chain_hash(GENESIS_HASH).unwrap()
        );
    }
}
