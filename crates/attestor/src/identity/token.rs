//! The agent identity token.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::Capability;
use crate::crypto::canonical;
use crate::error::{AttestorError, Result};

/// Identity token format version.
pub const TOKEN_VERSION: &str = "1.0";

/// Fields that may change after signing and are therefore excluded from
/// the signature scope. Including any of these would make revocation
/// break the token's own signature.
pub const MUTABLE_FIELDS: [&str; 4] = ["signature", "revoked", "revocation_reason", "revoked_at"];

/// Who issued a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issuer {
    pub name: String,
    pub did: String,
}

/// A signed identity token for an autonomous agent.
///
/// Immutable once signed except for the revocation fields, which are
/// never part of the signed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentityToken {
    pub version: String,
    pub agent_id: String,
    pub display_name: String,
    pub description: String,
    pub capabilities: Vec<Capability>,
    pub issuer: Issuer,
    pub created_at: String,
    pub expires_at: String,
    pub revoked: bool,
    pub revocation_reason: Option<String>,
    pub revoked_at: Option<String>,
    pub signature: Option<String>,
}

impl AgentIdentityToken {
    /// The JSON payload covered by the signature: every field except
    /// the mutable ones.
    pub fn signable_payload(&self) -> Result<Value> {
        let value = serde_json::to_value(self)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
        Ok(canonical::payload_without(&value, &MUTABLE_FIELDS))
    }

    /// Has the token passed its expiry timestamp?
    pub fn is_expired(&self) -> bool {
        !crate::time::is_future(&self.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> AgentIdentityToken {
        AgentIdentityToken {
            version: TOKEN_VERSION.to_string(),
            agent_id: "agent_test".to_string(),
            display_name: "Test Agent".to_string(),
            description: String::new(),
            capabilities: vec![Capability::new("read:data")],
            issuer: Issuer {
                name: "self".to_string(),
                did: "did:key:zStub".to_string(),
            },
            created_at: crate::time::now_rfc3339(),
            expires_at: crate::time::rfc3339_after_days(30),
            revoked: false,
            revocation_reason: None,
            revoked_at: None,
            signature: Some("sig".to_string()),
        }
    }

    #[test]
    fn test_signable_payload_excludes_mutable_fields() {
        let mut token = sample();
        let before = token.signable_payload().unwrap();

        token.revoked = true;
        token.revocation_reason = Some("compromised".to_string());
        token.revoked_at = Some(crate::time::now_rfc3339());
        token.signature = Some("other".to_string());
        let after = token.signable_payload().unwrap();

        assert_eq!(before, after);
        assert!(before.get("signature").is_none());
        assert!(before.get("revoked").is_none());
    }

    #[test]
    fn test_signable_payload_keeps_capabilities() {
        let token = sample();
        let payload = token.signable_payload().unwrap();
        assert_eq!(payload["capabilities"], json!(["read:data"]));
    }

    #[test]
    fn test_is_expired() {
        let mut token = sample();
        assert!(!token.is_expired());
        token.expires_at = crate::time::rfc3339_after_days(-1);
        assert!(token.is_expired());
    }
}
