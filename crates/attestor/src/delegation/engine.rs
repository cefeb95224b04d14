//! Delegation issuance and chain-of-trust verification.
//!
//! State machine per token: `active → {expired | revoked}` (terminal).
//! Attenuation is enforced at creation time — a delegation that widens
//! its parent's capability set fails with `CapabilityExceeded` — and
//! re-checked at every link during verification.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::audit::{ActionType, AuditChain};
use crate::capability::{uncovered, Capability};
use crate::crypto::random::random_id;
use crate::error::{AttestorError, Result};
use crate::identity::IdentityRegistry;
use crate::key_manager::KeyManager;
use crate::storage::Repository;

use super::token::{decode_token, encode_token, DelegationClaims, DelegationRecord};

/// Which side of a delegation an agent sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Issuer,
    Audience,
    Any,
}

/// Result of verifying a delegation token and its ancestor chain.
#[derive(Debug, Clone, Serialize)]
pub struct DelegationVerification {
    pub valid: bool,
    /// Why verification failed; `None` when valid.
    pub reason: Option<String>,
    /// Decoded claims, present whenever the token parses.
    pub claims: Option<DelegationClaims>,
}

impl DelegationVerification {
    fn invalid(reason: impl Into<String>, claims: Option<DelegationClaims>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            claims,
        }
    }
}

/// Issues and verifies capability delegations.
pub struct DelegationEngine {
    key_manager: Arc<KeyManager>,
    identities: Arc<IdentityRegistry>,
    store: Arc<dyn Repository>,
    audit: Arc<AuditChain>,
}

impl DelegationEngine {
    pub fn new(
        key_manager: Arc<KeyManager>,
        identities: Arc<IdentityRegistry>,
        store: Arc<dyn Repository>,
        audit: Arc<AuditChain>,
    ) -> Self {
        Self {
            key_manager,
            identities,
            store,
            audit,
        }
    }

    /// Issue a delegation from `issuer_id` to `audience_id`.
    ///
    /// With a parent token the new capability set must be covered by the
    /// parent's; for a root delegation it must be covered by the
    /// issuer's own identity token capabilities. Violations fail with
    /// `CapabilityExceeded` naming the offending capabilities.
    pub fn create(
        &self,
        issuer_id: &str,
        audience_id: &str,
        capabilities: Vec<Capability>,
        expiry_hours: i64,
        parent_token: Option<&str>,
    ) -> Result<DelegationRecord> {
        let issuer = self
            .identities
            .get(issuer_id)?
            .ok_or_else(|| AttestorError::NotFound(format!("issuer identity {issuer_id}")))?;
        if self.identities.get(audience_id)?.is_none() {
            return Err(AttestorError::NotFound(format!(
                "audience identity {audience_id}"
            )));
        }

        // Determine the capability set the issuer may attenuate from
        let (granted, parent_id) = match parent_token {
            Some(token) => {
                let verification = self.verify(token)?;
                let Some(claims) = verification.claims else {
                    return Err(AttestorError::InvalidToken(
                        "parent token is structurally invalid".into(),
                    ));
                };
                if !verification.valid {
                    if crate::time::now_unix() >= claims.exp {
                        return Err(AttestorError::Expired(format!(
                            "parent delegation {}",
                            claims.jti
                        )));
                    }
                    return Err(AttestorError::InvalidToken(format!(
                        "parent delegation {} is invalid: {}",
                        claims.jti,
                        verification.reason.as_deref().unwrap_or("unknown")
                    )));
                }
                if claims.aud != issuer_id {
                    return Err(AttestorError::InvalidToken(format!(
                        "issuer {issuer_id} is not the audience of parent {}",
                        claims.jti
                    )));
                }
                (claims.att.clone(), Some(claims.jti))
            }
            None => (issuer.capabilities.clone(), None),
        };

        let exceeded = uncovered(&granted, &capabilities);
        if !exceeded.is_empty() {
            return Err(AttestorError::CapabilityExceeded {
                capabilities: exceeded.into_iter().map(|c| c.0).collect(),
            });
        }

        let now = crate::time::now_unix();
        let exp = crate::time::unix_after_hours(expiry_hours);
        let claims = DelegationClaims {
            iss: issuer_id.to_string(),
            aud: audience_id.to_string(),
            iat: now,
            nbf: now,
            exp,
            att: capabilities.clone(),
            jti: random_id("deleg"),
            prf: parent_id.clone(),
        };

        let token = encode_token(&claims, |input| self.key_manager.sign_jwt(input))?;

        let record = DelegationRecord {
            delegation_id: claims.jti.clone(),
            token,
            issuer: issuer_id.to_string(),
            audience: audience_id.to_string(),
            capabilities,
            parent: parent_id,
            created_at: crate::time::now_rfc3339(),
            expires_at: crate::time::unix_to_rfc3339(exp),
            revoked: false,
            revocation_reason: None,
            revoked_at: None,
        };
        self.put(&record)?;

        self.audit.append(
            issuer_id,
            ActionType::Delegation,
            &format!("delegate to {audience_id}"),
            &format!("issued {}", record.delegation_id),
            "",
            false,
        )?;

        log::info!(
            "issued delegation {} ({issuer_id} → {audience_id})",
            record.delegation_id
        );
        Ok(record)
    }

    /// Verify a delegation token and its entire ancestor chain.
    ///
    /// Never errors for an invalid token: structural problems, bad
    /// signatures, expiry, revoked ancestors, and attenuation
    /// violations all come back as `valid: false` with a reason.
    pub fn verify(&self, token: &str) -> Result<DelegationVerification> {
        let decoded = match decode_token(token) {
            Ok(decoded) => decoded,
            Err(e) => return Ok(DelegationVerification::invalid(e.to_string(), None)),
        };
        let claims = decoded.claims.clone();

        let signer = self.key_manager.verifying_key()?;
        if !decoded.signature_valid(&signer) {
            return Ok(DelegationVerification::invalid(
                "signature verification failed",
                Some(claims),
            ));
        }

        let now = crate::time::now_unix();
        if now < claims.nbf {
            return Ok(DelegationVerification::invalid(
                "token is not yet valid (nbf)",
                Some(claims),
            ));
        }
        if now >= claims.exp {
            return Ok(DelegationVerification::invalid(
                "token has expired",
                Some(claims),
            ));
        }

        // Walk the ancestor chain: this token's record, its parent,
        // and so on up to the root. Every link must be unrevoked,
        // unexpired, and properly attenuated.
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = match self.get(&claims.jti)? {
            Some(record) => record,
            None => {
                return Ok(DelegationVerification::invalid(
                    format!("no record of delegation {}", claims.jti),
                    Some(claims),
                ))
            }
        };

        loop {
            if !visited.insert(current.delegation_id.clone()) {
                return Ok(DelegationVerification::invalid(
                    format!("delegation chain cycle at {}", current.delegation_id),
                    Some(claims),
                ));
            }

            if current.revoked {
                let reason = if current.delegation_id == claims.jti {
                    format!("delegation {} is revoked", current.delegation_id)
                } else {
                    format!("ancestor delegation {} is revoked", current.delegation_id)
                };
                return Ok(DelegationVerification::invalid(reason, Some(claims)));
            }

            if !crate::time::is_future(&current.expires_at) {
                let reason = if current.delegation_id == claims.jti {
                    format!("delegation {} has expired", current.delegation_id)
                } else {
                    format!("ancestor delegation {} has expired", current.delegation_id)
                };
                return Ok(DelegationVerification::invalid(reason, Some(claims)));
            }

            let Some(parent_id) = current.parent.clone() else {
                break;
            };
            let Some(parent) = self.get(&parent_id)? else {
                return Ok(DelegationVerification::invalid(
                    format!("missing ancestor delegation {parent_id}"),
                    Some(claims),
                ));
            };

            // The chain principal must line up: this link's issuer is
            // the parent's audience.
            if current.issuer != parent.audience {
                return Ok(DelegationVerification::invalid(
                    format!(
                        "issuer {} of {} is not the audience of parent {}",
                        current.issuer, current.delegation_id, parent.delegation_id
                    ),
                    Some(claims),
                ));
            }

            let exceeded = uncovered(&parent.capabilities, &current.capabilities);
            if !exceeded.is_empty() {
                return Ok(DelegationVerification::invalid(
                    format!(
                        "delegation {} exceeds parent {}: {}",
                        current.delegation_id,
                        parent.delegation_id,
                        exceeded
                            .iter()
                            .map(|c| c.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    Some(claims),
                ));
            }

            current = parent;
        }

        Ok(DelegationVerification {
            valid: true,
            reason: None,
            claims: Some(claims),
        })
    }

    /// Mark a delegation revoked.
    ///
    /// Revoking twice returns `AlreadyRevoked` — informational, not
    /// fatal; no state changes. Decisions made before revocation are
    /// not retroactively altered: only future `verify` calls fail.
    pub fn revoke(&self, delegation_id: &str, reason: &str) -> Result<DelegationRecord> {
        let mut record = self
            .get(delegation_id)?
            .ok_or_else(|| AttestorError::NotFound(format!("delegation {delegation_id}")))?;

        if record.revoked {
            return Err(AttestorError::AlreadyRevoked(format!(
                "delegation {delegation_id}"
            )));
        }

        record.revoked = true;
        record.revocation_reason = Some(reason.to_string());
        record.revoked_at = Some(crate::time::now_rfc3339());
        self.put(&record)?;

        self.audit.append(
            &record.issuer,
            ActionType::Revocation,
            &format!("revoke delegation {delegation_id}: {reason}"),
            "revoked",
            "",
            false,
        )?;

        log::info!("revoked delegation {delegation_id}: {reason}");
        Ok(record)
    }

    /// List delegations an agent participates in.
    pub fn list(
        &self,
        agent_id: &str,
        role: Role,
        include_expired: bool,
    ) -> Result<Vec<DelegationRecord>> {
        let mut results = Vec::new();
        for value in self.store.list("")? {
            let record: DelegationRecord = serde_json::from_value(value)
                .map_err(|e| AttestorError::SerializationError(e.to_string()))?;

            let matches = match role {
                Role::Issuer => record.issuer == agent_id,
                Role::Audience => record.audience == agent_id,
                Role::Any => record.issuer == agent_id || record.audience == agent_id,
            };
            if !matches {
                continue;
            }
            if !include_expired && !crate::time::is_future(&record.expires_at) {
                continue;
            }
            results.push(record);
        }
        Ok(results)
    }

    /// Fetch a delegation record by id.
    pub fn get(&self, delegation_id: &str) -> Result<Option<DelegationRecord>> {
        match self.store.get(delegation_id)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| AttestorError::SerializationError(e.to_string())),
            None => Ok(None),
        }
    }

    /// Delete every delegation where the agent is issuer or audience.
    /// Returns the number removed.
    pub fn delete_agent_delegations(&self, agent_id: &str) -> Result<usize> {
        let mut deleted = 0;
        for record in self.list(agent_id, Role::Any, true)? {
            if self.store.delete(&record.delegation_id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn put(&self, record: &DelegationRecord) -> Result<()> {
        let value = serde_json::to_value(record)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
        self.store.put(&record.delegation_id, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        identities: Arc<IdentityRegistry>,
        engine: DelegationEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let km = Arc::new(KeyManager::new(dir.path().join("key.json"), None));
        let audit = Arc::new(AuditChain::new(Arc::new(MemoryStore::new())));
        let identities = Arc::new(IdentityRegistry::new(
            Arc::clone(&km),
            Arc::new(MemoryStore::new()),
            Arc::clone(&audit),
            365,
        ));
        let engine = DelegationEngine::new(
            km,
            Arc::clone(&identities),
            Arc::new(MemoryStore::new()),
            audit,
        );
        Fixture {
            _dir: dir,
            identities,
            engine,
        }
    }

    fn caps(uris: &[&str]) -> Vec<Capability> {
        uris.iter().map(|u| Capability::new(*u)).collect()
    }

    fn agent(fx: &Fixture, name: &str, capabilities: &[&str]) -> String {
        fx.identities
            .create(name, caps(capabilities), "", "", None)
            .unwrap()
            .agent_id
    }

    #[test]
    fn test_create_and_verify_root_delegation() {
        let fx = fixture();
        let a = agent(&fx, "A", &["x", "y"]);
        let b = agent(&fx, "B", &[]);

        let record = fx.engine.create(&a, &b, caps(&["x"]), 24, None).unwrap();
        assert!(record.delegation_id.starts_with("deleg_"));

        let verification = fx.engine.verify(&record.token).unwrap();
        assert!(verification.valid, "{:?}", verification.reason);
        let claims = verification.claims.unwrap();
        assert_eq!(claims.att, caps(&["x"]));
        assert_eq!(claims.iss, a);
        assert_eq!(claims.aud, b);
    }

    #[test]
    fn test_create_rejects_unknown_principals() {
        let fx = fixture();
        let a = agent(&fx, "A", &["x"]);
        assert!(matches!(
            fx.engine.create("agent_ghost", &a, caps(&["x"]), 24, None),
            Err(AttestorError::NotFound(_))
        ));
        assert!(matches!(
            fx.engine.create(&a, "agent_ghost", caps(&["x"]), 24, None),
            Err(AttestorError::NotFound(_))
        ));
    }

    #[test]
    fn test_root_attenuation_enforced_at_creation() {
        let fx = fixture();
        let a = agent(&fx, "A", &["read:data"]);
        let b = agent(&fx, "B", &[]);

        let err = fx
            .engine
            .create(&a, &b, caps(&["read:data", "write:data"]), 24, None)
            .unwrap_err();
        match err {
            AttestorError::CapabilityExceeded { capabilities } => {
                assert_eq!(capabilities, vec!["write:data".to_string()]);
            }
            other => panic!("expected CapabilityExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_wildcard_attenuation() {
        let fx = fixture();
        let a = agent(&fx, "A", &["read:*"]);
        let b = agent(&fx, "B", &[]);
        // read:calendar is covered by read:*
        let record = fx
            .engine
            .create(&a, &b, caps(&["read:calendar"]), 24, None)
            .unwrap();
        assert!(fx.engine.verify(&record.token).unwrap().valid);
    }

    #[test]
    fn test_chained_delegation_and_ancestor_revocation() {
        let fx = fixture();
        let a = agent(&fx, "A", &["x", "y"]);
        let b = agent(&fx, "B", &[]);
        let c = agent(&fx, "C", &[]);

        let a_to_b = fx.engine.create(&a, &b, caps(&["x"]), 24, None).unwrap();
        let b_to_c = fx
            .engine
            .create(&b, &c, caps(&["x"]), 4, Some(&a_to_b.token))
            .unwrap();

        let verification = fx.engine.verify(&b_to_c.token).unwrap();
        assert!(verification.valid);
        assert_eq!(verification.claims.unwrap().att, caps(&["x"]));

        // Revoking the ancestor invalidates the descendant
        fx.engine.revoke(&a_to_b.delegation_id, "trust withdrawn").unwrap();
        let verification = fx.engine.verify(&b_to_c.token).unwrap();
        assert!(!verification.valid);
        let reason = verification.reason.unwrap();
        assert!(reason.contains(&a_to_b.delegation_id), "reason: {reason}");
        assert!(reason.contains("ancestor"), "reason: {reason}");
    }

    #[test]
    fn test_chain_attenuation_fails_at_creation_not_verification() {
        let fx = fixture();
        let a = agent(&fx, "A", &["x", "y"]);
        let b = agent(&fx, "B", &[]);
        let c = agent(&fx, "C", &[]);

        let a_to_b = fx.engine.create(&a, &b, caps(&["x"]), 24, None).unwrap();
        let err = fx
            .engine
            .create(&b, &c, caps(&["x", "y"]), 4, Some(&a_to_b.token))
            .unwrap_err();
        match err {
            AttestorError::CapabilityExceeded { capabilities } => {
                assert_eq!(capabilities, vec!["y".to_string()]);
            }
            other => panic!("expected CapabilityExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_parent_must_be_addressed_to_issuer() {
        let fx = fixture();
        let a = agent(&fx, "A", &["x"]);
        let b = agent(&fx, "B", &[]);
        let c = agent(&fx, "C", &[]);

        let a_to_b = fx.engine.create(&a, &b, caps(&["x"]), 24, None).unwrap();
        // C is not the audience of A→B, so C cannot chain from it
        assert!(matches!(
            fx.engine.create(&c, &b, caps(&["x"]), 4, Some(&a_to_b.token)),
            Err(AttestorError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_verify_garbage_token_reports_not_errors() {
        let fx = fixture();
        let verification = fx.engine.verify("definitely-not-a-jwt").unwrap();
        assert!(!verification.valid);
        assert!(verification.reason.is_some());
        assert!(verification.claims.is_none());
    }

    #[test]
    fn test_verify_expired_token() {
        let fx = fixture();
        let a = agent(&fx, "A", &["x"]);
        let b = agent(&fx, "B", &[]);
        let record = fx.engine.create(&a, &b, caps(&["x"]), -1, None).unwrap();
        let verification = fx.engine.verify(&record.token).unwrap();
        assert!(!verification.valid);
        assert!(verification.reason.unwrap().contains("expired"));
    }

    #[test]
    fn test_create_with_expired_parent() {
        let fx = fixture();
        let a = agent(&fx, "A", &["x"]);
        let b = agent(&fx, "B", &[]);
        let c = agent(&fx, "C", &[]);

        let a_to_b = fx.engine.create(&a, &b, caps(&["x"]), -1, None).unwrap();
        assert!(matches!(
            fx.engine.create(&b, &c, caps(&["x"]), 4, Some(&a_to_b.token)),
            Err(AttestorError::Expired(_))
        ));
    }

    #[test]
    fn test_revoke_twice_is_already_revoked() {
        let fx = fixture();
        let a = agent(&fx, "A", &["x"]);
        let b = agent(&fx, "B", &[]);
        let record = fx.engine.create(&a, &b, caps(&["x"]), 24, None).unwrap();

        fx.engine.revoke(&record.delegation_id, "first").unwrap();
        assert!(matches!(
            fx.engine.revoke(&record.delegation_id, "again"),
            Err(AttestorError::AlreadyRevoked(_))
        ));
    }

    #[test]
    fn test_list_by_role() {
        let fx = fixture();
        let a = agent(&fx, "A", &["x"]);
        let b = agent(&fx, "B", &["y"]);
        fx.engine.create(&a, &b, caps(&["x"]), 24, None).unwrap();
        fx.engine.create(&b, &a, caps(&["y"]), 24, None).unwrap();

        assert_eq!(fx.engine.list(&a, Role::Issuer, true).unwrap().len(), 1);
        assert_eq!(fx.engine.list(&a, Role::Audience, true).unwrap().len(), 1);
        assert_eq!(fx.engine.list(&a, Role::Any, true).unwrap().len(), 2);
    }

    #[test]
    fn test_list_filters_expired() {
        let fx = fixture();
        let a = agent(&fx, "A", &["x"]);
        let b = agent(&fx, "B", &[]);
        fx.engine.create(&a, &b, caps(&["x"]), -1, None).unwrap();
        assert_eq!(fx.engine.list(&a, Role::Any, false).unwrap().len(), 0);
        assert_eq!(fx.engine.list(&a, Role::Any, true).unwrap().len(), 1);
    }
}
