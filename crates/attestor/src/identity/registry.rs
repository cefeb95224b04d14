//! Identity registry — issues, verifies, revokes, and translates agent
//! identity tokens.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::audit::{ActionType, AuditChain};
use crate::capability::Capability;
use crate::crypto::canonical;
use crate::crypto::random::random_id;
use crate::did::document::did_key_to_verifying_key;
use crate::error::{AttestorError, Result};
use crate::key_manager::KeyManager;
use crate::storage::Repository;

use super::token::{AgentIdentityToken, Issuer, TOKEN_VERSION};
use super::translate;

/// Individual verification checks for an identity token.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityChecks {
    pub exists: bool,
    pub not_revoked: bool,
    pub not_expired: bool,
    pub signature_valid: bool,
}

/// Verification report. `valid` is the conjunction of every check.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityVerification {
    pub valid: bool,
    pub agent_id: String,
    pub display_name: Option<String>,
    pub checks: IdentityChecks,
}

/// Issues and manages agent identity tokens.
pub struct IdentityRegistry {
    key_manager: Arc<KeyManager>,
    store: Arc<dyn Repository>,
    audit: Arc<AuditChain>,
    default_expiry_days: i64,
}

impl IdentityRegistry {
    pub fn new(
        key_manager: Arc<KeyManager>,
        store: Arc<dyn Repository>,
        audit: Arc<AuditChain>,
        default_expiry_days: i64,
    ) -> Self {
        Self {
            key_manager,
            store,
            audit,
            default_expiry_days,
        }
    }

    /// Issue a new signed identity token.
    pub fn create(
        &self,
        display_name: &str,
        capabilities: Vec<Capability>,
        description: &str,
        issuer_name: &str,
        expiry_days: Option<i64>,
    ) -> Result<AgentIdentityToken> {
        let agent_id = random_id("agent");
        let days = expiry_days.unwrap_or(self.default_expiry_days);

        let mut token = AgentIdentityToken {
            version: TOKEN_VERSION.to_string(),
            agent_id: agent_id.clone(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            capabilities,
            issuer: Issuer {
                name: if issuer_name.is_empty() {
                    "self".to_string()
                } else {
                    issuer_name.to_string()
                },
                did: self.key_manager.did()?,
            },
            created_at: crate::time::now_rfc3339(),
            expires_at: crate::time::rfc3339_after_days(days),
            revoked: false,
            revocation_reason: None,
            revoked_at: None,
            signature: None,
        };

        token.signature = Some(self.key_manager.sign_payload(&token.signable_payload()?)?);
        self.put(&token)?;

        self.audit.append(
            &agent_id,
            ActionType::IdentityOperation,
            &format!("create identity {display_name:?}"),
            &format!("issued {agent_id}"),
            "",
            false,
        )?;

        log::info!("issued identity token {agent_id} ({display_name})");
        Ok(token)
    }

    /// Fetch a token by agent id.
    pub fn get(&self, agent_id: &str) -> Result<Option<AgentIdentityToken>> {
        match self.store.get(agent_id)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| AttestorError::SerializationError(e.to_string())),
            None => Ok(None),
        }
    }

    /// List tokens, optionally including revoked ones.
    pub fn list(&self, include_revoked: bool, limit: usize) -> Result<Vec<AgentIdentityToken>> {
        let mut results = Vec::new();
        for value in self.store.list("")? {
            let token: AgentIdentityToken = serde_json::from_value(value)
                .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
            if !include_revoked && token.revoked {
                continue;
            }
            results.push(token);
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// Revoke a token. Idempotent: revoking an already-revoked token
    /// returns it unchanged.
    pub fn revoke(&self, agent_id: &str, reason: &str) -> Result<AgentIdentityToken> {
        let mut token = self
            .get(agent_id)?
            .ok_or_else(|| AttestorError::NotFound(format!("identity {agent_id}")))?;

        if token.revoked {
            return Ok(token);
        }

        token.revoked = true;
        token.revocation_reason = Some(reason.to_string());
        token.revoked_at = Some(crate::time::now_rfc3339());
        self.put(&token)?;

        self.audit.append(
            agent_id,
            ActionType::Revocation,
            &format!("revoke identity: {reason}"),
            "revoked",
            "",
            false,
        )?;

        log::info!("revoked identity token {agent_id}: {reason}");
        Ok(token)
    }

    /// Verify a token: existence, revocation, expiry, signature.
    ///
    /// Never errors for an invalid token; a missing record short-circuits
    /// every later check to false.
    pub fn verify(&self, agent_id: &str) -> Result<IdentityVerification> {
        let Some(token) = self.get(agent_id)? else {
            return Ok(IdentityVerification {
                valid: false,
                agent_id: agent_id.to_string(),
                display_name: None,
                checks: IdentityChecks {
                    exists: false,
                    not_revoked: false,
                    not_expired: false,
                    signature_valid: false,
                },
            });
        };

        let not_revoked = !token.revoked;
        let not_expired = !token.is_expired();

        // The issuer DID is self-certifying: the verification key comes
        // from the token itself, not from local trust.
        let signature_valid = match (&token.signature, did_key_to_verifying_key(&token.issuer.did))
        {
            (Some(sig), Ok(key)) => token
                .signable_payload()
                .map(|payload| canonical::verify_payload(&key, &payload, sig))
                .unwrap_or(false),
            _ => false,
        };

        let checks = IdentityChecks {
            exists: true,
            not_revoked,
            not_expired,
            signature_valid,
        };
        Ok(IdentityVerification {
            valid: not_revoked && not_expired && signature_valid,
            agent_id: agent_id.to_string(),
            display_name: Some(token.display_name),
            checks,
        })
    }

    /// Project a token into another format (§ translate targets).
    pub fn translate(&self, agent_id: &str, target_format: &str) -> Result<Value> {
        let token = self
            .get(agent_id)?
            .ok_or_else(|| AttestorError::NotFound(format!("identity {agent_id}")))?;
        translate::translate(&token, target_format)
    }

    /// Delete the identity record itself. Cross-store cascade lives on
    /// the composition root.
    pub fn delete(&self, agent_id: &str) -> Result<bool> {
        self.store.delete(agent_id)
    }

    fn put(&self, token: &AgentIdentityToken) -> Result<()> {
        let value = serde_json::to_value(token)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
        self.store.put(&token.agent_id, value)
    }
}
