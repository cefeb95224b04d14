//! Credential issuance, verification, revocation, and presentation.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::audit::{ActionType, AuditChain};
use crate::crypto::canonical;
use crate::crypto::random::random_id;
use crate::did::resolver::DidResolver;
use crate::error::{AttestorError, Result};
use crate::key_manager::KeyManager;
use crate::storage::Repository;

use super::credential::{
    CredentialIssuer, CredentialStatus, Proof, VerifiableCredential, VC_CONTEXT,
};
use super::presentation::{
    PresentationChecks, PresentationVerification, VerifiablePresentation,
};

/// Per-check results for a credential.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialChecks {
    pub exists: bool,
    pub structure_valid: bool,
    pub signature_valid: bool,
    pub not_expired: bool,
    pub not_revoked: bool,
}

impl CredentialChecks {
    fn all_false() -> Self {
        Self {
            exists: false,
            structure_valid: false,
            signature_valid: false,
            not_expired: false,
            not_revoked: false,
        }
    }

    fn all_pass(&self) -> bool {
        self.exists
            && self.structure_valid
            && self.signature_valid
            && self.not_expired
            && self.not_revoked
    }
}

/// Verification report for a credential.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialVerification {
    pub valid: bool,
    pub credential_id: String,
    pub checks: CredentialChecks,
}

/// Issues and verifies credentials and presentations.
pub struct CredentialEngine {
    key_manager: Arc<KeyManager>,
    resolver: Arc<DidResolver>,
    store: Arc<dyn Repository>,
    audit: Arc<AuditChain>,
}

impl CredentialEngine {
    pub fn new(
        key_manager: Arc<KeyManager>,
        resolver: Arc<DidResolver>,
        store: Arc<dyn Repository>,
        audit: Arc<AuditChain>,
    ) -> Self {
        Self {
            key_manager,
            resolver,
            store,
            audit,
        }
    }

    /// Issue a signed credential about `subject_id`.
    pub fn issue(
        &self,
        subject_id: &str,
        credential_type: &str,
        issuer_name: &str,
        claims: Map<String, Value>,
        expiry_days: i64,
    ) -> Result<VerifiableCredential> {
        let issuer_did = self.key_manager.did()?;
        let now = crate::time::now_rfc3339();

        let mut subject = Map::new();
        subject.insert("id".to_string(), Value::String(subject_id.to_string()));
        for (key, value) in claims {
            // The subject id is authoritative; a claim may not override it
            if key != "id" {
                subject.insert(key, value);
            }
        }

        let mut credential = VerifiableCredential {
            context: VC_CONTEXT.iter().map(|s| s.to_string()).collect(),
            id: random_id("urn:attestor:cred"),
            types: vec![
                "VerifiableCredential".to_string(),
                credential_type.to_string(),
            ],
            issuer: CredentialIssuer {
                id: issuer_did.clone(),
                name: issuer_name.to_string(),
            },
            issuance_date: now.clone(),
            expiration_date: crate::time::rfc3339_after_days(expiry_days),
            credential_subject: subject,
            credential_status: CredentialStatus::active(),
            proof: None,
        };

        let signature = self
            .key_manager
            .sign_payload(&credential.signable_payload()?)?;
        credential.proof = Some(Proof {
            proof_type: "Ed25519Signature2020".to_string(),
            created: now,
            verification_method: format!("{issuer_did}#key-1"),
            proof_purpose: "assertionMethod".to_string(),
            proof_value: signature,
            challenge: None,
            domain: None,
        });

        self.put(&credential)?;

        self.audit.append(
            subject_id,
            ActionType::CredentialOperation,
            &format!("issue {credential_type}"),
            &format!("issued {}", credential.id),
            "",
            false,
        )?;

        log::info!("issued credential {} for {subject_id}", credential.id);
        Ok(credential)
    }

    /// Fetch a stored credential by id.
    pub fn get(&self, credential_id: &str) -> Result<Option<VerifiableCredential>> {
        match self.store.get(credential_id)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| AttestorError::SerializationError(e.to_string())),
            None => Ok(None),
        }
    }

    /// List stored credentials with optional filters.
    pub fn list(
        &self,
        subject_id: Option<&str>,
        credential_type: Option<&str>,
        valid_only: bool,
        limit: usize,
    ) -> Result<Vec<VerifiableCredential>> {
        let mut results = Vec::new();
        for value in self.store.list("")? {
            let cred: VerifiableCredential = serde_json::from_value(value)
                .map_err(|e| AttestorError::SerializationError(e.to_string()))?;

            if let Some(subject) = subject_id {
                if cred.subject_id() != Some(subject) {
                    continue;
                }
            }
            if let Some(wanted) = credential_type {
                if !cred.types.iter().any(|t| t == wanted) {
                    continue;
                }
            }
            if valid_only && (cred.credential_status.revoked || cred.is_expired()) {
                continue;
            }
            results.push(cred);
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// Verify a stored credential.
    ///
    /// Never errors for an invalid credential; a missing record
    /// short-circuits every check to false.
    pub fn verify(&self, credential_id: &str) -> Result<CredentialVerification> {
        let Some(credential) = self.get(credential_id)? else {
            return Ok(CredentialVerification {
                valid: false,
                credential_id: credential_id.to_string(),
                checks: CredentialChecks::all_false(),
            });
        };
        let checks = self.run_checks(&credential);
        Ok(CredentialVerification {
            valid: checks.all_pass(),
            credential_id: credential_id.to_string(),
            checks,
        })
    }

    /// Verify a caller-supplied credential with no local record.
    ///
    /// The issuer DID is resolved through the DID resolver to obtain
    /// the verification key — nothing is trusted from local storage.
    pub fn verify_external(&self, credential_json: &Value) -> Result<CredentialVerification> {
        let credential: VerifiableCredential = match serde_json::from_value(credential_json.clone())
        {
            Ok(cred) => cred,
            Err(_) => {
                return Ok(CredentialVerification {
                    valid: false,
                    credential_id: credential_json
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    checks: CredentialChecks::all_false(),
                })
            }
        };
        let checks = self.run_checks(&credential);
        Ok(CredentialVerification {
            valid: checks.all_pass(),
            credential_id: credential.id,
            checks,
        })
    }

    fn run_checks(&self, credential: &VerifiableCredential) -> CredentialChecks {
        let structure_valid = credential.structure_valid();
        let not_revoked = !credential.credential_status.revoked;
        let not_expired = !credential.is_expired();
        let signature_valid = structure_valid && self.signature_valid(credential);
        CredentialChecks {
            exists: true,
            structure_valid,
            signature_valid,
            not_expired,
            not_revoked,
        }
    }

    fn signature_valid(&self, credential: &VerifiableCredential) -> bool {
        let Some(proof) = credential.proof.as_ref() else {
            return false;
        };
        let Ok(document) = self.resolver.resolve(&credential.issuer.id) else {
            return false;
        };
        let Ok(key) = document.verifying_key() else {
            return false;
        };
        let Ok(payload) = credential.signable_payload() else {
            return false;
        };
        canonical::verify_payload(&key, &payload, &proof.proof_value)
    }

    /// Revoke a credential. The proof signature stays valid by
    /// construction; only the status flips.
    ///
    /// Revoking twice returns `AlreadyRevoked` — informational, not
    /// fatal; no state changes.
    pub fn revoke(&self, credential_id: &str, reason: &str) -> Result<VerifiableCredential> {
        let mut credential = self
            .get(credential_id)?
            .ok_or_else(|| AttestorError::NotFound(format!("credential {credential_id}")))?;

        if credential.credential_status.revoked {
            return Err(AttestorError::AlreadyRevoked(format!(
                "credential {credential_id}"
            )));
        }

        credential.credential_status = CredentialStatus {
            status_type: credential.credential_status.status_type.clone(),
            revoked: true,
            revocation_reason: Some(reason.to_string()),
            revoked_at: Some(crate::time::now_rfc3339()),
        };
        self.put(&credential)?;

        if let Some(subject) = credential.subject_id() {
            self.audit.append(
                subject,
                ActionType::Revocation,
                &format!("revoke credential {credential_id}: {reason}"),
                "revoked",
                "",
                false,
            )?;
        }

        log::info!("revoked credential {credential_id}: {reason}");
        Ok(credential)
    }

    /// Bundle credentials into a presentation addressed to
    /// `audience_did`, signed by the holder with `challenge` in scope.
    ///
    /// Fails with `SubjectMismatch` if the holder is not the subject of
    /// every listed credential.
    pub fn create_presentation(
        &self,
        holder_id: &str,
        credential_ids: &[String],
        audience_did: &str,
        challenge: &str,
    ) -> Result<VerifiablePresentation> {
        let mut credentials = Vec::with_capacity(credential_ids.len());
        for credential_id in credential_ids {
            let credential = self
                .get(credential_id)?
                .ok_or_else(|| AttestorError::NotFound(format!("credential {credential_id}")))?;
            if credential.subject_id() != Some(holder_id) {
                return Err(AttestorError::SubjectMismatch(format!(
                    "credential {credential_id} is not about holder {holder_id}"
                )));
            }
            credentials.push(credential);
        }

        let mut vp = VerifiablePresentation::new(
            random_id("urn:attestor:vp"),
            holder_id.to_string(),
            credentials,
        );
        vp.domain = Some(audience_did.to_string());
        vp.challenge = Some(challenge.to_string());

        let signature = self.key_manager.sign_payload(&vp.signable_payload()?)?;
        let holder_did = self.key_manager.did()?;
        vp.proof = Some(Proof {
            proof_type: "Ed25519Signature2020".to_string(),
            created: crate::time::now_rfc3339(),
            verification_method: format!("{holder_did}#key-1"),
            proof_purpose: "authentication".to_string(),
            proof_value: signature,
            challenge: Some(challenge.to_string()),
            domain: Some(audience_did.to_string()),
        });

        Ok(vp)
    }

    /// Verify a presentation: envelope signature, replay bindings, and
    /// every embedded credential independently.
    pub fn verify_presentation(&self, vp_json: &Value) -> Result<PresentationVerification> {
        let vp: VerifiablePresentation = match serde_json::from_value(vp_json.clone()) {
            Ok(vp) => vp,
            Err(_) => {
                return Ok(PresentationVerification {
                    valid: false,
                    holder: None,
                    checks: PresentationChecks::all_false(),
                })
            }
        };

        let structure_valid = vp.structure_valid();
        let challenge_present = vp.challenge.as_deref().is_some_and(|c| !c.is_empty());
        let domain_present = vp.domain.as_deref().is_some_and(|d| !d.is_empty());
        let holder_matches_subjects = vp.holder_matches_subjects();

        let vp_signature_valid = vp.proof.as_ref().is_some_and(|proof| {
            let Ok(document) = self.resolver.resolve(proof.controller_did()) else {
                return false;
            };
            let Ok(key) = document.verifying_key() else {
                return false;
            };
            let Ok(payload) = vp.signable_payload() else {
                return false;
            };
            canonical::verify_payload(&key, &payload, &proof.proof_value)
        });

        // Embedded credentials are snapshots: revocation status is
        // re-read from the local registry when a record exists there.
        let credentials_valid = !vp.verifiable_credential.is_empty()
            && vp.verifiable_credential.iter().all(|cred| {
                let mut checks = self.run_checks(cred);
                if let Ok(Some(current)) = self.get(&cred.id) {
                    checks.not_revoked = !current.credential_status.revoked;
                }
                checks.all_pass()
            });

        let checks = PresentationChecks {
            structure_valid,
            vp_signature_valid,
            challenge_present,
            domain_present,
            credentials_valid,
            holder_matches_subjects,
        };
        Ok(PresentationVerification {
            valid: checks.all_pass(),
            holder: Some(vp.holder),
            checks,
        })
    }

    /// Delete every credential about an agent. Returns the number
    /// removed.
    pub fn delete_agent_credentials(&self, agent_id: &str) -> Result<usize> {
        let mut deleted = 0;
        for credential in self.list(Some(agent_id), None, false, usize::MAX)? {
            if self.store.delete(&credential.id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    #[cfg(test)]
    pub(crate) fn store_for_tests(&self) -> Arc<dyn Repository> {
        Arc::clone(&self.store)
    }

    fn put(&self, credential: &VerifiableCredential) -> Result<()> {
        let value = serde_json::to_value(credential)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
        self.store.put(&credential.id, value)
    }
}
