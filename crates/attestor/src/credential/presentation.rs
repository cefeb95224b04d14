//! Verifiable presentations.
//!
//! A presentation bundles credentials for a specific verifier. The
//! holder's signature covers the audience DID (`domain`) and a
//! single-use `challenge`, binding the presentation to one verifier and
//! blocking replay.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::canonical;
use crate::error::{AttestorError, Result};

use super::credential::{Proof, VerifiableCredential, VC_CONTEXT};

/// A W3C-shaped verifiable presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiablePresentation {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub holder: String,
    #[serde(rename = "verifiableCredential")]
    pub verifiable_credential: Vec<VerifiableCredential>,
    /// Audience DID the presentation is addressed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Single-use nonce from the verifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl VerifiablePresentation {
    pub fn new(id: String, holder: String, credentials: Vec<VerifiableCredential>) -> Self {
        Self {
            context: VC_CONTEXT.iter().map(|s| s.to_string()).collect(),
            id,
            types: vec!["VerifiablePresentation".to_string()],
            holder,
            verifiable_credential: credentials,
            domain: None,
            challenge: None,
            proof: None,
        }
    }

    /// The JSON payload covered by the holder's signature: everything
    /// except `proof` (the embedded credentials, `domain`, and
    /// `challenge` are all in scope).
    pub fn signable_payload(&self) -> Result<Value> {
        let value = serde_json::to_value(self)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
        Ok(canonical::payload_without(&value, &["proof"]))
    }

    /// Structural well-formedness: contexts, presentation type, holder,
    /// at least one credential, and an authentication proof.
    pub fn structure_valid(&self) -> bool {
        !self.context.is_empty()
            && self.types.iter().any(|t| t == "VerifiablePresentation")
            && !self.holder.is_empty()
            && !self.verifiable_credential.is_empty()
            && self
                .proof
                .as_ref()
                .is_some_and(|p| p.proof_purpose == "authentication")
    }

    /// Does every embedded credential's subject match the holder?
    pub fn holder_matches_subjects(&self) -> bool {
        self.verifiable_credential
            .iter()
            .all(|cred| cred.subject_id() == Some(self.holder.as_str()))
    }
}

/// Per-check results for a presentation.
#[derive(Debug, Clone, Serialize)]
pub struct PresentationChecks {
    pub structure_valid: bool,
    pub vp_signature_valid: bool,
    pub challenge_present: bool,
    pub domain_present: bool,
    pub credentials_valid: bool,
    pub holder_matches_subjects: bool,
}

impl PresentationChecks {
    pub fn all_false() -> Self {
        Self {
            structure_valid: false,
            vp_signature_valid: false,
            challenge_present: false,
            domain_present: false,
            credentials_valid: false,
            holder_matches_subjects: false,
        }
    }

    pub fn all_pass(&self) -> bool {
        self.structure_valid
            && self.vp_signature_valid
            && self.challenge_present
            && self.domain_present
            && self.credentials_valid
            && self.holder_matches_subjects
    }
}

/// Verification report for a presentation.
#[derive(Debug, Clone, Serialize)]
pub struct PresentationVerification {
    pub valid: bool,
    pub holder: Option<String>,
    pub checks: PresentationChecks,
}
