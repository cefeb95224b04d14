//! Verifiable credential types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crypto::canonical;
use crate::error::{AttestorError, Result};

/// JSON-LD contexts for credentials and presentations.
pub const VC_CONTEXT: [&str; 2] = [
    "https://www.w3.org/2018/credentials/v1",
    "https://w3id.org/security/suites/ed25519-2020/v1",
];

/// Top-level fields excluded from the credential signature scope.
///
/// This is the single most important correctness rule in this module:
/// `credentialStatus` mutates on revocation and `proof` carries the
/// signature itself, so neither may be signed over.
pub const SIGNATURE_EXCLUDED_FIELDS: [&str; 2] = ["proof", "credentialStatus"];

/// Credential issuer reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialIssuer {
    /// Issuer DID.
    pub id: String,
    pub name: String,
}

/// Mutable revocation status. Never part of the signed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialStatus {
    #[serde(rename = "type")]
    pub status_type: String,
    pub revoked: bool,
    pub revocation_reason: Option<String>,
    pub revoked_at: Option<String>,
}

impl CredentialStatus {
    pub fn active() -> Self {
        Self {
            status_type: "AttestorRevocationStatus".to_string(),
            revoked: false,
            revocation_reason: None,
            revoked_at: None,
        }
    }
}

/// An `Ed25519Signature2020`-style proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: String,
    #[serde(rename = "verificationMethod")]
    pub verification_method: String,
    #[serde(rename = "proofPurpose")]
    pub proof_purpose: String,
    #[serde(rename = "proofValue")]
    pub proof_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl Proof {
    /// The DID the verification method belongs to (fragment stripped).
    pub fn controller_did(&self) -> &str {
        self.verification_method
            .split('#')
            .next()
            .unwrap_or(&self.verification_method)
    }
}

/// A W3C-shaped verifiable credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub issuer: CredentialIssuer,
    #[serde(rename = "issuanceDate")]
    pub issuance_date: String,
    #[serde(rename = "expirationDate")]
    pub expiration_date: String,
    /// Subject id (`id` key) plus arbitrary claims.
    #[serde(rename = "credentialSubject")]
    pub credential_subject: Map<String, Value>,
    #[serde(rename = "credentialStatus")]
    pub credential_status: CredentialStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl VerifiableCredential {
    /// The credential subject's id.
    pub fn subject_id(&self) -> Option<&str> {
        self.credential_subject.get("id").and_then(Value::as_str)
    }

    /// The JSON payload covered by the proof signature: everything
    /// except `proof` and `credentialStatus`.
    pub fn signable_payload(&self) -> Result<Value> {
        let value = serde_json::to_value(self)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
        Ok(canonical::payload_without(&value, &SIGNATURE_EXCLUDED_FIELDS))
    }

    pub fn is_expired(&self) -> bool {
        !crate::time::is_future(&self.expiration_date)
    }

    /// Structural well-formedness: contexts, a credential type, a
    /// subject id, and a proof of the expected type.
    pub fn structure_valid(&self) -> bool {
        !self.context.is_empty()
            && self.types.iter().any(|t| t == "VerifiableCredential")
            && self.subject_id().is_some()
            && self
                .proof
                .as_ref()
                .is_some_and(|p| p.proof_type == "Ed25519Signature2020")
    }
}
