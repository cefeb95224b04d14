//! DID identifiers and documents.
//!
//! `did:key` identifiers encode an Ed25519 public key directly:
//! `did:key:z<base58btc(0xED 0x01 ‖ key)>` — the `z` is the multibase
//! tag for base58btc, `0xED 0x01` the multicodec prefix for Ed25519.

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::crypto::keys::Ed25519KeyPair;
use crate::error::{AttestorError, Result};

/// Multicodec prefix for an Ed25519 public key.
const ED25519_MULTICODEC_PREFIX: [u8; 2] = [0xED, 0x01];

/// JSON-LD contexts for DID documents.
pub const DID_CONTEXT: [&str; 2] = [
    "https://www.w3.org/ns/did/v1",
    "https://w3id.org/security/suites/ed25519-2020/v1",
];

/// A parsed decentralized identifier: method tag + method-specific id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Did {
    pub method: String,
    pub method_id: String,
}

impl Did {
    /// Parse a `did:<method>:<method-specific-id>` string.
    pub fn parse(did: &str) -> Result<Self> {
        let rest = did
            .strip_prefix("did:")
            .ok_or_else(|| AttestorError::UnsupportedMethod(format!("not a DID: {did}")))?;
        let (method, method_id) = rest
            .split_once(':')
            .ok_or_else(|| AttestorError::UnsupportedMethod(format!("malformed DID: {did}")))?;
        if method.is_empty() || method_id.is_empty() {
            return Err(AttestorError::UnsupportedMethod(format!(
                "malformed DID: {did}"
            )));
        }
        Ok(Self {
            method: method.to_string(),
            method_id: method_id.to_string(),
        })
    }
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "did:{}:{}", self.method, self.method_id)
    }
}

/// A verification method inside a DID document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    #[serde(rename = "publicKeyMultibase", skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
}

/// A resolved DID document.
///
/// The JSON shape is stable: external parties verify artifacts against
/// these documents independently of this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    pub controller: String,
    #[serde(rename = "verificationMethod")]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<String>,
    #[serde(rename = "assertionMethod", default)]
    pub assertion_method: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<serde_json::Value>>,
}

impl DidDocument {
    /// Extract the Ed25519 verifying key from the first verification
    /// method carrying `publicKeyMultibase`.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        let multibase = self
            .verification_method
            .iter()
            .find_map(|vm| vm.public_key_multibase.as_deref())
            .ok_or_else(|| {
                AttestorError::ResolutionFailed(format!(
                    "DID document {} has no publicKeyMultibase",
                    self.id
                ))
            })?;
        decode_multibase_key(multibase)
    }
}

/// Encode an Ed25519 public key as a `did:key` identifier.
pub fn verifying_key_to_did_key(key: &VerifyingKey) -> String {
    format!("did:key:{}", key_to_multibase(key))
}

/// Multibase (base58btc, multicodec-prefixed) form of a public key.
pub fn key_to_multibase(key: &VerifyingKey) -> String {
    let mut bytes = Vec::with_capacity(34);
    bytes.extend_from_slice(&ED25519_MULTICODEC_PREFIX);
    bytes.extend_from_slice(key.as_bytes());
    format!("z{}", bs58::encode(&bytes).into_string())
}

fn decode_multibase_key(multibase: &str) -> Result<VerifyingKey> {
    let encoded = multibase.strip_prefix('z').ok_or_else(|| {
        AttestorError::InvalidKey(format!("unsupported multibase prefix: {multibase}"))
    })?;
    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| AttestorError::InvalidKey(format!("invalid base58: {e}")))?;
    if decoded.len() != 34 || decoded[..2] != ED25519_MULTICODEC_PREFIX {
        return Err(AttestorError::InvalidKey(
            "not an Ed25519 multicodec key".into(),
        ));
    }
    let key_bytes: [u8; 32] = decoded[2..]
        .try_into()
        .map_err(|_| AttestorError::InvalidKey("key must be 32 bytes".into()))?;
    Ed25519KeyPair::verifying_key_from_bytes(&key_bytes)
}

/// Extract the Ed25519 public key from a `did:key` identifier.
pub fn did_key_to_verifying_key(did: &str) -> Result<VerifyingKey> {
    let parsed = Did::parse(did)?;
    if parsed.method != "key" {
        return Err(AttestorError::UnsupportedMethod(format!(
            "not a did:key: {did}"
        )));
    }
    decode_multibase_key(&parsed.method_id)
}

/// Build the DID document for a `did:key` — derived purely from the
/// identifier, no I/O.
pub fn build_did_key_document(did: &str) -> Result<DidDocument> {
    let key = did_key_to_verifying_key(did)?;
    Ok(build_document(did, Some(key_to_multibase(&key))))
}

/// Build a DID document with a single `{did}#key-1` verification method.
pub fn build_document(did: &str, public_key_multibase: Option<String>) -> DidDocument {
    let key_id = format!("{did}#key-1");
    DidDocument {
        context: DID_CONTEXT.iter().map(|s| s.to_string()).collect(),
        id: did.to_string(),
        controller: did.to_string(),
        verification_method: vec![VerificationMethod {
            id: key_id.clone(),
            method_type: "Ed25519VerificationKey2020".to_string(),
            controller: did.to_string(),
            public_key_multibase,
        }],
        authentication: vec![key_id.clone()],
        assertion_method: vec![key_id],
        service: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_parse_roundtrip() {
        let did = Did::parse("did:key:z6Mk").unwrap();
        assert_eq!(did.method, "key");
        assert_eq!(did.method_id, "z6Mk");
        assert_eq!(did.to_string(), "did:key:z6Mk");
    }

    #[test]
    fn test_did_parse_web_with_path() {
        let did = Did::parse("did:web:example.com:agents:a1").unwrap();
        assert_eq!(did.method, "web");
        assert_eq!(did.method_id, "example.com:agents:a1");
    }

    #[test]
    fn test_did_parse_rejects_garbage() {
        assert!(Did::parse("not-a-did").is_err());
        assert!(Did::parse("did:keyonly").is_err());
        assert!(Did::parse("did::missing").is_err());
    }

    #[test]
    fn test_did_key_roundtrip() {
        let kp = Ed25519KeyPair::generate();
        let did = verifying_key_to_did_key(kp.verifying_key());
        assert!(did.starts_with("did:key:z"));
        let recovered = did_key_to_verifying_key(&did).unwrap();
        assert_eq!(recovered.to_bytes(), kp.verifying_key_bytes());
    }

    #[test]
    fn test_did_key_wrong_multicodec_rejected() {
        // Valid base58 but wrong prefix bytes
        let mut bytes = vec![0x12, 0x34];
        bytes.extend_from_slice(&[7u8; 32]);
        let bogus = format!("did:key:z{}", bs58::encode(&bytes).into_string());
        assert!(did_key_to_verifying_key(&bogus).is_err());
    }

    #[test]
    fn test_build_did_key_document() {
        let kp = Ed25519KeyPair::generate();
        let did = verifying_key_to_did_key(kp.verifying_key());
        let doc = build_did_key_document(&did).unwrap();
        assert_eq!(doc.id, did);
        assert_eq!(doc.controller, did);
        assert_eq!(doc.verification_method.len(), 1);
        assert_eq!(doc.assertion_method, vec![format!("{did}#key-1")]);
        assert_eq!(
            doc.verifying_key().unwrap().to_bytes(),
            kp.verifying_key_bytes()
        );
    }

    #[test]
    fn test_document_json_shape() {
        let kp = Ed25519KeyPair::generate();
        let did = verifying_key_to_did_key(kp.verifying_key());
        let doc = build_did_key_document(&did).unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("@context").is_some());
        assert!(json.get("verificationMethod").is_some());
        assert!(json["verificationMethod"][0].get("publicKeyMultibase").is_some());
        // No service entry unless one is attached
        assert!(json.get("service").is_none());
    }
}
