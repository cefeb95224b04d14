//! JWT-shaped delegation tokens.
//!
//! Wire format is a standard three-segment JWS: unpadded base64url of
//! the header and payload JSON, and an Ed25519 signature over the exact
//! signing input `"{header_b64}.{payload_b64}"`. The shape is stable:
//! external parties verify these tokens independently.

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::crypto::signing;
use crate::error::{AttestorError, Result};

/// JOSE header. Always `{"alg": "EdDSA", "typ": "JWT"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

impl JwtHeader {
    pub fn eddsa() -> Self {
        Self {
            alg: "EdDSA".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Delegation token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationClaims {
    /// Issuer agent id (who grants).
    pub iss: String,
    /// Audience agent id (who receives).
    pub aud: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Not-before, unix seconds.
    pub nbf: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Attenuated capability set being delegated.
    pub att: Vec<Capability>,
    /// Unique delegation id.
    pub jti: String,
    /// Parent delegation id (proof chain); absent for root delegations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prf: Option<String>,
}

/// A structurally decoded (but not yet verified) token.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub header: JwtHeader,
    pub claims: DelegationClaims,
    signing_input: String,
    signature_b64: String,
}

impl DecodedToken {
    /// Verify the Ed25519 signature over the signing input.
    pub fn signature_valid(&self, key: &VerifyingKey) -> bool {
        signing::verify_jwt_segment(key, self.signing_input.as_bytes(), &self.signature_b64)
            .is_ok()
    }
}

fn b64_segment(bytes: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, segment)
        .map_err(|e| AttestorError::InvalidToken(format!("invalid base64url segment: {e}")))
}

/// Serialize and sign claims into a compact JWT. The signing closure
/// receives the exact signing input bytes.
pub fn encode_token<F>(claims: &DelegationClaims, sign: F) -> Result<String>
where
    F: FnOnce(&[u8]) -> Result<String>,
{
    let header_json = serde_json::to_vec(&JwtHeader::eddsa())
        .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
    let claims_json =
        serde_json::to_vec(claims).map_err(|e| AttestorError::SerializationError(e.to_string()))?;

    let signing_input = format!("{}.{}", b64_segment(&header_json), b64_segment(&claims_json));
    let signature = sign(signing_input.as_bytes())?;
    Ok(format!("{signing_input}.{signature}"))
}

/// Structurally decode a compact JWT. Checks segment shape and the
/// `EdDSA` algorithm tag; does not verify the signature.
pub fn decode_token(token: &str) -> Result<DecodedToken> {
    let segments: Vec<&str> = token.split('.').collect();
    let &[header_b64, claims_b64, signature_b64] = segments.as_slice() else {
        return Err(AttestorError::InvalidToken(format!(
            "expected 3 segments, got {}",
            segments.len()
        )));
    };

    let header: JwtHeader = serde_json::from_slice(&decode_segment(header_b64)?)
        .map_err(|e| AttestorError::InvalidToken(format!("malformed header: {e}")))?;
    if header.alg != "EdDSA" {
        return Err(AttestorError::InvalidToken(format!(
            "unsupported algorithm: {}",
            header.alg
        )));
    }

    let claims: DelegationClaims = serde_json::from_slice(&decode_segment(claims_b64)?)
        .map_err(|e| AttestorError::InvalidToken(format!("malformed claims: {e}")))?;

    Ok(DecodedToken {
        header,
        claims,
        signing_input: format!("{header_b64}.{claims_b64}"),
        signature_b64: signature_b64.to_string(),
    })
}

/// Stored record of an issued delegation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub delegation_id: String,
    pub token: String,
    pub issuer: String,
    pub audience: String,
    pub capabilities: Vec<Capability>,
    pub parent: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub revoked: bool,
    pub revocation_reason: Option<String>,
    pub revoked_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Ed25519KeyPair;

    fn sample_claims() -> DelegationClaims {
        let now = crate::time::now_unix();
        DelegationClaims {
            iss: "agent_a".to_string(),
            aud: "agent_b".to_string(),
            iat: now,
            nbf: now,
            exp: now + 3600,
            att: vec![Capability::new("read:data")],
            jti: "deleg_test".to_string(),
            prf: None,
        }
    }

    fn encode_with(kp: &Ed25519KeyPair, claims: &DelegationClaims) -> String {
        let key = kp.signing_key();
        encode_token(claims, |input| Ok(signing::sign_to_jwt_segment(key, input))).unwrap()
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let kp = Ed25519KeyPair::generate();
        let token = encode_with(&kp, &sample_claims());

        let decoded = decode_token(&token).unwrap();
        assert_eq!(decoded.header.alg, "EdDSA");
        assert_eq!(decoded.claims.iss, "agent_a");
        assert_eq!(decoded.claims.att, vec![Capability::new("read:data")]);
        assert!(decoded.signature_valid(kp.verifying_key()));
    }

    #[test]
    fn test_signature_invalid_for_other_key() {
        let kp = Ed25519KeyPair::generate();
        let other = Ed25519KeyPair::generate();
        let token = encode_with(&kp, &sample_claims());
        let decoded = decode_token(&token).unwrap();
        assert!(!decoded.signature_valid(other.verifying_key()));
    }

    #[test]
    fn test_tampered_payload_fails_signature() {
        let kp = Ed25519KeyPair::generate();
        let token = encode_with(&kp, &sample_claims());

        // Swap the payload for a widened capability set
        let mut widened = sample_claims();
        widened.att = vec![Capability::new("*")];
        let forged = encode_with(&Ed25519KeyPair::generate(), &widened);
        let forged_payload = forged.split('.').nth(1).unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        let decoded = decode_token(&spliced).unwrap();
        assert!(!decoded.signature_valid(kp.verifying_key()));
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        assert!(matches!(
            decode_token("only.two"),
            Err(AttestorError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_alg() {
        let header = b64_segment(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = b64_segment(
            serde_json::to_vec(&sample_claims()).unwrap().as_slice(),
        );
        let token = format!("{header}.{claims}.c2ln");
        assert!(matches!(
            decode_token(&token),
            Err(AttestorError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_prf_omitted_for_roots() {
        let kp = Ed25519KeyPair::generate();
        let token = encode_with(&kp, &sample_claims());
        let payload_b64 = token.split('.').nth(1).unwrap();
        let payload = decode_segment(payload_b64).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert!(json.get("prf").is_none());
    }
}
