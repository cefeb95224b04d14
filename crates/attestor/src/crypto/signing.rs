//! Ed25519 signing and verification.
//!
//! Artifact signatures travel as base64url strings (JWT segments use the
//! unpadded alphabet); key material travels as standard base64.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::{AttestorError, Result};

/// Sign a message with an Ed25519 signing key.
///
/// Returns the signature as 64 bytes.
pub fn sign(signing_key: &SigningKey, message: &[u8]) -> Signature {
    signing_key.sign(message)
}

/// Verify an Ed25519 signature against a public key and message.
pub fn verify(verifying_key: &VerifyingKey, message: &[u8], signature: &Signature) -> Result<()> {
    verifying_key
        .verify(message, signature)
        .map_err(|_| AttestorError::SignatureInvalid)
}

/// Sign a message and return the signature as a base64url string.
pub fn sign_to_base64url(signing_key: &SigningKey, message: &[u8]) -> String {
    let sig = sign(signing_key, message);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE, sig.to_bytes())
}

/// Verify a base64url-encoded signature.
pub fn verify_from_base64url(
    verifying_key: &VerifyingKey,
    message: &[u8],
    signature_b64: &str,
) -> Result<()> {
    let sig_bytes =
        base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE, signature_b64)
            .map_err(|e| AttestorError::InvalidKey(format!("invalid base64 signature: {e}")))?;

    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| AttestorError::InvalidKey("signature must be 64 bytes".into()))?;

    let signature = Signature::from_bytes(&sig_array);
    verify(verifying_key, message, &signature)
}

/// Sign a message and return the signature in the unpadded base64url
/// alphabet used for JWT segments.
pub fn sign_to_jwt_segment(signing_key: &SigningKey, message: &[u8]) -> String {
    let sig = sign(signing_key, message);
    base64::Engine::encode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        sig.to_bytes(),
    )
}

/// Verify an unpadded base64url JWT signature segment.
pub fn verify_jwt_segment(
    verifying_key: &VerifyingKey,
    message: &[u8],
    signature_b64: &str,
) -> Result<()> {
    let sig_bytes = base64::Engine::decode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        signature_b64,
    )
    .map_err(|e| AttestorError::InvalidToken(format!("invalid signature segment: {e}")))?;

    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| AttestorError::InvalidToken("signature must be 64 bytes".into()))?;

    let signature = Signature::from_bytes(&sig_array);
    verify(verifying_key, message, &signature)
}

/// Encode raw key bytes as standard base64.
pub fn key_to_base64(bytes: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

/// Decode a standard-base64 32-byte key.
pub fn key_from_base64(b64: &str) -> Result<[u8; 32]> {
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)
        .map_err(|e| AttestorError::InvalidKey(format!("invalid base64 key: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| AttestorError::InvalidKey("key must be 32 bytes".into()))
}
