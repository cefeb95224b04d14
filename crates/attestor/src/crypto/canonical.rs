//! Canonical JSON serialization and payload signing.
//!
//! Every signature in the engine is computed over the canonical form
//! produced here, so independent implementations can re-derive
//! byte-identical payloads. The rules are fixed once:
//!
//! 1. All strings (keys and values) are NFC-normalized.
//! 2. Object keys serialize in ascending UTF-8 byte order.
//! 3. Compact separators, no whitespace, raw UTF-8 output.
//!
//! Signers strip mutable fields (signatures, revocation status) before
//! canonicalizing; see [`payload_without`].

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde_json::Value;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::crypto::signing;
use crate::error::{AttestorError, Result};

/// Serialize a JSON value to its canonical string form.
pub fn canonicalize(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

/// Canonical form as UTF-8 bytes (the exact bytes that get signed).
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    Ok(canonicalize(value)?.into_bytes())
}

/// Hex SHA-256 of the canonical form.
pub fn canonical_sha256_hex(value: &Value) -> Result<String> {
    Ok(hex::encode(Sha256::digest(canonical_bytes(value)?)))
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Normalize keys first, then sort by the normalized form.
            let mut entries: Vec<(String, &Value)> = map
                .iter()
                .map(|(k, v)| (k.nfc().collect::<String>(), v))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            out.push('{');
            for (i, (key, val)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out)?;
                out.push(':');
                write_canonical(val, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(s: &str, out: &mut String) -> Result<()> {
    let normalized: String = s.nfc().collect();
    let escaped = serde_json::to_string(&normalized)
        .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
    out.push_str(&escaped);
    Ok(())
}

/// Copy of a JSON object with the named top-level fields removed.
///
/// Used to exclude mutable fields (signature, revocation status) from the
/// signature scope. Non-object values are returned unchanged.
pub fn payload_without(value: &Value, excluded: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !excluded.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Sign the canonical form of a JSON payload. Returns a base64url signature.
pub fn sign_payload(signing_key: &SigningKey, payload: &Value) -> Result<String> {
    let bytes = canonical_bytes(payload)?;
    Ok(signing::sign_to_base64url(signing_key, &bytes))
}

/// Verify a base64url signature over the canonical form of a JSON payload.
///
/// Never errors: any mismatch, malformed signature, or serialization
/// failure reports `false`.
pub fn verify_payload(verifying_key: &VerifyingKey, payload: &Value, signature_b64: &str) -> bool {
    let Ok(bytes) = canonical_bytes(payload) else {
        return false;
    };
    signing::verify_from_base64url(verifying_key, &bytes, signature_b64).is_ok()
}
