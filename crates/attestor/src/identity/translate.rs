//! Identity token translation — pure projections into interop formats.
//!
//! Supported targets: `agent_card` (A2A-style agent card),
//! `did_document`, `oauth_claims`, `summary`.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::did::document::{build_document, did_key_to_verifying_key, key_to_multibase};
use crate::error::{AttestorError, Result};

use super::token::{AgentIdentityToken, TOKEN_VERSION};

/// Translate a token into `target_format`.
pub fn translate(token: &AgentIdentityToken, target_format: &str) -> Result<Value> {
    match target_format {
        "agent_card" => Ok(to_agent_card(token)),
        "did_document" => to_did_document(token),
        "oauth_claims" => Ok(to_oauth_claims(token)),
        "summary" => Ok(to_summary(token)),
        other => Err(AttestorError::UnknownFormat(other.to_string())),
    }
}

fn to_agent_card(token: &AgentIdentityToken) -> Value {
    let skills: Vec<Value> = token
        .capabilities
        .iter()
        .map(|cap| {
            let digest = hex::encode(Sha256::digest(cap.as_str().as_bytes()));
            json!({
                "id": &digest[..8],
                "name": cap.as_str(),
                "description": format!("Capability: {cap}"),
            })
        })
        .collect();

    json!({
        "name": token.display_name,
        "description": token.description,
        "url": format!("attestor://{}", token.agent_id),
        "version": token.version,
        "capabilities": {
            "streaming": false,
            "pushNotifications": false,
        },
        "skills": skills,
        "provider": {
            "organization": token.issuer.name,
        },
        "authentication": {
            "schemes": ["attestor-identity"],
            "credentials": token.agent_id,
        },
    })
}

fn to_did_document(token: &AgentIdentityToken) -> Result<Value> {
    let did = &token.issuer.did;
    let multibase = did_key_to_verifying_key(did)
        .ok()
        .map(|key| key_to_multibase(&key));
    let mut doc = build_document(did, multibase);
    doc.service = Some(vec![json!({
        "id": format!("{did}#agent"),
        "type": "AgentIdentity",
        "serviceEndpoint": {
            "agent_id": token.agent_id,
            "display_name": token.display_name,
            "capabilities": token.capabilities,
        },
    })]);
    serde_json::to_value(&doc).map_err(|e| AttestorError::SerializationError(e.to_string()))
}

fn to_oauth_claims(token: &AgentIdentityToken) -> Value {
    let scope = token
        .capabilities
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    json!({
        "sub": token.agent_id,
        "iss": token.issuer.did,
        "name": token.display_name,
        "scope": scope,
        "iat": token.created_at,
        "exp": token.expires_at,
        "token_version": TOKEN_VERSION,
    })
}

fn to_summary(token: &AgentIdentityToken) -> Value {
    json!({
        "agent_id": token.agent_id,
        "display_name": token.display_name,
        "description": token.description,
        "capabilities": token.capabilities,
        "issuer": token.issuer.name,
        "created_at": token.created_at,
        "expires_at": token.expires_at,
        "revoked": token.revoked,
        "signature_present": token.signature.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::crypto::keys::Ed25519KeyPair;
    use crate::did::document::verifying_key_to_did_key;
    use crate::identity::token::Issuer;

    fn sample() -> AgentIdentityToken {
        let kp = Ed25519KeyPair::generate();
        AgentIdentityToken {
            version: TOKEN_VERSION.to_string(),
            agent_id: "agent_sample".to_string(),
            display_name: "Sample".to_string(),
            description: "A sample agent".to_string(),
            capabilities: vec![Capability::new("read:data"), Capability::new("write:logs")],
            issuer: Issuer {
                name: "acme".to_string(),
                did: verifying_key_to_did_key(kp.verifying_key()),
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
    fn test_agent_card_skills() {
        let card = translate(&sample(), "agent_card").unwrap();
        let skills = card["skills"].as_array().unwrap();
        assert_eq!(skills.len(), 2);
        assert_eq!(skills[0]["name"], "read:data");
        assert_eq!(skills[0]["id"].as_str().unwrap().len(), 8);
    }

    #[test]
    fn test_did_document_has_service_endpoint() {
        let doc = translate(&sample(), "did_document").unwrap();
        assert!(doc["verificationMethod"][0]["publicKeyMultibase"].is_string());
        assert_eq!(
            doc["service"][0]["serviceEndpoint"]["agent_id"],
            "agent_sample"
        );
    }

    #[test]
    fn test_oauth_claims_scope() {
        let claims = translate(&sample(), "oauth_claims").unwrap();
        assert_eq!(claims["scope"], "read:data write:logs");
        assert_eq!(claims["sub"], "agent_sample");
    }

    #[test]
    fn test_summary() {
        let summary = translate(&sample(), "summary").unwrap();
        assert_eq!(summary["revoked"], false);
        assert_eq!(summary["signature_present"], true);
    }

    #[test]
    fn test_unknown_format() {
        assert!(matches!(
            translate(&sample(), "x509"),
            Err(AttestorError::UnknownFormat(_))
        ));
    }
}
