//! DID resolution.
//!
//! `did:key` resolves locally with no I/O. `did:web` maps to an HTTPS
//! URL and delegates the fetch to an [`HttpFetch`] collaborator (SSRF
//! filtering happens on the collaborator's side of the boundary). Every
//! other method goes to a configured Universal Resolver endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::crypto::keys::Ed25519KeyPair;
use crate::crypto::signing;
use crate::error::{AttestorError, Result};

use super::document::{
    build_did_key_document, build_document, key_to_multibase, Did, DidDocument,
};

/// Outbound HTTP collaborator.
///
/// Implementations must return `Err` for non-2xx responses and respect
/// the timeout; a timeout surfaces as `ResolutionFailed`, never as a
/// false verification result.
pub trait HttpFetch: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}

/// Resolves DIDs to documents.
pub struct DidResolver {
    fetch: Option<Arc<dyn HttpFetch>>,
    universal_resolver_url: Option<String>,
    timeout: Duration,
}

impl DidResolver {
    pub fn new(
        fetch: Option<Arc<dyn HttpFetch>>,
        universal_resolver_url: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetch,
            universal_resolver_url,
            timeout,
        }
    }

    /// A resolver with no network collaborators; only `did:key` resolves.
    pub fn local_only() -> Self {
        Self::new(None, None, Duration::from_secs(10))
    }

    /// Resolve a DID to its document with the default timeout.
    pub fn resolve(&self, did: &str) -> Result<DidDocument> {
        self.resolve_with_timeout(did, self.timeout)
    }

    /// Resolve a DID, bounding any network I/O by `timeout`.
    pub fn resolve_with_timeout(&self, did: &str, timeout: Duration) -> Result<DidDocument> {
        let parsed = Did::parse(did)?;
        match parsed.method.as_str() {
            "key" => build_did_key_document(did),
            "web" => self.resolve_did_web(did, &parsed, timeout),
            other => self.resolve_universal(did, other, timeout),
        }
    }

    fn resolve_did_web(
        &self,
        did: &str,
        parsed: &Did,
        timeout: Duration,
    ) -> Result<DidDocument> {
        let url = did_web_url(parsed);
        let fetch = self.fetch.as_ref().ok_or_else(|| {
            AttestorError::ResolutionFailed(format!("no HTTP fetcher configured for {did}"))
        })?;

        let body = fetch.get(&url, timeout).map_err(|e| {
            log::warn!("did:web fetch failed for {did}: {e}");
            AttestorError::ResolutionFailed(format!("fetch {url}: {e}"))
        })?;

        parse_document(&body)
            .map_err(|e| AttestorError::ResolutionFailed(format!("malformed document at {url}: {e}")))
    }

    fn resolve_universal(&self, did: &str, method: &str, timeout: Duration) -> Result<DidDocument> {
        let base = self.universal_resolver_url.as_deref().ok_or_else(|| {
            AttestorError::UnsupportedMethod(format!(
                "did:{method} requires a Universal Resolver endpoint"
            ))
        })?;
        let fetch = self.fetch.as_ref().ok_or_else(|| {
            AttestorError::UnsupportedMethod(format!("no HTTP fetcher configured for did:{method}"))
        })?;

        let url = format!("{base}{did}");
        let body = fetch.get(&url, timeout).map_err(|e| {
            log::warn!("universal resolution failed for {did}: {e}");
            AttestorError::ResolutionFailed(format!("fetch {url}: {e}"))
        })?;

        // Resolver responses wrap the document in a `didDocument` field;
        // accept a bare document too.
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| AttestorError::ResolutionFailed(format!("malformed JSON from {url}: {e}")))?;
        let doc_value = value.get("didDocument").cloned().unwrap_or(value);
        serde_json::from_value(doc_value)
            .map_err(|e| AttestorError::ResolutionFailed(format!("malformed DID document: {e}")))
    }
}

fn parse_document(body: &[u8]) -> std::result::Result<DidDocument, serde_json::Error> {
    serde_json::from_slice(body)
}

/// HTTPS URL a `did:web` document is hosted at.
///
/// `did:web:example.com` → `https://example.com/.well-known/did.json`;
/// `did:web:example.com:agents:a1` → `https://example.com/agents/a1/did.json`.
pub fn did_web_url(parsed: &Did) -> String {
    let mut parts = parsed.method_id.split(':');
    let domain = parts.next().unwrap_or_default();
    let path: Vec<&str> = parts.collect();
    if path.is_empty() {
        format!("https://{domain}/.well-known/did.json")
    } else {
        format!("https://{domain}/{}/did.json", path.join("/"))
    }
}

/// A freshly constructed `did:web` identity for self-hosting.
///
/// The caller is responsible for hosting `document` at `hosting_url` and
/// for safeguarding the private key.
pub struct NewDidWeb {
    pub did: String,
    pub document: DidDocument,
    pub hosting_url: String,
    pub public_key_b64: String,
    pub private_key_b64: String,
}

/// Construct a `did:web` DID and document for `domain` (+ optional
/// slash-separated path). Pure construction — no network.
pub fn create_did_web(domain: &str, path: &str) -> Result<NewDidWeb> {
    if domain.is_empty() || domain.contains('/') || domain.contains(':') {
        return Err(AttestorError::ResolutionFailed(format!(
            "invalid did:web domain: {domain:?}"
        )));
    }

    let did = if path.is_empty() {
        format!("did:web:{domain}")
    } else {
        format!("did:web:{domain}:{}", path.trim_matches('/').replace('/', ":"))
    };

    let kp = Ed25519KeyPair::generate();
    let document = build_document(&did, Some(key_to_multibase(kp.verifying_key())));
    let hosting_url = did_web_url(&Did::parse(&did)?);

    Ok(NewDidWeb {
        did,
        document,
        hosting_url,
        public_key_b64: signing::key_to_base64(&kp.verifying_key_bytes()),
        private_key_b64: signing::key_to_base64(&kp.signing_key_bytes()),
    })
}
