//! Decentralized identifiers.
//!
//! Two self-contained methods (`did:key`, `did:web`) plus delegation to
//! an external Universal Resolver for everything else.

pub mod document;
pub mod resolver;

pub use document::{
    build_did_key_document, did_key_to_verifying_key, verifying_key_to_did_key, Did, DidDocument,
    VerificationMethod,
};
pub use resolver::{create_did_web, DidResolver, HttpFetch, NewDidWeb};
