//! Verifiable credentials and presentations.
//!
//! W3C-shaped credentials with `Ed25519Signature2020` proofs. The
//! signature scope excludes `proof` and `credentialStatus`, so revoking
//! a credential flips its status without breaking its own signature.

pub mod credential;
pub mod engine;
pub mod presentation;

pub use credential::{CredentialIssuer, CredentialStatus, Proof, VerifiableCredential};
pub use engine::{CredentialChecks, CredentialEngine, CredentialVerification};
pub use presentation::{PresentationChecks, PresentationVerification, VerifiablePresentation};
