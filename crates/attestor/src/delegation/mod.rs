//! Capability delegation — UCAN-style JWT tokens with attenuation.
//!
//! An agent may delegate a subset of its capabilities to another agent;
//! delegations chain (each token may reference a parent) and each link
//! may only narrow, never widen, authority. Revoking any ancestor
//! invalidates every descendant for future verification.

pub mod engine;
pub mod token;

pub use engine::{DelegationEngine, DelegationVerification, Role};
pub use token::{DelegationClaims, DelegationRecord, DecodedToken, JwtHeader};
