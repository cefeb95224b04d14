//! Agent identity tokens — issuance, verification, revocation, translation.

pub mod registry;
pub mod token;
pub mod translate;

pub use registry::{IdentityChecks, IdentityRegistry, IdentityVerification};
pub use token::{AgentIdentityToken, Issuer};
