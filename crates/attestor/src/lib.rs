//! Attestor — cryptographic identity, delegation, and credential engine
//! for autonomous agents.
//!
//! Provides signed agent identity tokens, UCAN-style capability
//! delegation chains with attenuation, W3C-shaped verifiable
//! credentials and presentations, per-agent hash-chained audit logs
//! with Merkle batch anchoring, and `did:key`/`did:web` resolution.

pub mod anchor;
pub mod audit;
pub mod capability;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod delegation;
pub mod did;
pub mod engine;
pub mod error;
pub mod identity;
pub mod key_manager;
pub mod storage;
pub mod time;

// Re-export primary types
pub use anchor::{AnchorGateway, AnchorReceipt, AnchorRecord, AnchorService, ArtifactType};
pub use audit::{ActionType, AuditChain, AuditEntry, ChainVerification, MerkleBatch};
pub use capability::Capability;
pub use config::CoreConfig;
pub use credential::{
    CredentialEngine, CredentialVerification, PresentationVerification, VerifiableCredential,
    VerifiablePresentation,
};
pub use delegation::{DelegationEngine, DelegationRecord, DelegationVerification, Role};
pub use did::{DidDocument, DidResolver, HttpFetch};
pub use engine::{AttestorEngine, EngineBuilder, PurgeReport};
pub use error::{AttestorError, Result};
pub use identity::{AgentIdentityToken, IdentityRegistry, IdentityVerification};
pub use key_manager::KeyManager;
pub use storage::{JsonFileStore, MemoryStore, Repository};
