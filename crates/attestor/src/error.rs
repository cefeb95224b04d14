//! Error types for the attestor engine.
//!
//! Expected business conditions (revoked, expired, not found) are returned
//! as typed errors or as `valid: false` verification reports — never as
//! panics. Private key material is never included in error messages.

/// Engine error taxonomy covering all operations.
#[derive(Debug, thiserror::Error)]
pub enum AttestorError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Informational: the artifact was already revoked. Repeating a
    /// revocation does not change any state.
    #[error("Already revoked: {0}")]
    AlreadyRevoked(String),

    #[error("Expired: {0}")]
    Expired(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Delegated capabilities exceed the grantor's: {}", capabilities.join(", "))]
    CapabilityExceeded { capabilities: Vec<String> },

    #[error("Audit chain broken at entry {index}")]
    ChainBroken { index: usize },

    #[error("DID resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Unknown translation format: {0}")]
    UnknownFormat(String),

    #[error("Signing key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Decryption failed (wrong passphrase?)")]
    DecryptionFailed,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Presentation holder does not match credential subject: {0}")]
    SubjectMismatch(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, AttestorError>;
