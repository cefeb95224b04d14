//! Tamper-evident audit logging.
//!
//! Each agent has its own hash-linked log: every entry embeds a SHA-256
//! over its predecessor's chain hash and its own canonical content, so
//! retroactive edits are detectable. Batches of entries commit to a
//! single Merkle root for cheap external anchoring with per-entry
//! inclusion proofs.

pub mod chain;
pub mod entry;
pub mod merkle;

pub use chain::{AuditChain, ChainVerification};
pub use entry::{ActionType, AuditEntry, GENESIS_HASH};
pub use merkle::{verify_inclusion, MerkleBatch, MerkleProofStep};
