//! Cryptographic primitives for the attestor engine.
//!
//! This module provides:
//! - Ed25519 key generation, signing, and verification
//! - Canonical JSON serialization and payload signing
//! - Argon2id passphrase-based key derivation
//! - AES-256-GCM authenticated encryption for keys at rest
//! - Cryptographically secure random number generation

pub mod canonical;
pub mod encryption;
pub mod keys;
pub mod random;
pub mod signing;
