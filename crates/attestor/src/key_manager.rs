//! Process signing key management.
//!
//! The engine owns exactly one Ed25519 signing key. It is created on
//! first use, persisted to the key file, and memoized for the process
//! lifetime; concurrent first callers block on the load mutex rather
//! than racing the file. The key is never serialized into any output
//! artifact.
//!
//! Key file (JSON), plain form:
//! ```json
//! {
//!     "version": 1,
//!     "algorithm": "Ed25519",
//!     "did_key": "did:key:z...",
//!     "private_key_b64": "<base64-32-bytes>"
//! }
//! ```
//! With a configured passphrase, `private_key_b64` is replaced by an
//! AES-256-GCM envelope under an Argon2id-derived key:
//! ```json
//! {
//!     "version": 1,
//!     "algorithm": "Ed25519",
//!     "did_key": "did:key:z...",
//!     "encryption": {
//!         "algorithm": "aes-256-gcm",
//!         "kdf": "argon2id",
//!         "salt": "<base64-16-bytes>",
//!         "nonce": "<base64-12-bytes>"
//!     },
//!     "encrypted_key": "<base64-ciphertext>"
//! }
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroize;

use crate::crypto::{canonical, encryption, keys::Ed25519KeyPair, signing};
use crate::did::document::{build_did_key_document, verifying_key_to_did_key, DidDocument};
use crate::error::{AttestorError, Result};
use crate::storage::file::write_atomic;

const KEY_FILE_VERSION: u32 = 1;
const KEY_ALGORITHM: &str = "Ed25519";
const KEY_ENCRYPTION_ALGORITHM: &str = "aes-256-gcm";
const KEY_KDF: &str = "argon2id";

/// On-disk key file.
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    version: u32,
    algorithm: String,
    did_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_key_b64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encryption: Option<EncryptionMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encrypted_key: Option<String>,
}

/// Encryption parameters stored alongside the ciphertext.
#[derive(Debug, Serialize, Deserialize)]
struct EncryptionMetadata {
    algorithm: String,
    kdf: String,
    salt: String,
    nonce: String,
}

struct LoadedKey {
    key_pair: Ed25519KeyPair,
    did: String,
}

/// Owner of the process-wide signing key.
///
/// Constructed once by the composition root and shared (`Arc`) with
/// every component that signs.
pub struct KeyManager {
    key_path: PathBuf,
    passphrase: Option<String>,
    state: Mutex<Option<Arc<LoadedKey>>>,
}

impl KeyManager {
    pub fn new(key_path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        Self {
            key_path: key_path.into(),
            passphrase,
            state: Mutex::new(None),
        }
    }

    /// Load (or create, on first use) the process signing key.
    ///
    /// Memoized: every call after the first returns the cached key.
    /// Fails with `KeyUnavailable` if the stored key is encrypted and no
    /// passphrase was configured, and `DecryptionFailed` on a wrong
    /// passphrase.
    fn load_or_create(&self) -> Result<Arc<LoadedKey>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AttestorError::KeyUnavailable("key manager lock poisoned".into()))?;

        if let Some(loaded) = state.as_ref() {
            return Ok(Arc::clone(loaded));
        }

        let loaded = Arc::new(if self.key_path.exists() {
            self.load_from_file()?
        } else {
            self.create_and_store()?
        });
        *state = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    fn load_from_file(&self) -> Result<LoadedKey> {
        let bytes = std::fs::read(&self.key_path)?;
        let file: KeyFile = serde_json::from_slice(&bytes).map_err(|e| {
            AttestorError::SerializationError(format!(
                "corrupt key file {}: {e}",
                self.key_path.display()
            ))
        })?;

        let mut seed: [u8; 32] = match (&file.encryption, &file.encrypted_key) {
            (Some(meta), Some(ciphertext_b64)) => {
                let passphrase = self.passphrase.as_deref().ok_or_else(|| {
                    AttestorError::KeyUnavailable(
                        "key file is encrypted but no passphrase was configured".into(),
                    )
                })?;
                let salt: [u8; 16] = decode_b64(&meta.salt)?
                    .try_into()
                    .map_err(|_| AttestorError::SerializationError("salt must be 16 bytes".into()))?;
                let nonce = decode_b64(&meta.nonce)?;
                let ciphertext = decode_b64(ciphertext_b64)?;
                let mut plaintext = encryption::decrypt_with_passphrase(
                    passphrase.as_bytes(),
                    &salt,
                    &nonce,
                    &ciphertext,
                )?;
                let seed = plaintext.as_slice().try_into().map_err(|_| {
                    AttestorError::SerializationError("decrypted key must be 32 bytes".into())
                });
                plaintext.zeroize();
                seed?
            }
            (None, None) => {
                let b64 = file.private_key_b64.as_deref().ok_or_else(|| {
                    AttestorError::SerializationError("key file has no key material".into())
                })?;
                signing::key_from_base64(b64)?
            }
            _ => {
                return Err(AttestorError::SerializationError(
                    "key file mixes encrypted and plain forms".into(),
                ))
            }
        };

        let key_pair = Ed25519KeyPair::from_signing_key_bytes(&seed);
        seed.zeroize();
        let did = verifying_key_to_did_key(key_pair.verifying_key());
        Ok(LoadedKey { key_pair, did })
    }

    fn create_and_store(&self) -> Result<LoadedKey> {
        let key_pair = Ed25519KeyPair::generate();
        let did = verifying_key_to_did_key(key_pair.verifying_key());
        let mut seed = key_pair.signing_key_bytes();

        let file = match self.passphrase.as_deref() {
            Some(passphrase) => {
                let (salt, nonce, ciphertext) =
                    encryption::encrypt_with_passphrase(passphrase.as_bytes(), &seed)?;
                KeyFile {
                    version: KEY_FILE_VERSION,
                    algorithm: KEY_ALGORITHM.to_string(),
                    did_key: did.clone(),
                    private_key_b64: None,
                    encryption: Some(EncryptionMetadata {
                        algorithm: KEY_ENCRYPTION_ALGORITHM.to_string(),
                        kdf: KEY_KDF.to_string(),
                        salt: signing::key_to_base64(&salt),
                        nonce: signing::key_to_base64(&nonce),
                    }),
                    encrypted_key: Some(signing::key_to_base64(&ciphertext)),
                }
            }
            None => KeyFile {
                version: KEY_FILE_VERSION,
                algorithm: KEY_ALGORITHM.to_string(),
                did_key: did.clone(),
                private_key_b64: Some(signing::key_to_base64(&seed)),
                encryption: None,
                encrypted_key: None,
            },
        };
        seed.zeroize();

        if let Some(dir) = self.key_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| AttestorError::SerializationError(e.to_string()))?;
        write_atomic(&self.key_path, json.as_bytes())?;

        log::info!("generated new signing key: {did}");
        Ok(LoadedKey { key_pair, did })
    }

    /// The process `did:key` identifier.
    pub fn did(&self) -> Result<String> {
        Ok(self.load_or_create()?.did.clone())
    }

    /// DID document for the process key.
    pub fn document(&self) -> Result<DidDocument> {
        build_did_key_document(&self.did()?)
    }

    /// The process verifying (public) key.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        Ok(*self.load_or_create()?.key_pair.verifying_key())
    }

    /// Sign raw bytes. Deterministic; never fails for a loadable key.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let loaded = self.load_or_create()?;
        Ok(signing::sign(loaded.key_pair.signing_key(), message))
    }

    /// Sign the canonical form of a JSON payload. Returns base64url.
    pub fn sign_payload(&self, payload: &Value) -> Result<String> {
        let loaded = self.load_or_create()?;
        canonical::sign_payload(loaded.key_pair.signing_key(), payload)
    }

    /// Sign a JWT signing input (`header.payload`); unpadded base64url.
    pub fn sign_jwt(&self, signing_input: &[u8]) -> Result<String> {
        let loaded = self.load_or_create()?;
        Ok(signing::sign_to_jwt_segment(
            loaded.key_pair.signing_key(),
            signing_input,
        ))
    }

    /// Verify a detached signature. Never errors: any mismatch is `false`.
    pub fn verify(message: &[u8], signature: &Signature, public_key: &VerifyingKey) -> bool {
        signing::verify(public_key, message, signature).is_ok()
    }

    /// Derive the `did:key` identifier and document for a public key.
    pub fn derive_did_key(public_key: &VerifyingKey) -> Result<(String, DidDocument)> {
        let did = verifying_key_to_did_key(public_key);
        let doc = build_did_key_document(&did)?;
        Ok((did, doc))
    }
}

fn decode_b64(b64: &str) -> Result<Vec<u8>> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)
        .map_err(|e| AttestorError::SerializationError(format!("invalid base64 in key file: {e}")))
}
