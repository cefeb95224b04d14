//! Engine configuration.
//!
//! Supplied by the embedding process at startup; the engine itself does
//! not read environment variables or parse files.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::engine::AttestorEngine`].
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Directory holding the signing key file and persisted records.
    pub data_dir: PathBuf,
    /// Passphrase for encrypting the signing key at rest. When `None`,
    /// the key file is stored unencrypted.
    pub passphrase: Option<String>,
    /// Universal Resolver endpoint for DID methods the engine cannot
    /// resolve locally (e.g. `https://dev.uniresolver.io/1.0/identifiers/`).
    pub universal_resolver_url: Option<String>,
    /// Timeout applied to network-backed DID resolution.
    pub http_timeout: Duration,
    /// Default identity token lifetime in days.
    pub default_expiry_days: i64,
}

impl CoreConfig {
    /// Build a configuration rooted at `data_dir` with defaults for
    /// everything else.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            passphrase: None,
            universal_resolver_url: None,
            http_timeout: Duration::from_secs(10),
            default_expiry_days: 365,
        }
    }

    /// Set the key-encryption passphrase.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Set the Universal Resolver endpoint.
    pub fn with_universal_resolver(mut self, url: impl Into<String>) -> Self {
        self.universal_resolver_url = Some(url.into());
        self
    }

    /// Path of the signing key file.
    pub fn signing_key_path(&self) -> PathBuf {
        self.data_dir.join("signing_key.json")
    }
}
