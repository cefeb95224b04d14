//! Composition root.
//!
//! Wires the signing key, DID resolver, audit chain, and the three
//! artifact engines over a shared set of repositories. The key is
//! initialized eagerly at construction so later signing operations
//! cannot fail on first-use side effects.
//!
//! This is also where the one deliberately cross-component operation
//! lives: [`AttestorEngine::purge_agent`] removes an agent's records
//! from every store and reports per-store outcomes instead of aborting
//! on the first failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::anchor::{AnchorGateway, AnchorService};
use crate::audit::AuditChain;
use crate::config::CoreConfig;
use crate::credential::CredentialEngine;
use crate::delegation::DelegationEngine;
use crate::did::resolver::{DidResolver, HttpFetch};
use crate::error::Result;
use crate::identity::IdentityRegistry;
use crate::key_manager::KeyManager;
use crate::storage::{JsonFileStore, MemoryStore, Repository};

/// Outcome of purging one store.
#[derive(Debug, Clone, Serialize)]
pub struct StorePurge {
    pub deleted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-store purge report. `complete` is true only if every store
/// deleted cleanly.
#[derive(Debug, Clone, Serialize)]
pub struct PurgeReport {
    pub agent_id: String,
    pub complete: bool,
    pub stores: BTreeMap<String, StorePurge>,
}

/// Builder for an [`AttestorEngine`].
pub struct EngineBuilder {
    config: CoreConfig,
    fetch: Option<Arc<dyn HttpFetch>>,
    gateway: Option<Arc<dyn AnchorGateway>>,
    in_memory: bool,
}

impl EngineBuilder {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            fetch: None,
            gateway: None,
            in_memory: false,
        }
    }

    /// Supply the outbound HTTP collaborator (enables `did:web` and
    /// Universal Resolver methods).
    pub fn http_fetch(mut self, fetch: Arc<dyn HttpFetch>) -> Self {
        self.fetch = Some(fetch);
        self
    }

    /// Supply the chain-submission collaborator (enables anchoring).
    pub fn anchor_gateway(mut self, gateway: Arc<dyn AnchorGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Use in-memory stores instead of the data directory. The signing
    /// key file still lives on disk.
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    pub fn build(self) -> Result<AttestorEngine> {
        let make_store = |name: &str| -> Result<Arc<dyn Repository>> {
            if self.in_memory {
                Ok(Arc::new(MemoryStore::new()))
            } else {
                Ok(Arc::new(JsonFileStore::new(
                    self.config.data_dir.join(name),
                )?))
            }
        };

        let key_manager = Arc::new(KeyManager::new(
            self.config.signing_key_path(),
            self.config.passphrase.clone(),
        ));
        // Explicit init: load or create the key now, not on first sign
        key_manager.did()?;

        let resolver = Arc::new(DidResolver::new(
            self.fetch,
            self.config.universal_resolver_url.clone(),
            self.config.http_timeout,
        ));

        let audit = Arc::new(AuditChain::new(make_store("audit")?));
        let identities = Arc::new(IdentityRegistry::new(
            Arc::clone(&key_manager),
            make_store("identities")?,
            Arc::clone(&audit),
            self.config.default_expiry_days,
        ));
        let delegations = Arc::new(DelegationEngine::new(
            Arc::clone(&key_manager),
            Arc::clone(&identities),
            make_store("delegations")?,
            Arc::clone(&audit),
        ));
        let credentials = Arc::new(CredentialEngine::new(
            Arc::clone(&key_manager),
            Arc::clone(&resolver),
            make_store("credentials")?,
            Arc::clone(&audit),
        ));
        let anchors = Arc::new(AnchorService::new(self.gateway, make_store("anchors")?));

        Ok(AttestorEngine {
            key_manager,
            resolver,
            audit,
            identities,
            delegations,
            credentials,
            anchors,
        })
    }
}

/// The assembled engine. Fields are the live components, shared and
/// thread-safe.
pub struct AttestorEngine {
    pub key_manager: Arc<KeyManager>,
    pub resolver: Arc<DidResolver>,
    pub audit: Arc<AuditChain>,
    pub identities: Arc<IdentityRegistry>,
    pub delegations: Arc<DelegationEngine>,
    pub credentials: Arc<CredentialEngine>,
    pub anchors: Arc<AnchorService>,
}

impl AttestorEngine {
    /// Open an engine with filesystem stores under the data directory.
    pub fn open(config: CoreConfig) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    /// Remove every record linked to an agent across all stores.
    ///
    /// All-or-nothing is not achievable across independent stores, so a
    /// failure in one store never aborts the rest: the report carries a
    /// per-store status and `complete: false` on any failure.
    pub fn purge_agent(&self, agent_id: &str) -> Result<PurgeReport> {
        let mut stores = BTreeMap::new();

        let outcomes: [(&str, Result<usize>); 5] = [
            (
                "identities",
                self.identities.delete(agent_id).map(usize::from),
            ),
            (
                "delegations",
                self.delegations.delete_agent_delegations(agent_id),
            ),
            (
                "credentials",
                self.credentials.delete_agent_credentials(agent_id),
            ),
            ("audit", self.audit.delete_agent_entries(agent_id)),
            ("anchors", self.anchors.delete_for_artifact(agent_id)),
        ];

        let mut complete = true;
        for (name, outcome) in outcomes {
            let purge = match outcome {
                Ok(deleted) => StorePurge {
                    deleted,
                    error: None,
                },
                Err(e) => {
                    complete = false;
                    StorePurge {
                        deleted: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            stores.insert(name.to_string(), purge);
        }

        if complete {
            log::info!("purged all records for {agent_id}");
        } else {
            log::warn!("partial purge for {agent_id}: {stores:?}");
        }

        Ok(PurgeReport {
            agent_id: agent_id.to_string(),
            complete,
            stores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{AnchorReceipt, ArtifactType};
    use crate::capability::Capability;
    use crate::error::AttestorError;

    struct StubGateway;

    impl AnchorGateway for StubGateway {
        fn submit(&self, hash_hex: &str) -> Result<AnchorReceipt> {
            Ok(AnchorReceipt {
                tx_ref: format!("0x{}", &hash_hex[..16]),
                block_ref: "block-1".to_string(),
            })
        }
    }

    fn engine() -> (tempfile::TempDir, AttestorEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = EngineBuilder::new(CoreConfig::new(dir.path()))
            .anchor_gateway(Arc::new(StubGateway))
            .in_memory()
            .build()
            .unwrap();
        (dir, engine)
    }

    fn caps(uris: &[&str]) -> Vec<Capability> {
        uris.iter().map(|u| Capability::new(*u)).collect()
    }

    #[test]
    fn test_open_creates_key_eagerly() {
        let dir = tempfile::tempdir().unwrap();
        let _engine = AttestorEngine::open(CoreConfig::new(dir.path())).unwrap();
        assert!(dir.path().join("signing_key.json").exists());
    }

    #[test]
    fn test_file_backed_engine_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let agent_id = {
            let engine = AttestorEngine::open(CoreConfig::new(dir.path())).unwrap();
            engine
                .identities
                .create("Keeper", caps(&["x"]), "", "", None)
                .unwrap()
                .agent_id
        };

        let engine = AttestorEngine::open(CoreConfig::new(dir.path())).unwrap();
        let report = engine.identities.verify(&agent_id).unwrap();
        assert!(report.valid, "{:?}", report.checks);
    }

    #[test]
    fn test_purge_cascades_across_stores() {
        let (_dir, engine) = engine();
        let a = engine
            .identities
            .create("A", caps(&["x"]), "", "", None)
            .unwrap()
            .agent_id;
        let b = engine
            .identities
            .create("B", caps(&[]), "", "", None)
            .unwrap()
            .agent_id;

        engine
            .delegations
            .create(&a, &b, caps(&["x"]), 24, None)
            .unwrap();
        let cred = engine
            .credentials
            .issue(&a, "T", "i", serde_json::Map::new(), 365)
            .unwrap();
        let token_json = serde_json::to_value(engine.identities.get(&a).unwrap().unwrap()).unwrap();
        engine
            .anchors
            .anchor_artifact(ArtifactType::Identity, &a, &token_json)
            .unwrap();

        let report = engine.purge_agent(&a).unwrap();
        assert!(report.complete);
        assert_eq!(report.stores["identities"].deleted, 1);
        assert_eq!(report.stores["delegations"].deleted, 1);
        assert_eq!(report.stores["credentials"].deleted, 1);
        assert!(report.stores["audit"].deleted >= 1);
        assert_eq!(report.stores["anchors"].deleted, 1);

        assert!(engine.identities.get(&a).unwrap().is_none());
        assert!(engine.credentials.get(&cred.id).unwrap().is_none());
        assert!(engine.audit.entries(&a).unwrap().is_empty());
        // B's records are untouched
        assert!(engine.identities.get(&b).unwrap().is_some());
    }

    #[test]
    fn test_purge_unknown_agent_reports_zero_deletes() {
        let (_dir, engine) = engine();
        let report = engine.purge_agent("agent_ghost").unwrap();
        assert!(report.complete);
        assert!(report.stores.values().all(|s| s.deleted == 0));
    }

    #[test]
    fn test_purge_reports_partial_failure() {
        let (_dir, engine) = engine();
        let a = engine
            .identities
            .create("A", caps(&["x"]), "", "", None)
            .unwrap()
            .agent_id;

        // Corrupt a credential record so that store fails to enumerate
        engine
            .credentials
            .issue(&a, "T", "i", serde_json::Map::new(), 365)
            .unwrap();
        engine
            .credentials
            .store_for_tests()
            .put("corrupt", serde_json::json!({"not": "a credential"}))
            .unwrap();

        let report = engine.purge_agent(&a).unwrap();
        assert!(!report.complete);
        assert!(report.stores["credentials"].error.is_some());
        // Other stores still purged
        assert_eq!(report.stores["identities"].deleted, 1);
        assert!(engine.identities.get(&a).unwrap().is_none());
    }

    #[test]
    fn test_wrong_passphrase_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        AttestorEngine::open(CoreConfig::new(dir.path()).with_passphrase("right")).unwrap();
        assert!(matches!(
            AttestorEngine::open(CoreConfig::new(dir.path()).with_passphrase("wrong")),
            Err(AttestorError::DecryptionFailed)
        ));
    }
}
