//! Common test utilities shared across integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use vaultly_core::cache::{BlobVaultCache, LocalVaultCache};
use vaultly_core::ledger::{MemoryPointerLedger, PointerLedger};
use vaultly_core::platform::memory::MemoryKeystore;
use vaultly_core::platform::FsBlobStore;
use vaultly_core::remote::{MemoryRemoteStore, RemoteBlobStore};
use vaultly_core::session::{AuthSession, SealedKeyStorage, SecureKeyStorage};
use vaultly_core::{CredentialRecord, Environment, VaultConfig, VaultSyncEngine};

pub const ALICE: &str = "0x00000000000000000000000000000000000000a1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn config() -> VaultConfig {
    VaultConfig::from_environment(Environment::Testnet, None)
}

pub fn record(website: &str, username: &str, password: &str) -> CredentialRecord {
    CredentialRecord::new(website, username, password, "")
}

/// One installation of the app: its own disk cache and key storage, sharing the
/// remote store and the ledger with every other device.
pub struct Device {
    pub cache: Arc<BlobVaultCache>,
    pub engine: VaultSyncEngine,
    pub session: AuthSession,
}

impl Device {
    pub fn new(
        root: &Path,
        remote: &Arc<MemoryRemoteStore>,
        ledger: &Arc<MemoryPointerLedger>,
    ) -> Self {
        let blobs = Arc::new(FsBlobStore::new(root.join("blobs")).expect("blob store"));
        let cache = Arc::new(BlobVaultCache::new(blobs.clone()));
        let engine = VaultSyncEngine::new(
            Arc::clone(&cache) as Arc<dyn LocalVaultCache>,
            Arc::clone(remote) as Arc<dyn RemoteBlobStore>,
            Arc::clone(ledger) as Arc<dyn PointerLedger>,
        );
        let storage: Arc<dyn SecureKeyStorage> =
            Arc::new(SealedKeyStorage::new(Arc::new(MemoryKeystore::new()), blobs));
        let session = AuthSession::new(&config(), storage);
        Self {
            cache,
            engine,
            session,
        }
    }
}
