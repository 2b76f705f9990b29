//! Keeps the local cache, the pinned copy and the on-chain pointer of each vault consistent.
//!
//! Per user the vault moves through `Empty → Loaded → Dirty → Syncing → Loaded`:
//!
//! - [`VaultSyncEngine::refresh`] reads the pointer, fetches and validates the pinned blob,
//!   and only then replaces the cache entry. A cached vault with uncommitted edits is
//!   never replaced by a refresh.
//! - [`VaultSyncEngine::add_or_update`] and [`VaultSyncEngine::delete`] merge into the cached
//!   snapshot, pin the re-sealed vault and update the cache before anything reaches the
//!   ledger. The previous pin is released on a best-effort basis.
//! - [`VaultSyncEngine::commit_pointer`] publishes the cached CID through the wallet.
//!
//! Whether a cached vault is committed is stored with the cache entry, so `Dirty` survives
//! a restart. Calls for the same user must be serialized by the caller.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use secrecy::SecretString;
use zeroize::Zeroizing;

use crate::cache::{BlobVaultCache, LocalVaultCache, PointerRecord};
use crate::codec::{self, CredentialRecord, VaultSnapshot};
use crate::config::{Environment, VaultConfig};
use crate::crypto::{self, VaultKey};
use crate::error::{VaultError, VaultResult};
use crate::ledger::{PointerLedger, RpcPointerLedger, SigningCapability};
use crate::platform::AtomicBlobStore;
use crate::remote::{PinMetadata, PinataBlobStore, RemoteBlobStore};

/// Where a user's vault stands relative to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SyncState {
    /// Nothing cached and no pointer known.
    Empty,
    /// The cache matches the last pointer read or committed.
    Loaded,
    /// Local edits are pinned and cached but not yet committed to the ledger.
    Dirty,
    /// A pointer commit is waiting on the wallet.
    Syncing,
}

/// Result of a local edit.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct VaultWrite {
    /// CID now held in the cache. Empty if the vault has never been pinned.
    pub cid: String,
    /// The snapshot after the edit.
    pub snapshot: VaultSnapshot,
}

/// Orchestrates reads and writes across the cache, the remote blob store and the ledger.
#[derive(uniffi::Object)]
pub struct VaultSyncEngine {
    cache: Arc<dyn LocalVaultCache>,
    remote: Arc<dyn RemoteBlobStore>,
    ledger: Arc<dyn PointerLedger>,
    syncing: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for VaultSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSyncEngine").finish_non_exhaustive()
    }
}

/// Marks a user as `Syncing` until dropped, including when the commit future is cancelled.
struct SyncingGuard<'a> {
    syncing: &'a Mutex<HashSet<String>>,
    user_id: String,
}

impl<'a> SyncingGuard<'a> {
    fn enter(syncing: &'a Mutex<HashSet<String>>, user_id: &str) -> Self {
        syncing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string());
        Self {
            syncing,
            user_id: user_id.to_string(),
        }
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.syncing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}

impl VaultSyncEngine {
    /// Creates an engine over the given collaborators.
    #[must_use]
    pub fn new(
        cache: Arc<dyn LocalVaultCache>,
        remote: Arc<dyn RemoteBlobStore>,
        ledger: Arc<dyn PointerLedger>,
    ) -> Self {
        Self {
            cache,
            remote,
            ledger,
            syncing: Mutex::new(HashSet::new()),
        }
    }

    /// Wires the production collaborators: a durable cache in `store`, Pinata and the registry.
    #[must_use]
    pub fn from_parts(
        config: &VaultConfig,
        pinning_jwt: String,
        store: Arc<dyn AtomicBlobStore>,
        signer: Arc<dyn SigningCapability>,
    ) -> Self {
        Self::new(
            Arc::new(BlobVaultCache::new(store)),
            Arc::new(PinataBlobStore::new(config, SecretString::from(pinning_jwt))),
            Arc::new(RpcPointerLedger::new(config, signer)),
        )
    }

    async fn write(
        &self,
        key: &VaultKey,
        user_id: &str,
        edit: impl FnOnce(&mut VaultSnapshot) -> bool + Send,
    ) -> VaultResult<VaultWrite> {
        let previous = self.cache.get(user_id)?;
        let mut snapshot = match &previous {
            Some(record) => open_record(record, key)?,
            None => VaultSnapshot::new(),
        };
        let old_cid = previous.map(|record| record.cid).unwrap_or_default();

        if !edit(&mut snapshot) {
            tracing::debug!(%user_id, "edit changed nothing, skipping pin");
            return Ok(VaultWrite {
                cid: old_cid,
                snapshot,
            });
        }

        let plaintext = codec::encode(&snapshot)?;
        let blob = crypto::seal(&plaintext, key)?;
        let new_cid = self
            .remote
            .put(&blob, &PinMetadata::for_user(user_id))
            .await?;

        self.cache
            .put(PointerRecord::new(user_id, new_cid.as_str(), blob).uncommitted())?;
        tracing::info!(%user_id, cid = %new_cid, records = snapshot.len(), "vault pinned");

        if !old_cid.is_empty() && old_cid != new_cid {
            if let Err(err) = self.remote.unpin(&old_cid).await {
                tracing::warn!(%user_id, cid = %old_cid, %err, "failed to unpin previous vault");
            }
        }

        Ok(VaultWrite {
            cid: new_cid,
            snapshot,
        })
    }

    /// Clears the pending flag if the cache still holds `cid`.
    fn mark_committed(&self, user_id: &str, cid: &str) -> VaultResult<()> {
        match self.cache.get(user_id)? {
            Some(mut record) if record.cid == cid && record.pending_commit => {
                record.pending_commit = false;
                self.cache.put(record)
            }
            _ => Ok(()),
        }
    }
}

#[uniffi::export(async_runtime = "tokio")]
impl VaultSyncEngine {
    /// Creates an engine with the SDK defaults for `environment`.
    ///
    /// The cache persists into `store`; pointer commits are signed through `signer`.
    #[uniffi::constructor]
    #[allow(clippy::needless_pass_by_value)]
    #[must_use]
    pub fn with_defaults(
        environment: &Environment,
        rpc_url: Option<String>,
        pinning_jwt: String,
        store: Arc<dyn AtomicBlobStore>,
        signer: Arc<dyn SigningCapability>,
    ) -> Self {
        let config = VaultConfig::from_environment(*environment, rpc_url);
        Self::from_parts(&config, pinning_jwt, store, signer)
    }

    /// Creates an engine from a JSON [`VaultConfig`].
    ///
    /// # Errors
    /// Returns `InvalidInput` if the configuration does not parse or validate.
    #[uniffi::constructor]
    #[allow(clippy::needless_pass_by_value)]
    pub fn from_config(
        config: &str,
        pinning_jwt: String,
        store: Arc<dyn AtomicBlobStore>,
        signer: Arc<dyn SigningCapability>,
    ) -> VaultResult<Self> {
        let config = VaultConfig::from_json(config)?;
        Ok(Self::from_parts(&config, pinning_jwt, store, signer))
    }

    /// Current sync state of `user_id`.
    ///
    /// Derived from the cache entry, so it is also correct right after a restart.
    #[must_use]
    pub fn sync_state(&self, user_id: &str) -> SyncState {
        let syncing = self
            .syncing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(user_id);
        if syncing {
            return SyncState::Syncing;
        }
        match self.cache.get(user_id) {
            Ok(Some(record)) if record.pending_commit => SyncState::Dirty,
            Ok(Some(_)) => SyncState::Loaded,
            _ => SyncState::Empty,
        }
    }

    /// CID of the cached vault, if any.
    ///
    /// # Errors
    /// Returns `Cache` if the cache cannot be read.
    pub fn current_cid(&self, user_id: &str) -> VaultResult<Option<String>> {
        self.cache.get_cid(user_id)
    }

    /// Decrypts the cached vault without touching the network. Empty if nothing is cached.
    ///
    /// # Errors
    /// `AuthenticationFailure` for a wrong key, `Decode` for a corrupt payload, `Cache` if
    /// the cache cannot be read.
    pub fn snapshot(&self, key: &VaultKey, user_id: &str) -> VaultResult<VaultSnapshot> {
        self.cache
            .get(user_id)?
            .map_or_else(|| Ok(VaultSnapshot::new()), |record| open_record(&record, key))
    }

    /// Pulls the vault the ledger points at into the cache.
    ///
    /// The cache entry is replaced only after the fetched blob decrypted and decoded; on any
    /// error it is left untouched. An empty pointer leaves the cache authoritative, and so
    /// does a cached vault with uncommitted edits: it is returned as is and stays `Dirty`
    /// until [`VaultSyncEngine::commit_pointer`] publishes it.
    ///
    /// # Errors
    /// `Network` from the ledger, `NotFound`/`Remote` from the blob store,
    /// `AuthenticationFailure`/`Decode` for an unreadable blob, `Cache` on cache failure.
    pub async fn refresh(&self, key: &VaultKey, user_id: &str) -> VaultResult<VaultSnapshot> {
        let cid = self.ledger.read_pointer(user_id).await?;
        let cached = self.cache.get(user_id)?;

        if cid.is_empty() {
            tracing::debug!(%user_id, "no pointer on ledger, keeping local vault");
            return cached.map_or_else(
                || Ok(VaultSnapshot::new()),
                |record| open_record(&record, key),
            );
        }

        if let Some(mut record) = cached {
            if record.cid == cid {
                let snapshot = open_record(&record, key)?;
                if record.pending_commit {
                    record.pending_commit = false;
                    self.cache.put(record)?;
                }
                return Ok(snapshot);
            }
            if record.pending_commit {
                tracing::warn!(
                    %user_id,
                    ledger_cid = %cid,
                    local_cid = %record.cid,
                    "ledger points at another vault; keeping uncommitted local edits"
                );
                return open_record(&record, key);
            }
        }

        let blob = self.remote.get(&cid).await?;
        let plaintext = Zeroizing::new(crypto::open(&blob, key)?);
        let snapshot = codec::decode(&plaintext)?;

        self.cache.put(PointerRecord::new(user_id, cid.as_str(), blob))?;
        tracing::info!(%user_id, %cid, records = snapshot.len(), "vault refreshed");
        Ok(snapshot)
    }

    /// Inserts `record`, replacing any record with the same website (last write wins).
    ///
    /// Merges into the cached snapshot without a remote read. The new vault is pinned and
    /// cached; the ledger is not touched, see [`VaultSyncEngine::commit_pointer`].
    ///
    /// # Errors
    /// `AuthenticationFailure`/`Decode` if the cached vault is unreadable, `Remote` if
    /// pinning fails, `Cache` on cache failure. The cache is unchanged on error.
    pub async fn add_or_update(
        &self,
        key: &VaultKey,
        user_id: &str,
        record: CredentialRecord,
    ) -> VaultResult<VaultWrite> {
        if record.website.is_empty() {
            return Err(VaultError::invalid_input("website", "must not be empty"));
        }
        self.write(key, user_id, |snapshot| {
            snapshot.upsert(record);
            true
        })
        .await
    }

    /// Removes the record for `website`.
    ///
    /// Removing a website that is not in the vault changes nothing: no pin, no unpin.
    ///
    /// # Errors
    /// Same as [`VaultSyncEngine::add_or_update`].
    pub async fn delete(
        &self,
        key: &VaultKey,
        user_id: &str,
        website: &str,
    ) -> VaultResult<VaultWrite> {
        self.write(key, user_id, |snapshot| snapshot.remove(website))
            .await
    }

    /// Records the cached CID on the ledger and returns the transaction hash.
    ///
    /// Waits for the user to sign. Whatever the outcome, the cached vault stays valid; on
    /// failure the state falls back to what it was before the call.
    ///
    /// # Errors
    /// `InvalidState` if nothing was ever pinned; `UserRejected`, `SigningTimeout` or
    /// `Network` from the ledger, all recoverable by calling again later.
    pub async fn commit_pointer(&self, user_id: &str) -> VaultResult<String> {
        let cid = self
            .cache
            .get_cid(user_id)?
            .filter(|cid| !cid.is_empty())
            .ok_or_else(|| VaultError::InvalidState("no pinned vault to commit".to_string()))?;

        let result = {
            let _syncing = SyncingGuard::enter(&self.syncing, user_id);
            self.ledger.write_pointer(user_id, &cid).await
        };
        match result {
            Ok(tx_hash) => {
                tracing::info!(%user_id, %cid, %tx_hash, "vault pointer committed");
                if let Err(err) = self.mark_committed(user_id, &cid) {
                    // The next refresh sees the pointer match the cache and clears the flag.
                    tracing::warn!(%user_id, %cid, %err, "failed to mark cached vault committed");
                }
                Ok(tx_hash)
            }
            Err(err) => {
                tracing::warn!(%user_id, %cid, %err, "vault pointer commit failed");
                Err(err)
            }
        }
    }
}

fn open_record(record: &PointerRecord, key: &VaultKey) -> VaultResult<VaultSnapshot> {
    let plaintext = Zeroizing::new(crypto::open(&record.sealed_blob, key)?);
    codec::decode(&plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryVaultCache;
    use crate::ledger::{MemoryPointerLedger, ScriptedOutcome, ScriptedSigner};
    use crate::platform::memory::MemoryBlobStore;
    use crate::remote::MemoryRemoteStore;

    const ALICE: &str = "0x00000000000000000000000000000000000000a1";

    struct Harness {
        cache: Arc<MemoryVaultCache>,
        remote: Arc<MemoryRemoteStore>,
        ledger: Arc<MemoryPointerLedger>,
        engine: VaultSyncEngine,
        key: VaultKey,
    }

    fn harness() -> Harness {
        let cache = Arc::new(MemoryVaultCache::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let ledger = Arc::new(MemoryPointerLedger::new());
        let engine = VaultSyncEngine::new(
            Arc::clone(&cache) as Arc<dyn LocalVaultCache>,
            Arc::clone(&remote) as Arc<dyn RemoteBlobStore>,
            Arc::clone(&ledger) as Arc<dyn PointerLedger>,
        );
        Harness {
            cache,
            remote,
            ledger,
            engine,
            key: VaultKey::from_bytes([9u8; 32]),
        }
    }

    fn acme(password: &str) -> CredentialRecord {
        CredentialRecord::new("acme.com", "a", password, "")
    }

    #[tokio::test]
    async fn test_first_write_creates_record() {
        let h = harness();
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Empty);

        let write = h
            .engine
            .add_or_update(&h.key, ALICE, acme("p1"))
            .await
            .unwrap();

        assert_eq!(write.snapshot.records(), &[acme("p1")]);
        assert!(h.remote.is_pinned(&write.cid));
        assert_eq!(h.cache.get_cid(ALICE).unwrap(), Some(write.cid));
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Dirty);
        assert!(h.remote.unpinned().is_empty());
        assert_eq!(h.ledger.pointer(ALICE), None);
    }

    #[tokio::test]
    async fn test_update_replaces_and_unpins_previous() {
        let h = harness();
        let first = h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        let second = h.engine.add_or_update(&h.key, ALICE, acme("p2")).await.unwrap();

        assert_ne!(first.cid, second.cid);
        assert_eq!(second.snapshot.len(), 1);
        assert_eq!(second.snapshot.get("acme.com").unwrap().password, "p2");
        assert_eq!(h.remote.unpinned(), vec![first.cid]);
        assert_eq!(h.remote.pin_count(), 1);
    }

    #[tokio::test]
    async fn test_unpin_failure_is_swallowed() {
        let h = harness();
        let first = h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        h.remote.set_fail_unpins(true);

        let second = h.engine.add_or_update(&h.key, ALICE, acme("p2")).await.unwrap();
        assert!(h.remote.is_pinned(&first.cid));
        assert_eq!(h.cache.get_cid(ALICE).unwrap(), Some(second.cid));
    }

    #[tokio::test]
    async fn test_failed_pin_leaves_cache_untouched() {
        let h = harness();
        let first = h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        h.remote.set_fail_puts(true);

        let result = h.engine.add_or_update(&h.key, ALICE, acme("p2")).await;
        assert!(matches!(result, Err(VaultError::Remote { .. })));
        assert_eq!(h.cache.get_cid(ALICE).unwrap(), Some(first.cid));
        assert_eq!(
            h.engine.snapshot(&h.key, ALICE).unwrap().get("acme.com").unwrap().password,
            "p1"
        );
    }

    #[tokio::test]
    async fn test_noop_delete_skips_network() {
        let h = harness();
        let write = h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        let puts = h.remote.put_count();

        let delete = h.engine.delete(&h.key, ALICE, "missing.com").await.unwrap();
        assert_eq!(delete.cid, write.cid);
        assert_eq!(delete.snapshot.len(), 1);
        assert_eq!(h.remote.put_count(), puts);
        assert!(h.remote.unpinned().is_empty());

        let empty = harness();
        let delete = empty.engine.delete(&empty.key, ALICE, "missing.com").await.unwrap();
        assert_eq!(delete.cid, "");
        assert!(delete.snapshot.is_empty());
        assert_eq!(empty.remote.put_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_key_blocks_writes() {
        let h = harness();
        h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        let cid = h.cache.get_cid(ALICE).unwrap();

        let wrong = VaultKey::from_bytes([1u8; 32]);
        let result = h.engine.add_or_update(&wrong, ALICE, acme("p2")).await;
        assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
        assert_eq!(h.cache.get_cid(ALICE).unwrap(), cid);
    }

    #[tokio::test]
    async fn test_empty_website_is_rejected() {
        let h = harness();
        let result = h
            .engine
            .add_or_update(&h.key, ALICE, CredentialRecord::new("", "a", "p", ""))
            .await;
        assert!(matches!(result, Err(VaultError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_refresh_with_empty_pointer_keeps_local_vault() {
        let h = harness();
        assert!(h.engine.refresh(&h.key, ALICE).await.unwrap().is_empty());
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Empty);

        h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        let snapshot = h.engine.refresh(&h.key, ALICE).await.unwrap();
        assert_eq!(snapshot.records(), &[acme("p1")]);
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Dirty);
    }

    #[tokio::test]
    async fn test_refresh_skips_fetch_when_pointer_matches_cache() {
        let h = harness();
        let write = h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        h.engine.commit_pointer(ALICE).await.unwrap();
        h.remote.set_fail_gets(true);

        let snapshot = h.engine.refresh(&h.key, ALICE).await.unwrap();
        assert_eq!(snapshot.records(), &[acme("p1")]);
        assert_eq!(h.ledger.pointer(ALICE), Some(write.cid));
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Loaded);
    }

    #[tokio::test]
    async fn test_commit_pointer_states() {
        let h = harness();
        assert!(matches!(
            h.engine.commit_pointer(ALICE).await,
            Err(VaultError::InvalidState(_))
        ));

        let write = h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        h.ledger.signer().push(ScriptedOutcome::Fail("relay down".to_string()));
        assert!(matches!(
            h.engine.commit_pointer(ALICE).await,
            Err(VaultError::Network { .. })
        ));
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Dirty);

        let tx_hash = h.engine.commit_pointer(ALICE).await.unwrap();
        assert!(tx_hash.starts_with("0x"));
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Loaded);
        assert_eq!(h.ledger.pointer(ALICE), Some(write.cid));
    }

    #[test]
    fn test_default_engine_reads_durable_cache() {
        let store: Arc<dyn AtomicBlobStore> = Arc::new(MemoryBlobStore::new());
        let engine = VaultSyncEngine::with_defaults(
            &Environment::Testnet,
            None,
            "test-jwt".to_string(),
            Arc::clone(&store),
            Arc::new(ScriptedSigner::new()),
        );
        assert_eq!(engine.sync_state(ALICE), SyncState::Empty);

        let key = VaultKey::from_bytes([9u8; 32]);
        let snapshot = VaultSnapshot::from_records(vec![acme("p1")]);
        let blob = crypto::seal(&codec::encode(&snapshot).unwrap(), &key).unwrap();
        BlobVaultCache::new(store)
            .put(PointerRecord::new(ALICE, "QmSeed", blob))
            .unwrap();

        assert_eq!(engine.sync_state(ALICE), SyncState::Loaded);
        assert_eq!(engine.current_cid(ALICE).unwrap().as_deref(), Some("QmSeed"));
        assert_eq!(engine.snapshot(&key, ALICE).unwrap(), snapshot);
    }

    #[test]
    fn test_engine_from_config_validates() {
        let result = VaultSyncEngine::from_config(
            r#"{"pinning_api_url": "ftp://nope"}"#,
            "test-jwt".to_string(),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(ScriptedSigner::new()),
        );
        assert!(matches!(result, Err(VaultError::InvalidInput { .. })));
    }

    fn restart(h: &Harness) -> VaultSyncEngine {
        VaultSyncEngine::new(
            Arc::clone(&h.cache) as Arc<dyn LocalVaultCache>,
            Arc::clone(&h.remote) as Arc<dyn RemoteBlobStore>,
            Arc::clone(&h.ledger) as Arc<dyn PointerLedger>,
        )
    }

    #[tokio::test]
    async fn test_state_restored_from_cache() {
        let h = harness();
        h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        assert_eq!(restart(&h).sync_state(ALICE), SyncState::Dirty);
        assert_eq!(restart(&h).snapshot(&h.key, ALICE).unwrap().len(), 1);

        h.engine.commit_pointer(ALICE).await.unwrap();
        assert_eq!(restart(&h).sync_state(ALICE), SyncState::Loaded);
    }

    #[tokio::test]
    async fn test_refresh_keeps_uncommitted_edit_over_foreign_pointer() {
        let h = harness();
        let committed = h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        h.engine.commit_pointer(ALICE).await.unwrap();

        let other = harness();
        let foreign = other.engine.add_or_update(&h.key, ALICE, acme("other")).await.unwrap();
        h.ledger.set_pointer(ALICE, &foreign.cid);
        let local = h.engine.add_or_update(&h.key, ALICE, acme("p2")).await.unwrap();
        assert_ne!(committed.cid, local.cid);

        h.remote.set_fail_gets(true);
        let snapshot = h.engine.refresh(&h.key, ALICE).await.unwrap();
        assert_eq!(snapshot.get("acme.com").unwrap().password, "p2");
        assert_eq!(h.cache.get_cid(ALICE).unwrap(), Some(local.cid.clone()));
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Dirty);

        // The edit still reaches the ledger on the next commit.
        h.engine.commit_pointer(ALICE).await.unwrap();
        assert_eq!(h.ledger.pointer(ALICE), Some(local.cid));
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Loaded);
    }

    #[tokio::test]
    async fn test_refresh_clears_pending_when_pointer_caught_up() {
        let h = harness();
        let write = h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        h.ledger.set_pointer(ALICE, &write.cid);

        h.engine.refresh(&h.key, ALICE).await.unwrap();
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Loaded);
        assert!(!h.cache.get(ALICE).unwrap().unwrap().pending_commit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_syncing_while_wallet_is_open() {
        let h = Arc::new(harness());
        h.engine.add_or_update(&h.key, ALICE, acme("p1")).await.unwrap();
        h.ledger.signer().push(ScriptedOutcome::Hang);

        let pending = tokio::spawn({
            let h = Arc::clone(&h);
            async move { h.engine.commit_pointer(ALICE).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Syncing);

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(VaultError::SigningTimeout { .. })));
        assert_eq!(h.engine.sync_state(ALICE), SyncState::Dirty);
    }
}
