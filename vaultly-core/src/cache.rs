//! Local source of truth for each user's latest sealed vault.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::SealedBlob;
use crate::error::{VaultError, VaultResult};
use crate::platform::AtomicBlobStore;

const ENVELOPE_VERSION: u32 = 1;

/// The cached vault of one user: the CID it was pinned under and the sealed bytes.
///
/// `sealed_blob` always opens to the snapshot pinned under `cid`; both change together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerRecord {
    /// Wallet address owning the vault.
    pub user_id: String,
    /// Handle returned by the remote blob store for `sealed_blob`.
    pub cid: String,
    /// The encrypted vault.
    pub sealed_blob: SealedBlob,
    /// Unix seconds of the last write.
    pub updated_at: u64,
    /// Pinned locally but not yet recorded on the ledger.
    #[serde(default)]
    pub pending_commit: bool,
}

impl PointerRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(user_id: impl Into<String>, cid: impl Into<String>, sealed_blob: SealedBlob) -> Self {
        Self {
            user_id: user_id.into(),
            cid: cid.into(),
            sealed_blob,
            updated_at: unix_now(),
            pending_commit: false,
        }
    }

    /// Marks the record as holding edits the ledger does not point at yet.
    #[must_use]
    pub fn uncommitted(mut self) -> Self {
        self.pending_commit = true;
        self
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// Key-value store of [`PointerRecord`]s keyed by user id. No business logic.
pub trait LocalVaultCache: Send + Sync {
    /// Returns the record for `user_id`, if any.
    ///
    /// # Errors
    /// Returns `Cache` if the backing store fails or holds an unreadable entry.
    fn get(&self, user_id: &str) -> VaultResult<Option<PointerRecord>>;

    /// Inserts or replaces the record for `record.user_id`.
    ///
    /// # Errors
    /// Returns `Cache` if the backing store fails.
    fn put(&self, record: PointerRecord) -> VaultResult<()>;

    /// Removes the record for `user_id`. Missing entries are not an error.
    ///
    /// # Errors
    /// Returns `Cache` if the backing store fails.
    fn delete(&self, user_id: &str) -> VaultResult<()>;

    /// Returns only the cached CID for `user_id`.
    ///
    /// # Errors
    /// Same as [`LocalVaultCache::get`].
    fn get_cid(&self, user_id: &str) -> VaultResult<Option<String>> {
        Ok(self.get(user_id)?.map(|record| record.cid))
    }
}

/// Cache held in process memory.
#[derive(Debug, Default)]
pub struct MemoryVaultCache {
    records: Mutex<HashMap<String, PointerRecord>>,
}

impl MemoryVaultCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> VaultResult<std::sync::MutexGuard<'_, HashMap<String, PointerRecord>>> {
        self.records
            .lock()
            .map_err(|_| VaultError::Cache("cache mutex poisoned".to_string()))
    }
}

impl LocalVaultCache for MemoryVaultCache {
    fn get(&self, user_id: &str) -> VaultResult<Option<PointerRecord>> {
        Ok(self.lock()?.get(user_id).cloned())
    }

    fn put(&self, record: PointerRecord) -> VaultResult<()> {
        self.lock()?.insert(record.user_id.clone(), record);
        Ok(())
    }

    fn delete(&self, user_id: &str) -> VaultResult<()> {
        self.lock()?.remove(user_id);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CacheEnvelope {
    version: u32,
    record: PointerRecord,
}

impl CacheEnvelope {
    fn serialize(&self) -> VaultResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| VaultError::Cache(err.to_string()))?;
        Ok(bytes)
    }

    fn deserialize(bytes: &[u8]) -> VaultResult<Self> {
        let envelope: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| VaultError::Cache(err.to_string()))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(VaultError::Cache(format!(
                "unsupported cache envelope version {}",
                envelope.version
            )));
        }
        Ok(envelope)
    }
}

/// Durable cache: one CBOR file per user in an [`AtomicBlobStore`].
///
/// Files are named after the SHA-256 of the user id so wallet addresses do not
/// appear in directory listings.
pub struct BlobVaultCache {
    store: Arc<dyn AtomicBlobStore>,
}

impl BlobVaultCache {
    /// Creates a cache persisting into `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AtomicBlobStore>) -> Self {
        Self { store }
    }

    fn file_name(user_id: &str) -> String {
        format!("vault_{}.bin", hex::encode(Sha256::digest(user_id.as_bytes())))
    }
}

impl std::fmt::Debug for BlobVaultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobVaultCache").finish_non_exhaustive()
    }
}

impl LocalVaultCache for BlobVaultCache {
    fn get(&self, user_id: &str) -> VaultResult<Option<PointerRecord>> {
        let Some(bytes) = self.store.read(Self::file_name(user_id))? else {
            return Ok(None);
        };
        let envelope = CacheEnvelope::deserialize(&bytes)?;
        if envelope.record.user_id != user_id {
            return Err(VaultError::Cache(
                "cache entry belongs to a different user".to_string(),
            ));
        }
        Ok(Some(envelope.record))
    }

    fn put(&self, record: PointerRecord) -> VaultResult<()> {
        let name = Self::file_name(&record.user_id);
        let bytes = CacheEnvelope {
            version: ENVELOPE_VERSION,
            record,
        }
        .serialize()?;
        self.store.write_atomic(name, bytes)
    }

    fn delete(&self, user_id: &str) -> VaultResult<()> {
        self.store.delete(Self::file_name(user_id))
    }
}
