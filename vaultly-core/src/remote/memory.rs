use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{PinMetadata, PinnedDocument, RemoteBlobStore};
use crate::crypto::SealedBlob;
use crate::error::{VaultError, VaultResult};

const MEMORY_URL: &str = "memory://remote";

#[derive(Debug, Default)]
struct State {
    pins: HashMap<String, Vec<u8>>,
    unpinned: Vec<String>,
}

/// In-process [`RemoteBlobStore`].
///
/// Pins are keyed by `mem-<sha256 of the pinned document>`. Failures can be injected to
/// exercise the engine's error paths.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    state: Mutex<State>,
    puts: AtomicUsize,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    fail_unpins: AtomicBool,
}

impl MemoryRemoteStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> VaultResult<std::sync::MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| unavailable("store mutex poisoned"))
    }

    /// Makes every subsequent `put` fail with `Remote` until reset.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `get` fail with `Remote` until reset.
    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `unpin` fail with `Remote` until reset.
    pub fn set_fail_unpins(&self, fail: bool) {
        self.fail_unpins.store(fail, Ordering::SeqCst);
    }

    /// Stores raw document bytes under `cid`, bypassing validation.
    ///
    /// # Errors
    /// Returns `Remote` if the store mutex is poisoned.
    pub fn insert_raw(&self, cid: &str, document: Vec<u8>) -> VaultResult<()> {
        self.lock()?.pins.insert(cid.to_string(), document);
        Ok(())
    }

    /// Whether `cid` is currently pinned.
    #[must_use]
    pub fn is_pinned(&self, cid: &str) -> bool {
        self.lock().is_ok_and(|state| state.pins.contains_key(cid))
    }

    /// Number of live pins.
    #[must_use]
    pub fn pin_count(&self) -> usize {
        self.lock().map_or(0, |state| state.pins.len())
    }

    /// CIDs released through `unpin`, in call order.
    #[must_use]
    pub fn unpinned(&self) -> Vec<String> {
        self.lock()
            .map(|state| state.unpinned.clone())
            .unwrap_or_default()
    }

    /// Number of `put` calls, including failed ones.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

fn unavailable(error: &str) -> VaultError {
    VaultError::Remote {
        url: MEMORY_URL.to_string(),
        status: None,
        error: error.to_string(),
    }
}

#[async_trait]
impl RemoteBlobStore for MemoryRemoteStore {
    async fn put(&self, blob: &SealedBlob, metadata: &PinMetadata) -> VaultResult<String> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(unavailable("injected put failure"));
        }

        let document = serde_json::to_vec(&PinnedDocument::new(&metadata.user_id, blob))
            .map_err(|e| VaultError::Serialization(e.to_string()))?;
        let cid = format!("mem-{}", hex::encode(Sha256::digest(&document)));
        self.lock()?.pins.insert(cid.clone(), document);
        Ok(cid)
    }

    async fn get(&self, cid: &str) -> VaultResult<SealedBlob> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(unavailable("injected get failure"));
        }
        let document = self
            .lock()?
            .pins
            .get(cid)
            .cloned()
            .ok_or_else(|| VaultError::NotFound {
                cid: cid.to_string(),
            })?;
        PinnedDocument::from_json(&document)?.into_sealed_blob()
    }

    async fn unpin(&self, cid: &str) -> VaultResult<()> {
        if self.fail_unpins.load(Ordering::SeqCst) {
            return Err(unavailable("injected unpin failure"));
        }
        let mut state = self.lock()?;
        if state.pins.remove(cid).is_none() {
            return Err(VaultError::Remote {
                url: MEMORY_URL.to_string(),
                status: Some(404),
                error: format!("{cid} is not pinned"),
            });
        }
        state.unpinned.push(cid.to_string());
        Ok(())
    }
}
