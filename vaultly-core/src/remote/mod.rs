//! Content-addressed storage of sealed vaults (pinning service + gateway).

mod memory;
mod pinata;

pub use memory::MemoryRemoteStore;
pub use pinata::PinataBlobStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::SealedBlob;
use crate::error::{VaultError, VaultResult};

/// Descriptive metadata attached to a pin. Never contains vault content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinMetadata {
    /// Wallet address owning the vault.
    pub user_id: String,
}

impl PinMetadata {
    /// Metadata for the vault of `user_id`.
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Display name of the pinned document.
    #[must_use]
    pub fn name(&self) -> String {
        format!("vault_{}.json", self.user_id)
    }
}

/// Remote store for sealed blobs.
///
/// A returned CID is a stable handle to the exact bytes put; callers must not assume it is
/// a pure hash of the content.
#[async_trait]
pub trait RemoteBlobStore: Send + Sync {
    /// Pins `blob` and returns its CID.
    ///
    /// # Errors
    /// Returns `Remote` on network failures or error responses.
    async fn put(&self, blob: &SealedBlob, metadata: &PinMetadata) -> VaultResult<String>;

    /// Fetches the blob pinned under `cid`.
    ///
    /// # Errors
    /// Returns `NotFound` if nothing is pinned under `cid`, `Remote` on other failures and
    /// `Decode` if the pinned document is malformed.
    async fn get(&self, cid: &str) -> VaultResult<SealedBlob>;

    /// Releases the pin on `cid`.
    ///
    /// # Errors
    /// Returns `Remote` on failure. Callers treat this as non-fatal.
    async fn unpin(&self, cid: &str) -> VaultResult<()>;
}

/// The JSON document stored by the pinning service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PinnedDocument {
    #[serde(default)]
    pub(crate) wallet: String,
    pub(crate) vault: PinnedVault,
}

/// `vault` holds the sealed blob object. Older app builds wrapped the blob's JSON text
/// as `{"content": "<json>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum PinnedVault {
    Sealed(SealedBlob),
    Legacy { content: String },
}

impl PinnedDocument {
    pub(crate) fn new(wallet: &str, blob: &SealedBlob) -> Self {
        Self {
            wallet: wallet.to_string(),
            vault: PinnedVault::Sealed(blob.clone()),
        }
    }

    pub(crate) fn from_json(bytes: &[u8]) -> VaultResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| VaultError::Decode(e.to_string()))
    }

    pub(crate) fn into_sealed_blob(self) -> VaultResult<SealedBlob> {
        match self.vault {
            PinnedVault::Sealed(blob) => Ok(blob),
            PinnedVault::Legacy { content } => SealedBlob::from_json(&content),
        }
    }
}
