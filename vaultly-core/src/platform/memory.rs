//! In-memory platform implementations.
//!
//! Nothing here survives the process. The keystore key is random per instance, so
//! anything it sealed is unreadable once the instance is dropped.

use std::collections::HashMap;
use std::sync::Mutex;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};
use zeroize::Zeroizing;

use super::{AtomicBlobStore, DeviceKeystore};
use crate::crypto::{NONCE_SIZE, TAG_SIZE};
use crate::error::{VaultError, VaultResult};

/// AES-256-GCM keystore with a random in-process key.
pub struct MemoryKeystore {
    key: Zeroizing<[u8; 32]>,
}

impl MemoryKeystore {
    /// Creates a keystore with a freshly generated key.
    #[must_use]
    pub fn new() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self {
            key: Zeroizing::new(key.into()),
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()))
    }
}

impl Default for MemoryKeystore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeystore").finish_non_exhaustive()
    }
}

impl DeviceKeystore for MemoryKeystore {
    fn seal(&self, associated_data: Vec<u8>, plaintext: Vec<u8>) -> VaultResult<Vec<u8>> {
        let plaintext = Zeroizing::new(plaintext);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(
                &nonce,
                Payload {
                    msg: &plaintext,
                    aad: &associated_data,
                },
            )
            .map_err(|e| VaultError::KeyStorage(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open_sealed(&self, associated_data: Vec<u8>, ciphertext: Vec<u8>) -> VaultResult<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(VaultError::KeyStorage(
                "keystore ciphertext too short".to_string(),
            ));
        }
        let (nonce, payload) = ciphertext.split_at(NONCE_SIZE);
        self.cipher()
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: payload,
                    aad: &associated_data,
                },
            )
            .map_err(|_| VaultError::KeyStorage("keystore open failed".to_string()))
    }
}

/// [`AtomicBlobStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> VaultResult<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| VaultError::Cache("blob store mutex poisoned".to_string()))
    }
}

impl AtomicBlobStore for MemoryBlobStore {
    fn read(&self, name: String) -> VaultResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(&name).cloned())
    }

    fn write_atomic(&self, name: String, bytes: Vec<u8>) -> VaultResult<()> {
        self.lock()?.insert(name, bytes);
        Ok(())
    }

    fn delete(&self, name: String) -> VaultResult<()> {
        self.lock()?.remove(&name);
        Ok(())
    }
}
