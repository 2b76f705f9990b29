//! Storage capabilities supplied by the host platform.
//!
//! The engine never touches the filesystem or the OS keychain directly. It depends on:
//!
//! - [`AtomicBlobStore`]: crash-safe storage of small named files
//!   (the local vault cache and the wrapped vault key)
//! - [`DeviceKeystore`]: device-bound AEAD used to wrap the vault key at rest
//!
//! Both are exported so the host app can implement them in Swift or Kotlin.
//! [`FsBlobStore`] implements the blob store on a plain directory. The [`memory`]
//! implementations back tests and ephemeral sessions.

mod fs;
pub mod memory;

pub use fs::FsBlobStore;

use crate::error::VaultResult;

/// Atomic storage for small files.
///
/// Writes MUST be atomic: after a crash the target holds either the complete old
/// content or the complete new content, never a partial write.
#[uniffi::export(with_foreign)]
pub trait AtomicBlobStore: Send + Sync {
    /// Reads a blob by name. `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails (e.g. I/O error, permission denied).
    fn read(&self, name: String) -> VaultResult<Option<Vec<u8>>>;

    /// Atomically writes a blob, replacing any existing content.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_atomic(&self, name: String, bytes: Vec<u8>) -> VaultResult<()>;

    /// Deletes a blob. Deleting a missing blob is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only for actual I/O failures.
    fn delete(&self, name: String) -> VaultResult<()>;
}

/// Device-protected encryption used to wrap the vault key at rest.
///
/// Implementations must use authenticated encryption and bind `associated_data`
/// into the tag: opening with different associated data must fail. On mobile this is
/// backed by the Keychain or the Android Keystore.
#[uniffi::export(with_foreign)]
pub trait DeviceKeystore: Send + Sync {
    /// Encrypts plaintext with the device-bound key. The output carries its own nonce and tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore is unavailable or refuses the operation.
    fn seal(&self, associated_data: Vec<u8>, plaintext: Vec<u8>) -> VaultResult<Vec<u8>>;

    /// Decrypts ciphertext produced by [`DeviceKeystore::seal`].
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails, the ciphertext is malformed or the
    /// keystore is unavailable.
    fn open_sealed(&self, associated_data: Vec<u8>, ciphertext: Vec<u8>) -> VaultResult<Vec<u8>>;
}
