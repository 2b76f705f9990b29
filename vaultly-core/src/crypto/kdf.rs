//! Deterministic vault key derivation from a wallet signature.
//!
//! ```text
//! ikm       = normalize(signature)        // hex-decoded when possible, UTF-8 bytes otherwise
//! prk       = HKDF-Extract(salt = 0^32, ikm)
//! vault_key = HKDF-Expand(prk, info = context, len = 32)
//! ```
//!
//! The signature itself is never stored. Re-signing the same unlock message with the same
//! wallet re-derives the same key, which is the only recovery path for the vault.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{VaultError, VaultResult};

/// Vault encryption key (256-bit).
///
/// Zeroized on drop; never logged or serialized in plaintext except through the
/// secure key storage boundary. Foreign code only ever holds an opaque handle.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, uniffi::Object)]
pub struct VaultKey([u8; 32]);

impl VaultKey {
    /// Creates a vault key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Creates a vault key from a slice, e.g. bytes read back from key storage.
    ///
    /// # Errors
    /// Returns `KeyStorage` if the slice is not exactly 32 bytes.
    pub fn try_from_slice(bytes: &[u8]) -> VaultResult<Self> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            VaultError::KeyStorage(format!(
                "vault key length mismatch: expected 32, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Returns the raw key bytes. Treat as sensitive material.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Turns a wallet signature into key material.
///
/// A `0x`-prefixed or bare hex string is decoded to bytes; anything that is not valid
/// hex is taken as its UTF-8 bytes (including the `0x` prefix, if any). The input is
/// used as given: surrounding whitespace makes it non-hex and changes the key.
///
/// # Errors
/// Returns `KeyDerivation` for an empty signature.
pub fn normalize_signature(signature: &str) -> VaultResult<Zeroizing<Vec<u8>>> {
    let digits = signature.strip_prefix("0x").unwrap_or(signature);

    let bytes = hex::decode(digits).unwrap_or_else(|_| signature.as_bytes().to_vec());
    if bytes.is_empty() {
        return Err(VaultError::KeyDerivation(
            "signature must not be empty".to_string(),
        ));
    }
    Ok(Zeroizing::new(bytes))
}

/// Derives the vault key from a wallet signature and an HKDF context string.
///
/// # Errors
/// Returns `KeyDerivation` if the signature is empty.
pub fn derive_vault_key(signature: &str, context: &[u8]) -> VaultResult<VaultKey> {
    let ikm = normalize_signature(signature)?;
    let hkdf = Hkdf::<Sha256>::new(None, &ikm);

    let mut okm = [0u8; 32];
    hkdf.expand(context, &mut okm)
        .map_err(|err| VaultError::KeyDerivation(err.to_string()))?;
    let key = VaultKey::from_bytes(okm);
    okm.zeroize();
    Ok(key)
}
