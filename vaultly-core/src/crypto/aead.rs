//! AES-256-GCM sealing of the serialized vault.
//!
//! A sealed blob is self-describing: the 12-byte nonce travels next to the
//! ciphertext (which carries the 16-byte tag), so opening needs only the key.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::VaultKey;
use crate::error::{VaultError, VaultResult};

/// AES-GCM nonce length in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-GCM tag length in bytes.
pub const TAG_SIZE: usize = 16;

/// Nonce plus ciphertext-with-tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    /// Random per-seal nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext followed by the authentication tag.
    pub ciphertext: Vec<u8>,
}

/// JSON shape of a sealed blob. Older app builds wrote `iv`/`cipher`.
#[derive(Serialize, Deserialize)]
struct SealedBlobWire {
    #[serde(alias = "iv")]
    nonce: String,
    #[serde(alias = "cipher")]
    ciphertext: String,
}

impl From<&SealedBlob> for SealedBlobWire {
    fn from(blob: &SealedBlob) -> Self {
        Self {
            nonce: STANDARD.encode(blob.nonce),
            ciphertext: STANDARD.encode(&blob.ciphertext),
        }
    }
}

impl TryFrom<SealedBlobWire> for SealedBlob {
    type Error = VaultError;

    fn try_from(wire: SealedBlobWire) -> VaultResult<Self> {
        let nonce = STANDARD
            .decode(wire.nonce)
            .map_err(|e| VaultError::Decode(format!("nonce is not base64: {e}")))?;
        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|nonce: Vec<u8>| {
            VaultError::Decode(format!(
                "nonce length mismatch: expected {NONCE_SIZE}, got {}",
                nonce.len()
            ))
        })?;
        let ciphertext = STANDARD
            .decode(wire.ciphertext)
            .map_err(|e| VaultError::Decode(format!("ciphertext is not base64: {e}")))?;
        Ok(Self { nonce, ciphertext })
    }
}

impl Serialize for SealedBlob {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SealedBlobWire::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SealedBlob {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SealedBlobWire::deserialize(deserializer)?;
        Self::try_from(wire).map_err(serde::de::Error::custom)
    }
}

impl SealedBlob {
    /// Serializes to `{"nonce": <base64>, "ciphertext": <base64>}`.
    ///
    /// # Errors
    /// Returns `Serialization` if JSON encoding fails.
    pub fn to_json(&self) -> VaultResult<String> {
        serde_json::to_string(self).map_err(|e| VaultError::Serialization(e.to_string()))
    }

    /// Parses the JSON form produced by [`SealedBlob::to_json`] (or the legacy `iv`/`cipher` form).
    ///
    /// # Errors
    /// Returns `Decode` if the JSON or the base64 fields are malformed.
    pub fn from_json(json: &str) -> VaultResult<Self> {
        serde_json::from_str(json).map_err(|e| VaultError::Decode(e.to_string()))
    }
}

/// Encrypts `plaintext` under `key` with a fresh random nonce.
///
/// # Errors
/// Returns `Serialization` if the cipher rejects the input (not expected for in-memory payloads).
pub fn seal(plaintext: &[u8], key: &VaultKey) -> VaultResult<SealedBlob> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| VaultError::Serialization(format!("AES-256-GCM encryption failed: {e}")))?;

    Ok(SealedBlob {
        nonce: nonce.into(),
        ciphertext,
    })
}

/// Decrypts and authenticates a sealed blob.
///
/// Fails closed: a wrong key, a flipped bit or a truncated blob all yield
/// `AuthenticationFailure` and no plaintext.
///
/// # Errors
/// Returns `AuthenticationFailure` if the tag does not verify.
pub fn open(blob: &SealedBlob, key: &VaultKey) -> VaultResult<Vec<u8>> {
    if blob.ciphertext.len() < TAG_SIZE {
        return Err(VaultError::AuthenticationFailure);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(&blob.nonce), blob.ciphertext.as_slice())
        .map_err(|_| VaultError::AuthenticationFailure)
}

/// Like [`open`], additionally requiring the plaintext to be UTF-8.
///
/// # Errors
/// Returns `AuthenticationFailure` as [`open`] does, or `Decode` for non-UTF-8 plaintext.
pub fn open_text(blob: &SealedBlob, key: &VaultKey) -> VaultResult<String> {
    let plaintext = open(blob, key)?;
    String::from_utf8(plaintext).map_err(|e| {
        let mut bytes = e.into_bytes();
        zeroize::Zeroize::zeroize(&mut bytes);
        VaultError::Decode("plaintext is not valid UTF-8".to_string())
    })
}
