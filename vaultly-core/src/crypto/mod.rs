//! Key derivation and authenticated encryption of the vault blob.

mod aead;
mod kdf;

pub use aead::{open, open_text, seal, SealedBlob, NONCE_SIZE, TAG_SIZE};
pub use kdf::{derive_vault_key, normalize_signature, VaultKey};
