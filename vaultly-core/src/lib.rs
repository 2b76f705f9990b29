#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Client-side encrypted credential vault.
//!
//! A vault of [`CredentialRecord`]s is sealed with a key derived from a wallet signature,
//! pinned to a content-addressed store, cached locally and anchored by a CID recorded
//! on-chain. [`VaultSyncEngine`] keeps the three copies consistent; [`AuthSession`]
//! decides when a key exists.
//!
//! Both are exported through UniFFI. The host app supplies storage ([`AtomicBlobStore`],
//! [`DeviceKeystore`]) and the wallet ([`SigningCapability`]) as foreign implementations.

pub mod cache;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod ledger;
pub mod logger;
pub mod platform;
pub mod remote;
pub mod session;

mod error;
pub use error::*;

// private modules
mod http_request;

pub use codec::{CredentialRecord, VaultSnapshot};
pub use config::{Environment, VaultConfig};
pub use crypto::VaultKey;
pub use engine::{SyncState, VaultSyncEngine, VaultWrite};
pub use ledger::{SigningCapability, SigningOutcome, SigningRequest};
pub use platform::{AtomicBlobStore, DeviceKeystore};
pub use session::{AuthSession, SessionPhase};

uniffi::setup_scaffolding!("vaultly_core");
