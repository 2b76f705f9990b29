//! Unlock lifecycle: when a vault key exists and where it lives between runs.
//!
//! ```text
//! Locked ──connect_wallet──▶ AwaitingSignature ──approve_signature──▶ Unlocked
//!   ▲   ◀──reject_signature──┘                                          │
//!   ├──────────────────────────── logout ◀──────────────────────────────┘
//!   └──restore (persisted key)──────────────────────────────────────▶ Unlocked
//! ```
//!
//! The signature is consumed by key derivation and never stored. The derived key is
//! persisted through [`SecureKeyStorage`] so a restart can skip re-signing.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::cache::unix_now;
use crate::config::{Environment, VaultConfig};
use crate::crypto::{derive_vault_key, VaultKey};
use crate::error::{VaultError, VaultResult};
use crate::ledger::{parse_user_address, request_signature, SigningCapability, SigningRequest};
use crate::platform::{AtomicBlobStore, DeviceKeystore};

const KEY_ASSOCIATED_DATA: &[u8] = b"vaultly:vault-key";
const KEY_FILE: &str = "vault_key.bin";
const KEY_ENVELOPE_VERSION: u32 = 1;

/// Where the derived vault key is kept between runs.
#[async_trait]
pub trait SecureKeyStorage: Send + Sync {
    /// Returns the stored key, if any.
    ///
    /// # Errors
    /// `KeyStorage` if the storage is unreadable.
    async fn read(&self) -> VaultResult<Option<VaultKey>>;

    /// Stores `key`, replacing any previous key.
    ///
    /// # Errors
    /// `KeyStorage` or `Cache` if the key cannot be stored.
    async fn write(&self, key: &VaultKey) -> VaultResult<()>;

    /// Removes the stored key. Clearing an empty storage is not an error.
    ///
    /// # Errors
    /// `Cache` if the backing store fails.
    async fn clear(&self) -> VaultResult<()>;
}

/// Key storage that forgets everything when the process exits.
#[derive(Debug, Default)]
pub struct MemoryKeyStorage {
    key: Mutex<Option<VaultKey>>,
}

impl MemoryKeyStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureKeyStorage for MemoryKeyStorage {
    async fn read(&self) -> VaultResult<Option<VaultKey>> {
        Ok(self.key.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn write(&self, key: &VaultKey) -> VaultResult<()> {
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = Some(key.clone());
        Ok(())
    }

    async fn clear(&self) -> VaultResult<()> {
        self.key.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct KeyEnvelope {
    version: u32,
    wrapped_key: Vec<u8>,
    created_at: u64,
}

impl KeyEnvelope {
    fn serialize(&self) -> VaultResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| VaultError::KeyStorage(err.to_string()))?;
        Ok(bytes)
    }

    fn deserialize(bytes: &[u8]) -> VaultResult<Self> {
        let envelope: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| VaultError::KeyStorage(err.to_string()))?;
        if envelope.version != KEY_ENVELOPE_VERSION {
            return Err(VaultError::KeyStorage(format!(
                "unsupported key envelope version {}",
                envelope.version
            )));
        }
        Ok(envelope)
    }
}

/// Key storage that wraps the key with a [`DeviceKeystore`] and persists the wrapped
/// bytes in an [`AtomicBlobStore`].
pub struct SealedKeyStorage {
    keystore: Arc<dyn DeviceKeystore>,
    store: Arc<dyn AtomicBlobStore>,
}

impl SealedKeyStorage {
    /// Creates a storage over the platform keystore and blob store.
    #[must_use]
    pub fn new(keystore: Arc<dyn DeviceKeystore>, store: Arc<dyn AtomicBlobStore>) -> Self {
        Self { keystore, store }
    }
}

impl std::fmt::Debug for SealedKeyStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedKeyStorage").finish_non_exhaustive()
    }
}

#[async_trait]
impl SecureKeyStorage for SealedKeyStorage {
    async fn read(&self) -> VaultResult<Option<VaultKey>> {
        let Some(bytes) = self.store.read(KEY_FILE.to_string())? else {
            return Ok(None);
        };
        let envelope = KeyEnvelope::deserialize(&bytes)?;
        let key = Zeroizing::new(
            self.keystore
                .open_sealed(KEY_ASSOCIATED_DATA.to_vec(), envelope.wrapped_key)?,
        );
        VaultKey::try_from_slice(&key).map(Some)
    }

    async fn write(&self, key: &VaultKey) -> VaultResult<()> {
        let wrapped_key = self
            .keystore
            .seal(KEY_ASSOCIATED_DATA.to_vec(), key.as_bytes().to_vec())?;
        let bytes = KeyEnvelope {
            version: KEY_ENVELOPE_VERSION,
            wrapped_key,
            created_at: unix_now(),
        }
        .serialize()?;
        self.store.write_atomic(KEY_FILE.to_string(), bytes)
    }

    async fn clear(&self) -> VaultResult<()> {
        self.store.delete(KEY_FILE.to_string())
    }
}

/// Observable phase of an [`AuthSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SessionPhase {
    /// No key in memory.
    Locked,
    /// A wallet is connected and the unlock signature was requested.
    AwaitingSignature,
    /// The vault key is held in memory.
    Unlocked,
}

enum SessionState {
    Locked,
    AwaitingSignature { address: String },
    Unlocked { key: Arc<VaultKey>, address: Option<String> },
}

/// Drives the unlock lifecycle and owns the in-memory vault key.
#[derive(uniffi::Object)]
pub struct AuthSession {
    storage: Arc<dyn SecureKeyStorage>,
    key_context: String,
    unlock_message: String,
    signing_timeout: Duration,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Creates a locked session.
    #[must_use]
    pub fn new(config: &VaultConfig, storage: Arc<dyn SecureKeyStorage>) -> Self {
        Self {
            storage,
            key_context: config.key_context.clone(),
            unlock_message: config.unlock_message.clone(),
            signing_timeout: config.signing_timeout(),
            state: Mutex::new(SessionState::Locked),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expect_phase(&self, phase: SessionPhase, operation: &str) -> VaultResult<()> {
        let current = self.phase();
        if current == phase {
            Ok(())
        } else {
            Err(VaultError::InvalidState(format!(
                "{operation} is not allowed while {current:?}"
            )))
        }
    }
}

#[uniffi::export(async_runtime = "tokio")]
impl AuthSession {
    /// Creates a locked session with the SDK defaults for `environment`.
    ///
    /// The vault key is wrapped by `keystore` and persisted in `store`.
    #[uniffi::constructor]
    #[must_use]
    pub fn with_defaults(
        environment: &Environment,
        keystore: Arc<dyn DeviceKeystore>,
        store: Arc<dyn AtomicBlobStore>,
    ) -> Self {
        let config = VaultConfig::from_environment(*environment, None);
        Self::new(&config, Arc::new(SealedKeyStorage::new(keystore, store)))
    }

    /// Creates a locked session from a JSON [`VaultConfig`].
    ///
    /// # Errors
    /// Returns `InvalidInput` if the configuration does not parse or validate.
    #[uniffi::constructor]
    pub fn from_config(
        config: &str,
        keystore: Arc<dyn DeviceKeystore>,
        store: Arc<dyn AtomicBlobStore>,
    ) -> VaultResult<Self> {
        let config = VaultConfig::from_json(config)?;
        Ok(Self::new(
            &config,
            Arc::new(SealedKeyStorage::new(keystore, store)),
        ))
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        match *self.state() {
            SessionState::Locked => SessionPhase::Locked,
            SessionState::AwaitingSignature { .. } => SessionPhase::AwaitingSignature,
            SessionState::Unlocked { .. } => SessionPhase::Unlocked,
        }
    }

    /// Wallet address of the session, once connected. Unknown after [`AuthSession::restore`].
    #[must_use]
    pub fn address(&self) -> Option<String> {
        match &*self.state() {
            SessionState::Locked => None,
            SessionState::AwaitingSignature { address } => Some(address.clone()),
            SessionState::Unlocked { address, .. } => address.clone(),
        }
    }

    /// A handle to the vault key.
    ///
    /// # Errors
    /// `Locked` unless the session is unlocked.
    pub fn key(&self) -> VaultResult<Arc<VaultKey>> {
        match &*self.state() {
            SessionState::Unlocked { key, .. } => Ok(Arc::clone(key)),
            _ => Err(VaultError::Locked),
        }
    }

    /// Unlocks with a previously persisted key, skipping the signature.
    ///
    /// Returns whether a key was found; the session stays locked otherwise.
    ///
    /// # Errors
    /// `InvalidState` unless locked; `KeyStorage` if the stored key is unreadable.
    pub async fn restore(&self) -> VaultResult<bool> {
        self.expect_phase(SessionPhase::Locked, "restore")?;
        let Some(key) = self.storage.read().await? else {
            return Ok(false);
        };

        let mut state = self.state();
        if !matches!(*state, SessionState::Locked) {
            return Err(VaultError::InvalidState(
                "session changed during restore".to_string(),
            ));
        }
        *state = SessionState::Unlocked {
            key: Arc::new(key),
            address: None,
        };
        drop(state);
        tracing::info!("session restored from stored key");
        Ok(true)
    }

    /// Connects `address` and returns the `personal_sign` request to show the wallet.
    ///
    /// # Errors
    /// `InvalidState` unless locked; `InvalidInput` for a malformed address.
    pub fn connect_wallet(&self, address: &str) -> VaultResult<SigningRequest> {
        parse_user_address(address)?;
        let mut state = self.state();
        if !matches!(*state, SessionState::Locked) {
            return Err(VaultError::InvalidState(
                "connect_wallet requires a locked session".to_string(),
            ));
        }
        let address = address.trim().to_string();
        let request = SigningRequest::personal_sign(&self.unlock_message, &address);
        *state = SessionState::AwaitingSignature { address };
        Ok(request)
    }

    /// Derives the vault key from the wallet's signature, persists it and unlocks.
    ///
    /// On error the session keeps waiting for a (new) signature.
    ///
    /// # Errors
    /// `InvalidState` unless awaiting a signature; `KeyDerivation` for an empty signature;
    /// storage errors if the key cannot be persisted.
    pub async fn approve_signature(&self, signature: &str) -> VaultResult<()> {
        let address = match &*self.state() {
            SessionState::AwaitingSignature { address } => address.clone(),
            _ => {
                return Err(VaultError::InvalidState(
                    "no signature was requested".to_string(),
                ))
            }
        };

        let key = derive_vault_key(signature, self.key_context.as_bytes())?;
        self.storage.write(&key).await?;

        let mut state = self.state();
        match &*state {
            SessionState::AwaitingSignature { address: current } if *current == address => {}
            _ => {
                return Err(VaultError::InvalidState(
                    "session changed while storing the key".to_string(),
                ))
            }
        }
        *state = SessionState::Unlocked {
            key: Arc::new(key),
            address: Some(address),
        };
        drop(state);
        tracing::info!("session unlocked");
        Ok(())
    }

    /// Abandons the pending signature request.
    ///
    /// # Errors
    /// `InvalidState` unless awaiting a signature.
    pub fn reject_signature(&self) -> VaultResult<()> {
        let mut state = self.state();
        if !matches!(*state, SessionState::AwaitingSignature { .. }) {
            return Err(VaultError::InvalidState(
                "no signature was requested".to_string(),
            ));
        }
        *state = SessionState::Locked;
        Ok(())
    }

    /// Runs the whole unlock through `signer`: connect, request the signature, approve.
    ///
    /// # Errors
    /// Any error of [`AuthSession::connect_wallet`] or [`AuthSession::approve_signature`];
    /// `UserRejected`, `SigningTimeout` or `Network` from the wallet, after which the
    /// session is locked again.
    #[allow(clippy::needless_pass_by_value)]
    pub async fn unlock_with(
        &self,
        address: &str,
        signer: Arc<dyn SigningCapability>,
    ) -> VaultResult<()> {
        let request = self.connect_wallet(address)?;
        let outcome = request_signature(signer.as_ref(), request, self.signing_timeout).await;
        let signature = match outcome {
            Ok(signature) => Zeroizing::new(signature),
            Err(err) => {
                self.reject_signature()?;
                return Err(err);
            }
        };
        self.approve_signature(&signature).await
    }

    /// Locks the session, wiping the in-memory key and the stored one.
    ///
    /// The remote vault and the ledger pointer are left alone.
    ///
    /// # Errors
    /// Storage errors from clearing the stored key. The session is locked regardless.
    pub async fn logout(&self) -> VaultResult<()> {
        *self.state() = SessionState::Locked;
        tracing::info!("session locked");
        self.storage.clear().await
    }
}
