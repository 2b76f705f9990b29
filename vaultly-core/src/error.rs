use thiserror::Error;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Error outputs from `vaultly-core`.
#[derive(Debug, Error, uniffi::Error)]
pub enum VaultError {
    /// The wallet signature could not be turned into a vault key.
    #[error("key_derivation_error: {0}")]
    KeyDerivation(String),
    /// The sealed blob failed authentication (wrong key, tampered or truncated data).
    #[error("authentication_failure")]
    AuthenticationFailure,
    /// The payload is structurally invalid (bad JSON, missing fields, bad encoding).
    #[error("decode_error: {0}")]
    Decode(String),
    /// The remote blob store returned an error or could not be reached.
    #[error("remote_error: {url} (status: {status:?}): {error}")]
    Remote {
        /// The URL of the request.
        url: String,
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Human readable details.
        error: String,
    },
    /// The remote blob store has no content for the given CID.
    #[error("not_found: {cid}")]
    NotFound {
        /// The content identifier that was requested.
        cid: String,
    },
    /// The pointer ledger could not be reached or returned an error.
    #[error("network_error: {url} (status: {status:?}): {error}")]
    Network {
        /// The URL of the request.
        url: String,
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Human readable details.
        error: String,
    },
    /// The user dismissed or rejected the wallet signing prompt.
    #[error("user_rejected")]
    UserRejected,
    /// The wallet did not answer within the signing timeout.
    #[error("signing_timeout: no response after {seconds}s")]
    SigningTimeout {
        /// The timeout that elapsed.
        seconds: u64,
    },
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input: {attribute}: {reason}")]
    InvalidInput {
        /// The attribute that is invalid.
        attribute: String,
        /// The reason the input is invalid.
        reason: String,
    },
    /// Unexpected error serializing information.
    #[error("serialization_error: {0}")]
    Serialization(String),
    /// The local vault cache failed.
    #[error("cache_error: {0}")]
    Cache(String),
    /// The secure key storage failed.
    #[error("key_storage_error: {0}")]
    KeyStorage(String),
    /// The session holds no vault key.
    #[error("locked")]
    Locked,
    /// The operation is not valid in the current state.
    #[error("invalid_state: {0}")]
    InvalidState(String),
    /// A host-implemented callback failed in a way it did not declare.
    #[error("unexpected_callback_error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for VaultError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

impl VaultError {
    /// Whether retrying the same call later (with backoff) may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. } | Self::NotFound { .. } | Self::Network { .. }
        )
    }

    /// Whether local state is still valid and the user may simply try again.
    ///
    /// Key derivation and decryption failures are not recoverable with the same inputs.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.is_retryable() || matches!(self, Self::UserRejected | Self::SigningTimeout { .. })
    }

    pub(crate) fn invalid_input(attribute: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }
}
