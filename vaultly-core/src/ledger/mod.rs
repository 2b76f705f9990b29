//! The on-chain "latest CID" pointer and the wallet signing channel used to move it.
//!
//! Reads are plain `eth_call`s. Writes need a transaction signed by the user's wallet,
//! which the engine does not own: it is reached through a [`SigningCapability`] whose
//! answer may be an approval, a rejection, a failure, or nothing at all. Every wait on
//! the wallet is bounded by the configured signing timeout.

mod contract;
mod memory;
mod rpc;

pub(crate) use contract::parse_user_address;
pub use memory::{MemoryPointerLedger, ScriptedOutcome, ScriptedSigner};
pub use rpc::RpcPointerLedger;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{VaultError, VaultResult};

/// A JSON-RPC style request handed to the wallet, e.g. `personal_sign` or `eth_sendTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct SigningRequest {
    /// Wallet RPC method.
    pub method: String,
    /// Positional parameters, serialized as a JSON array.
    pub params: String,
}

impl SigningRequest {
    /// A `personal_sign` request for `message` from `address`.
    #[must_use]
    pub fn personal_sign(message: &str, address: &str) -> Self {
        let message = format!("0x{}", hex::encode(message.as_bytes()));
        Self {
            method: "personal_sign".to_string(),
            params: json!([message, address]).to_string(),
        }
    }
}

/// Terminal answer of the wallet to a [`SigningRequest`].
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum SigningOutcome {
    /// The user approved; carries the signature or transaction hash.
    Approved(String),
    /// The user dismissed or rejected the prompt.
    Rejected,
    /// The wallet or its relay failed.
    Failed(String),
}

/// The user's wallet, as seen by the engine.
///
/// Implemented by the host app on top of its wallet connector.
#[uniffi::export(with_foreign)]
#[async_trait]
pub trait SigningCapability: Send + Sync {
    /// Presents `request` to the user and waits for the answer. May never return.
    async fn request(&self, request: SigningRequest) -> SigningOutcome;
}

/// Sends `request` through `signer`, waiting at most `timeout`.
///
/// # Errors
/// `UserRejected` on rejection, `Network` on wallet failure or an empty answer, and
/// `SigningTimeout` if the wallet does not answer in time.
pub async fn request_signature(
    signer: &dyn SigningCapability,
    request: SigningRequest,
    timeout: Duration,
) -> VaultResult<String> {
    let method = request.method.clone();
    tracing::debug!(%method, "waiting for wallet");

    let outcome = tokio::time::timeout(timeout, signer.request(request))
        .await
        .map_err(|_| {
            tracing::warn!(%method, seconds = timeout.as_secs(), "wallet did not answer");
            VaultError::SigningTimeout {
                seconds: timeout.as_secs(),
            }
        })?;

    match outcome {
        SigningOutcome::Approved(value) if value.trim().is_empty() => Err(VaultError::Network {
            url: format!("wallet://{method}"),
            status: None,
            error: "wallet approved with an empty result".to_string(),
        }),
        SigningOutcome::Approved(value) => Ok(value),
        SigningOutcome::Rejected => {
            tracing::info!(%method, "wallet request rejected by user");
            Err(VaultError::UserRejected)
        }
        SigningOutcome::Failed(error) => Err(VaultError::Network {
            url: format!("wallet://{method}"),
            status: None,
            error,
        }),
    }
}

/// External store of the latest CID per user.
#[async_trait]
pub trait PointerLedger: Send + Sync {
    /// Returns the recorded CID for `user_id`, or an empty string if none was ever set.
    ///
    /// # Errors
    /// `Network` if the ledger cannot be read; `InvalidInput` for a malformed user id.
    async fn read_pointer(&self, user_id: &str) -> VaultResult<String>;

    /// Records `cid` for `user_id` and returns the transaction hash.
    ///
    /// Suspends until the user answers the signing prompt.
    ///
    /// # Errors
    /// `UserRejected`, `SigningTimeout` or `Network`; `InvalidInput` for a malformed user id.
    async fn write_pointer(&self, user_id: &str, cid: &str) -> VaultResult<String>;
}
