//! Endpoints and tunables for the sync engine.

use std::{str::FromStr, time::Duration};

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::error::{VaultError, VaultResult};

/// Vault registry contract deployed on Polygon Amoy.
pub static TESTNET_REGISTRY: Address = address!("0x65CEA2972EDbF230E6E526eE86e17b63274aE368");

/// Chain id of Polygon Amoy.
pub const TESTNET_CHAIN_ID: u64 = 80_002;

/// HKDF info string used to derive the vault key from the unlock signature.
pub const DEFAULT_KEY_CONTEXT: &str = "Vaultly AES key v1";

/// Message the wallet is asked to `personal_sign` to unlock the vault.
pub const DEFAULT_UNLOCK_MESSAGE: &str = "Vaultly unlock request";

const PINATA_API_URL: &str = "https://api.pinata.cloud";
const PINATA_GATEWAY_URL: &str = "https://gateway.pinata.cloud";

/// Chain the vault registry lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, uniffi::Enum)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Polygon Amoy (chain id 80002).
    Testnet,
    /// Polygon PoS mainnet (chain id 137).
    Mainnet,
}

/// Full configuration of the remote collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Base URL of the pinning API.
    pub pinning_api_url: String,
    /// Base URL of the content gateway used to fetch pinned blobs.
    pub gateway_url: String,
    /// JSON-RPC endpoint for read-only ledger calls.
    pub rpc_url: String,
    /// EVM chain id of the registry.
    pub chain_id: u64,
    /// Address of the vault registry contract. Zero if none is deployed on `chain_id`.
    pub registry_address: Address,
    /// HKDF info string.
    #[serde(default = "default_key_context")]
    pub key_context: String,
    /// Message signed by the wallet to unlock.
    #[serde(default = "default_unlock_message")]
    pub unlock_message: String,
    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retries for transient HTTP failures (total attempts = retries + 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound on waiting for the wallet to answer a signing request.
    #[serde(default = "default_signing_timeout_secs")]
    pub signing_timeout_secs: u64,
    /// Gas limit attached to `setCID` transactions.
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

fn default_key_context() -> String {
    DEFAULT_KEY_CONTEXT.to_string()
}

fn default_unlock_message() -> String {
    DEFAULT_UNLOCK_MESSAGE.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    5
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_signing_timeout_secs() -> u64 {
    120
}

const fn default_gas_limit() -> u64 {
    0x002d_c6c0
}

impl VaultConfig {
    /// Returns the default configuration for an environment.
    ///
    /// `rpc_url` overrides the public RPC endpoint, which is heavily rate limited.
    ///
    /// The registry is only deployed on testnet. A mainnet configuration carries the zero
    /// address and every ledger call fails with `InvalidState` until a registry is set.
    #[must_use]
    pub fn from_environment(environment: Environment, rpc_url: Option<String>) -> Self {
        let (chain_id, default_rpc, registry_address) = match environment {
            Environment::Testnet => (
                TESTNET_CHAIN_ID,
                "https://rpc-amoy.polygon.technology",
                TESTNET_REGISTRY,
            ),
            Environment::Mainnet => (137, "https://polygon-rpc.com", Address::ZERO),
        };

        Self {
            pinning_api_url: PINATA_API_URL.to_string(),
            gateway_url: PINATA_GATEWAY_URL.to_string(),
            rpc_url: rpc_url.unwrap_or_else(|| default_rpc.to_string()),
            chain_id,
            registry_address,
            key_context: default_key_context(),
            unlock_message: default_unlock_message(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            signing_timeout_secs: default_signing_timeout_secs(),
            gas_limit: default_gas_limit(),
        }
    }

    /// Like [`VaultConfig::from_environment`], parsing the environment name (`testnet`, `mainnet`).
    ///
    /// # Errors
    /// Returns `InvalidInput` for an unknown environment name.
    pub fn from_environment_name(name: &str, rpc_url: Option<String>) -> VaultResult<Self> {
        let environment = Environment::from_str(name)
            .map_err(|e| VaultError::invalid_input("environment", e.to_string()))?;
        Ok(Self::from_environment(environment, rpc_url))
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the JSON is malformed, a URL is not http(s) or the registry
    /// address is invalid or zero.
    pub fn from_json(json: &str) -> VaultResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| VaultError::invalid_input("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> VaultResult<()> {
        for (attribute, url) in [
            ("pinning_api_url", &self.pinning_api_url),
            ("gateway_url", &self.gateway_url),
            ("rpc_url", &self.rpc_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(VaultError::invalid_input(attribute, "must be an http(s) URL"));
            }
        }
        if self.registry_address == Address::ZERO {
            return Err(VaultError::invalid_input(
                "registry_address",
                "must not be the zero address",
            ));
        }
        if self.key_context.is_empty() {
            return Err(VaultError::invalid_input("key_context", "must not be empty"));
        }
        Ok(())
    }

    /// The HTTP request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The signing timeout as a [`Duration`].
    #[must_use]
    pub const fn signing_timeout(&self) -> Duration {
        Duration::from_secs(self.signing_timeout_secs)
    }
}
