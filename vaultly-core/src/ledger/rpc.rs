use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::contract::{
    decode_cid, encode_get_cid, encode_set_cid, parse_user_address, send_transaction_params,
};
use super::{request_signature, PointerLedger, SigningCapability, SigningRequest};
use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::http_request::{HttpError, Request};

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<String>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// [`PointerLedger`] backed by the vault registry contract.
///
/// Reads go straight to a JSON-RPC node. Writes are `eth_sendTransaction` requests
/// signed and broadcast by the user's wallet.
pub struct RpcPointerLedger {
    request: Request,
    rpc_url: String,
    chain_id: u64,
    registry: Address,
    gas_limit: u64,
    signing_timeout: Duration,
    signer: Arc<dyn SigningCapability>,
}

impl RpcPointerLedger {
    /// Creates a ledger client for the registry in `config`, writing through `signer`.
    #[must_use]
    pub fn new(config: &VaultConfig, signer: Arc<dyn SigningCapability>) -> Self {
        Self {
            request: Request::new(config),
            rpc_url: config.rpc_url.clone(),
            chain_id: config.chain_id,
            registry: config.registry_address,
            gas_limit: config.gas_limit,
            signing_timeout: config.signing_timeout(),
            signer,
        }
    }

    fn registry(&self) -> VaultResult<Address> {
        if self.registry == Address::ZERO {
            return Err(VaultError::InvalidState(format!(
                "no vault registry deployed on chain {}",
                self.chain_id
            )));
        }
        Ok(self.registry)
    }

    fn network_error(&self, error: String) -> VaultError {
        VaultError::Network {
            url: self.rpc_url.clone(),
            status: None,
            error,
        }
    }

    async fn eth_call(&self, data: &[u8]) -> VaultResult<Vec<u8>> {
        let registry = self.registry()?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                {
                    "to": format!("0x{}", hex::encode(registry)),
                    "data": format!("0x{}", hex::encode(data)),
                },
                "latest"
            ],
        });

        let response = self
            .request
            .handle(self.request.post(&self.rpc_url).json(&body))
            .await
            .map_err(HttpError::into_network)?;
        if !response.status().is_success() {
            return Err(HttpError::unexpected_status(&response).into_network());
        }

        let response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| self.network_error(format!("invalid JSON-RPC response: {e}")))?;
        if let Some(error) = response.error {
            return Err(self.network_error(format!(
                "eth_call failed ({}): {}",
                error.code, error.message
            )));
        }

        let result = response.result.unwrap_or_default();
        let digits = result.strip_prefix("0x").unwrap_or(&result);
        hex::decode(digits).map_err(|e| VaultError::Decode(format!("eth_call result is not hex: {e}")))
    }
}

impl std::fmt::Debug for RpcPointerLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcPointerLedger")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PointerLedger for RpcPointerLedger {
    async fn read_pointer(&self, user_id: &str) -> VaultResult<String> {
        let user = parse_user_address(user_id)?;
        let data = self.eth_call(&encode_get_cid(user)).await?;
        decode_cid(&data)
    }

    async fn write_pointer(&self, user_id: &str, cid: &str) -> VaultResult<String> {
        let from = parse_user_address(user_id)?;
        if cid.is_empty() {
            return Err(VaultError::invalid_input("cid", "must not be empty"));
        }

        let request = SigningRequest {
            method: "eth_sendTransaction".to_string(),
            params: send_transaction_params(
                self.chain_id,
                from,
                self.registry()?,
                &encode_set_cid(cid),
                self.gas_limit,
            )
            .to_string(),
        };
        let tx_hash = request_signature(self.signer.as_ref(), request, self.signing_timeout).await?;
        tracing::info!(%tx_hash, %cid, "vault pointer transaction submitted");
        Ok(tx_hash)
    }
}
