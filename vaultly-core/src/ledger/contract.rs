//! ABI of the vault registry contract.

use std::str::FromStr;

use alloy_core::sol_types::{SolCall, SolValue};
use alloy_primitives::Address;
use serde_json::{json, Value};

use crate::error::{VaultError, VaultResult};

alloy_core::sol! {
    /// One CID per wallet address; the caller of `setCID` is the owner.
    interface IVaultRegistry {
        function setCID(string cid) external;
        function getCID(address user) external view returns (string);
    }
}

pub(crate) fn parse_user_address(user_id: &str) -> VaultResult<Address> {
    Address::from_str(user_id.trim())
        .map_err(|_| VaultError::invalid_input("user_id", "must be an EVM address"))
}

pub(crate) fn encode_get_cid(user: Address) -> Vec<u8> {
    IVaultRegistry::getCIDCall { user }.abi_encode()
}

pub(crate) fn encode_set_cid(cid: &str) -> Vec<u8> {
    IVaultRegistry::setCIDCall {
        cid: cid.to_string(),
    }
    .abi_encode()
}

/// Decodes `getCID` return data. No data means no pointer.
pub(crate) fn decode_cid(data: &[u8]) -> VaultResult<String> {
    if data.is_empty() {
        return Ok(String::new());
    }
    let cid = String::abi_decode(data)
        .map_err(|e| VaultError::Decode(format!("invalid getCID return data: {e}")))?;
    Ok(cid.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
}

/// Transaction object for `eth_sendTransaction`.
///
/// `chainId` makes the wallet refuse to sign while connected to another chain.
pub(crate) fn send_transaction_params(
    chain_id: u64,
    from: Address,
    to: Address,
    data: &[u8],
    gas_limit: u64,
) -> Value {
    json!([{
        "from": format!("0x{}", hex::encode(from)),
        "to": format!("0x{}", hex::encode(to)),
        "data": format!("0x{}", hex::encode(data)),
        "value": "0x0",
        "gas": format!("{gas_limit:#x}"),
        "chainId": format!("{chain_id:#x}"),
    }])
}
