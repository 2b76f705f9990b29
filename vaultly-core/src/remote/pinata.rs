use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{PinMetadata, PinnedDocument, RemoteBlobStore};
use crate::config::VaultConfig;
use crate::crypto::SealedBlob;
use crate::error::{VaultError, VaultResult};
use crate::http_request::{HttpError, Request};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PinJsonRequest<'a> {
    pinata_content: &'a PinnedDocument,
    pinata_metadata: PinataMetadata<'a>,
}

#[derive(Serialize)]
struct PinataMetadata<'a> {
    name: String,
    keyvalues: PinataKeyValues<'a>,
}

#[derive(Serialize)]
struct PinataKeyValues<'a> {
    wallet: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct PinJsonResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// [`RemoteBlobStore`] backed by the Pinata pinning API and an IPFS gateway.
pub struct PinataBlobStore {
    request: Request,
    api_url: String,
    gateway_url: String,
    jwt: SecretString,
}

impl PinataBlobStore {
    /// Creates a store using the endpoints in `config`, authenticating with `jwt`.
    #[must_use]
    pub fn new(config: &VaultConfig, jwt: SecretString) -> Self {
        Self {
            request: Request::new(config),
            api_url: config.pinning_api_url.trim_end_matches('/').to_string(),
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            jwt,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.jwt.expose_secret())
    }
}

impl std::fmt::Debug for PinataBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinataBlobStore")
            .field("api_url", &self.api_url)
            .field("gateway_url", &self.gateway_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteBlobStore for PinataBlobStore {
    async fn put(&self, blob: &SealedBlob, metadata: &PinMetadata) -> VaultResult<String> {
        let url = format!("{}/pinning/pinJSONToIPFS", self.api_url);
        let document = PinnedDocument::new(&metadata.user_id, blob);
        let body = PinJsonRequest {
            pinata_content: &document,
            pinata_metadata: PinataMetadata {
                name: metadata.name(),
                keyvalues: PinataKeyValues {
                    wallet: &metadata.user_id,
                    kind: "vault",
                },
            },
        };

        let response = self
            .request
            .handle(
                self.request
                    .post(&url)
                    .header("Authorization", self.bearer())
                    .json(&body),
            )
            .await
            .map_err(HttpError::into_remote)?;

        if !response.status().is_success() {
            return Err(HttpError::unexpected_status(&response).into_remote());
        }

        let pinned: PinJsonResponse = response.json().await.map_err(|err| VaultError::Remote {
            url: url.clone(),
            status: None,
            error: format!("invalid pin response: {err}"),
        })?;
        if pinned.ipfs_hash.is_empty() {
            return Err(VaultError::Remote {
                url,
                status: None,
                error: "pin response carried an empty CID".to_string(),
            });
        }

        tracing::debug!(cid = %pinned.ipfs_hash, "pinned vault");
        Ok(pinned.ipfs_hash)
    }

    async fn get(&self, cid: &str) -> VaultResult<SealedBlob> {
        let url = format!("{}/ipfs/{cid}", self.gateway_url);
        let response = self
            .request
            .handle(self.request.get(&url))
            .await
            .map_err(HttpError::into_remote)?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(VaultError::NotFound {
                    cid: cid.to_string(),
                })
            }
            status if !status.is_success() => {
                return Err(HttpError::unexpected_status(&response).into_remote());
            }
            _ => {}
        }

        let bytes = response.bytes().await.map_err(|err| VaultError::Remote {
            url,
            status: None,
            error: format!("failed to read gateway response: {err}"),
        })?;
        PinnedDocument::from_json(&bytes)?.into_sealed_blob()
    }

    async fn unpin(&self, cid: &str) -> VaultResult<()> {
        let url = format!("{}/pinning/unpin/{cid}", self.api_url);
        let response = self
            .request
            .handle(
                self.request
                    .delete(&url)
                    .header("Authorization", self.bearer()),
            )
            .await
            .map_err(HttpError::into_remote)?;

        if !response.status().is_success() {
            return Err(HttpError::unexpected_status(&response).into_remote());
        }
        Ok(())
    }
}
