use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};

use crate::config::VaultConfig;
use crate::error::VaultError;

/// A thin wrapper over an HTTP client. Sets timeouts and the user-agent, and retries
/// transient failures (timeouts, connect errors, 429 and 5xx).
#[derive(Debug, Clone)]
pub(crate) struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl Request {
    pub(crate) fn new(config: &VaultConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: config.request_timeout(),
            max_retries: config.max_retries,
        }
    }

    /// Creates a request builder with defaults applied.
    pub(crate) fn req(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("vaultly-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.req(Method::GET, url)
    }

    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    pub(crate) fn delete(&self, url: &str) -> RequestBuilder {
        self.req(Method::DELETE, url)
    }

    /// Sends a request built by `req`/`get`/`post`/`delete`, retrying transient failures.
    ///
    /// Responses with a non-retryable status (e.g. 404) are returned as `Ok`; the caller
    /// decides what they mean.
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, HttpError> {
        let Some(template) = request_builder.try_clone() else {
            return execute_request_builder(request_builder).await;
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| {
                HttpError::permanent(
                    "<unknown>".to_string(),
                    None,
                    "request cannot be retried because it is not cloneable".to_string(),
                )
            })?;
            execute_request_builder(request_builder).await
        })
        .retry(backoff)
        .when(HttpError::is_retryable)
        .notify(|err: &HttpError, delay: Duration| {
            tracing::debug!(url = %err.url, status = ?err.status, ?delay, "retrying request");
        })
        .await
    }
}

/// Transport failure, before it is given a meaning by the remote store or the ledger.
#[derive(Debug)]
pub(crate) struct HttpError {
    pub(crate) url: String,
    pub(crate) status: Option<u16>,
    pub(crate) error: String,
    retryable: bool,
}

impl HttpError {
    const fn retryable(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: true,
        }
    }

    pub(crate) const fn permanent(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: false,
        }
    }

    const fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Builds an error for a response the caller did not expect.
    pub(crate) fn unexpected_status(response: &Response) -> Self {
        let status = response.status().as_u16();
        Self::permanent(
            response.url().to_string(),
            Some(status),
            format!("request failed with status {status}"),
        )
    }

    pub(crate) fn into_remote(self) -> VaultError {
        VaultError::Remote {
            url: self.url,
            status: self.status,
            error: self.error,
        }
    }

    pub(crate) fn into_network(self) -> VaultError {
        VaultError::Network {
            url: self.url,
            status: self.status,
            error: self.error,
        }
    }
}

async fn execute_request_builder(request_builder: RequestBuilder) -> Result<Response, HttpError> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| {
        HttpError::permanent(
            err.url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            None,
            format!("request build failed: {err}"),
        )
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(HttpError::retryable(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                ));
            }
            Ok(resp)
        }
        Err(err) => {
            if err.is_timeout() || err.is_connect() {
                return Err(HttpError::retryable(
                    url,
                    None,
                    format!("request timeout/connect error: {err}"),
                ));
            }

            Err(HttpError::permanent(url, None, format!("request failed: {err}")))
        }
    }
}
