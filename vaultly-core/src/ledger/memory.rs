use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::contract::{encode_set_cid, parse_user_address, send_transaction_params};
use super::{
    request_signature, PointerLedger, SigningCapability, SigningOutcome, SigningRequest,
};
use crate::config::{TESTNET_CHAIN_ID, TESTNET_REGISTRY};
use crate::error::{VaultError, VaultResult};

const DEFAULT_GAS_LIMIT: u64 = 0x002d_c6c0;
const DEFAULT_SIGNING_TIMEOUT: Duration = Duration::from_secs(120);

/// What a [`ScriptedSigner`] answers to the next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Approve with the given signature or transaction hash.
    Approve(String),
    /// The user rejects.
    Reject,
    /// The wallet fails with a message.
    Fail(String),
    /// The wallet never answers.
    Hang,
}

/// A wallet stand-in answering from a queue of scripted outcomes.
///
/// With an empty queue every request is approved with `0x` + SHA-256 of the request, so
/// the same `personal_sign` request always yields the same signature.
#[derive(Debug, Default)]
pub struct ScriptedSigner {
    outcomes: Mutex<VecDeque<ScriptedOutcome>>,
    requests: Mutex<Vec<SigningRequest>>,
}

impl ScriptedSigner {
    /// Creates a signer that approves everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome of a future request.
    pub fn push(&self, outcome: ScriptedOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
    }

    /// Requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<SigningRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn default_approval(request: &SigningRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.method.as_bytes());
        hasher.update(request.params.as_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl SigningCapability for ScriptedSigner {
    async fn request(&self, request: SigningRequest) -> SigningOutcome {
        let scripted = self
            .outcomes
            .lock()
            .ok()
            .and_then(|mut outcomes| outcomes.pop_front());
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        match scripted {
            None => SigningOutcome::Approved(Self::default_approval(&request)),
            Some(ScriptedOutcome::Approve(value)) => SigningOutcome::Approved(value),
            Some(ScriptedOutcome::Reject) => SigningOutcome::Rejected,
            Some(ScriptedOutcome::Fail(error)) => SigningOutcome::Failed(error),
            Some(ScriptedOutcome::Hang) => std::future::pending().await,
        }
    }
}

/// In-process [`PointerLedger`]; writes go through a [`ScriptedSigner`].
#[derive(Debug)]
pub struct MemoryPointerLedger {
    pointers: Mutex<HashMap<String, String>>,
    signer: Arc<ScriptedSigner>,
    signing_timeout: Duration,
    fail_reads: AtomicBool,
}

impl Default for MemoryPointerLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPointerLedger {
    /// Creates an empty ledger with its own signer and the default signing timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_signer(Arc::new(ScriptedSigner::new()), DEFAULT_SIGNING_TIMEOUT)
    }

    /// Creates an empty ledger writing through `signer`.
    #[must_use]
    pub fn with_signer(signer: Arc<ScriptedSigner>, signing_timeout: Duration) -> Self {
        Self {
            pointers: Mutex::new(HashMap::new()),
            signer,
            signing_timeout,
            fail_reads: AtomicBool::new(false),
        }
    }

    /// The signer approving writes; script it to reject or hang.
    #[must_use]
    pub fn signer(&self) -> Arc<ScriptedSigner> {
        Arc::clone(&self.signer)
    }

    /// The recorded pointer for `user_id`.
    #[must_use]
    pub fn pointer(&self, user_id: &str) -> Option<String> {
        self.pointers
            .lock()
            .ok()
            .and_then(|pointers| pointers.get(user_id).cloned())
    }

    /// Records a pointer directly, as if another device had committed it.
    pub fn set_pointer(&self, user_id: &str, cid: &str) {
        if let Ok(mut pointers) = self.pointers.lock() {
            pointers.insert(user_id.to_string(), cid.to_string());
        }
    }

    /// Makes `read_pointer` fail with `Network` until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PointerLedger for MemoryPointerLedger {
    async fn read_pointer(&self, user_id: &str) -> VaultResult<String> {
        parse_user_address(user_id)?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(VaultError::Network {
                url: "memory://ledger".to_string(),
                status: None,
                error: "injected read failure".to_string(),
            });
        }
        Ok(self.pointer(user_id).unwrap_or_default())
    }

    async fn write_pointer(&self, user_id: &str, cid: &str) -> VaultResult<String> {
        let from = parse_user_address(user_id)?;
        if cid.is_empty() {
            return Err(VaultError::invalid_input("cid", "must not be empty"));
        }
        let request = SigningRequest {
            method: "eth_sendTransaction".to_string(),
            params: send_transaction_params(
                TESTNET_CHAIN_ID,
                from,
                TESTNET_REGISTRY,
                &encode_set_cid(cid),
                DEFAULT_GAS_LIMIT,
            )
            .to_string(),
        };
        let tx_hash = request_signature(self.signer.as_ref(), request, self.signing_timeout).await?;
        self.set_pointer(user_id, cid);
        Ok(tx_hash)
    }
}
