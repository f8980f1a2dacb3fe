//! Synthetic fulfillment for the local network: the workflow plays the
//! oracle itself by invoking the mock coordinator's callback.

use std::sync::Arc;

use async_trait::async_trait;
use randmint_core::{Address, FulfillmentRecord, MintError, MintRequest, RequestId, Result};
use randmint_deploy::Confirmer;
use randmint_ledger::program::{events, methods};
use randmint_ledger::{ContractCall, LedgerClient};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::watcher::{
    confirmed_fulfillment, fulfillment_filter, fulfillment_from_log, FulfillmentWatcher,
};

/// Deterministic seed used when the operator supplies none.
pub fn default_seed(request_id: &RequestId) -> u128 {
    let digest = Sha256::digest(request_id.as_str().as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(bytes)
}

/// Fulfills requests through the mock oracle.
pub struct SyntheticWatcher {
    ledger: Arc<dyn LedgerClient>,
    oracle: Address,
    confirmer: Confirmer,
    seed: Option<u128>,
}

impl SyntheticWatcher {
    pub fn new(ledger: Arc<dyn LedgerClient>, oracle: Address, confirmer: Confirmer) -> Self {
        Self {
            ledger,
            oracle,
            confirmer,
            seed: None,
        }
    }

    /// Deliver `seed` as the random value.
    pub fn with_seed(mut self, seed: u128) -> Self {
        self.seed = Some(seed);
        self
    }

    fn seed_for(&self, request_id: &RequestId) -> u128 {
        self.seed.unwrap_or_else(|| default_seed(request_id))
    }
}

#[async_trait]
impl FulfillmentWatcher for SyntheticWatcher {
    async fn await_fulfillment(&self, request: &MintRequest) -> Result<FulfillmentRecord> {
        let ledger = self.ledger.as_ref();
        let filter = fulfillment_filter(request);

        // A previous attempt may already have fulfilled the request.
        let existing = self
            .confirmer
            .retry
            .retry("logs", || ledger.logs(&filter))
            .await?;
        if let Some(log) = existing.first() {
            tracing::info!(request_id = %request.request_id, tx = %log.tx_hash, "Fulfillment already on chain");
            return confirmed_fulfillment(ledger, &self.confirmer, log).await;
        }

        let seed = self.seed_for(&request.request_id);
        tracing::info!(
            request_id = %request.request_id,
            oracle = %self.oracle,
            seed = %seed,
            "Fulfilling request through mock oracle"
        );

        let call = ContractCall::new(self.oracle.clone(), methods::CALLBACK_WITH_RANDOMNESS)
            .arg(request.request_id.as_str())
            .arg(json!(seed.to_string()))
            .arg(request.minting_program.as_str());
        let tx = self
            .confirmer
            .retry
            .retry("callBackWithRandomness", || ledger.send(&call))
            .await?;
        let receipt = self
            .confirmer
            .wait(ledger, &tx)
            .await?
            .ensure_success(methods::CALLBACK_WITH_RANDOMNESS)?;

        let log = receipt
            .logs_named(events::RANDOMNESS_FULFILLED)
            .find(|log| filter.matches(log))
            .ok_or_else(|| {
                MintError::extraction(
                    events::RANDOMNESS_FULFILLED,
                    "request_id",
                    format!("callback {} emitted no fulfillment for the request", receipt.tx_hash),
                )
            })?;
        fulfillment_from_log(log)
    }

    fn kind(&self) -> &'static str {
        "synthetic"
    }
}
