//! Passive fulfillment for production networks: the external oracle calls
//! back on its own schedule and the workflow only observes the result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use randmint_core::{FulfillmentRecord, MintError, MintRequest, Result};
use randmint_deploy::Confirmer;
use randmint_ledger::LedgerClient;

use crate::watcher::{confirmed_fulfillment, fulfillment_filter, FulfillmentWatcher};

/// Observes the minting program for the fulfillment log.
pub struct PassiveWatcher {
    ledger: Arc<dyn LedgerClient>,
    confirmer: Confirmer,
    timeout: Duration,
}

impl PassiveWatcher {
    pub fn new(ledger: Arc<dyn LedgerClient>, confirmer: Confirmer, timeout: Duration) -> Self {
        Self {
            ledger,
            confirmer,
            timeout,
        }
    }
}

#[async_trait]
impl FulfillmentWatcher for PassiveWatcher {
    async fn await_fulfillment(&self, request: &MintRequest) -> Result<FulfillmentRecord> {
        let ledger = self.ledger.as_ref();
        let filter = fulfillment_filter(request);
        let started = Instant::now();

        // Subscribe before scanning history so a callback landing in between
        // is still seen.
        let mut stream = ledger.subscribe(filter.clone()).await?;

        let history = self
            .confirmer
            .retry
            .retry("logs", || ledger.logs(&filter))
            .await?;
        if let Some(log) = history.first() {
            tracing::info!(request_id = %request.request_id, tx = %log.tx_hash, "Found earlier fulfillment");
            return confirmed_fulfillment(ledger, &self.confirmer, log).await;
        }

        tracing::info!(
            request_id = %request.request_id,
            timeout_ms = self.timeout.as_millis() as u64,
            "Waiting for oracle callback"
        );
        let remaining = self.timeout.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, stream.next()).await {
            Ok(Some(log)) => {
                tracing::info!(request_id = %request.request_id, tx = %log.tx_hash, "Oracle callback observed");
                confirmed_fulfillment(ledger, &self.confirmer, &log).await
            }
            Ok(None) => Err(MintError::transient(
                "subscribe",
                "log subscription closed before fulfillment",
            )),
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(request_id = %request.request_id, waited_ms, "Fulfillment timed out");
                Err(MintError::FulfillmentTimeout {
                    request_id: request.request_id.clone(),
                    waited_ms,
                })
            }
        }
    }

    fn kind(&self) -> &'static str {
        "passive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::requested_mint;
    use randmint_core::NetworkId;
    use randmint_ledger::program::methods;
    use randmint_ledger::{ContractCall, SimulatedLedger};
    use serde_json::json;

    fn watcher(ledger: &SimulatedLedger, timeout_ms: u64) -> PassiveWatcher {
        PassiveWatcher::new(
            Arc::new(ledger.clone()),
            Confirmer {
                confirmations: 2,
                ..Confirmer::default()
            },
            Duration::from_millis(timeout_ms),
        )
    }

    async fn callback(ledger: &SimulatedLedger, oracle: &randmint_core::Address, request: &MintRequest, value: u128) {
        let call = ContractCall::new(oracle.clone(), methods::CALLBACK_WITH_RANDOMNESS)
            .arg(request.request_id.as_str())
            .arg(json!(value.to_string()))
            .arg(request.minting_program.as_str());
        ledger.send(&call).await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_then_later_call_finds_fulfillment() {
        let ledger = SimulatedLedger::new(NetworkId(4));
        let (oracle, request) = requested_mint(&ledger).await;
        let watcher = watcher(&ledger, 50);

        let err = watcher.await_fulfillment(&request).await.unwrap_err();
        assert!(matches!(err, MintError::FulfillmentTimeout { ref request_id, .. } if request_id == &request.request_id));

        callback(&ledger, &oracle, &request, 42).await;
        let creates = ledger.submitted(methods::CREATE).await;

        let record = watcher.await_fulfillment(&request).await.unwrap();
        assert_eq!(record.random_value, 42);
        assert_eq!(record.token_id, request.token_id);
        assert_eq!(ledger.submitted(methods::CREATE).await, creates);
    }

    #[tokio::test]
    async fn test_observes_live_callback() {
        let ledger = SimulatedLedger::new(NetworkId(4));
        let (oracle, request) = requested_mint(&ledger).await;
        let watcher = watcher(&ledger, 5_000);

        let delayed = {
            let ledger = ledger.clone();
            let request = request.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                callback(&ledger, &oracle, &request, 9).await;
            })
        };

        let record = watcher.await_fulfillment(&request).await.unwrap();
        delayed.await.unwrap();
        assert_eq!(record.random_value, 9);
        assert!(ledger.block_number().await.unwrap() >= record.block_number + 1);
    }
}
