//! Background oracle for rehearsals.
//!
//! Watches the oracle coordinator for `RandomnessRequest` logs and answers
//! each one through `callBackWithRandomness`, the way an external oracle
//! node would on a production network.

use std::time::Duration;

use futures::StreamExt;
use randmint_core::{Address, RequestId, Result};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{ContractCall, LedgerClient};
use crate::log::LogFilter;
use crate::program::{events, fields, methods};
use crate::simulated::SimulatedLedger;

/// Account the responder signs callbacks with.
const ORACLE_NODE: &str = "0x00000000000000000000000000000000000a11ce";

/// Answers randomness requests on a simulated ledger.
pub struct OracleResponder {
    ledger: SimulatedLedger,
    coordinator: Address,
    node: Address,
    delay: Duration,
    seed: u128,
}

impl OracleResponder {
    /// Create a responder for the coordinator at `coordinator`.
    pub fn new(ledger: SimulatedLedger, coordinator: Address) -> Self {
        Self {
            ledger,
            coordinator,
            node: Address::new(ORACLE_NODE),
            delay: Duration::ZERO,
            seed: 0,
        }
    }

    /// Wait this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Mix a seed into the generated random values.
    pub fn with_seed(mut self, seed: u128) -> Self {
        self.seed = seed;
        self
    }

    /// Random value the responder delivers for `request_id`.
    pub fn random_value_for(&self, request_id: &RequestId) -> u128 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_be_bytes());
        hasher.update(request_id.as_str().as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        u128::from_be_bytes(bytes)
    }

    /// Start answering requests until `cancel` fires.
    ///
    /// The subscription is opened before this returns, so requests issued
    /// after the call are never missed.
    pub async fn spawn(self, cancel: CancellationToken) -> Result<JoinHandle<()>> {
        let filter = LogFilter::event(self.coordinator.clone(), events::RANDOMNESS_REQUEST);
        let mut requests = self.ledger.subscribe(filter).await?;
        tracing::info!(coordinator = %self.coordinator, "Oracle responder listening");

        let handle = tokio::spawn(async move {
            loop {
                let log = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = requests.next() => match next {
                        Some(log) => log,
                        None => break,
                    },
                };

                let (request_id, consumer) = match (
                    log.str_field(fields::REQUEST_ID),
                    log.str_field(fields::SENDER),
                ) {
                    (Some(id), Some(sender)) => (RequestId::new(id), Address::new(sender)),
                    _ => {
                        tracing::warn!(tx = %log.tx_hash, "Malformed randomness request ignored");
                        continue;
                    }
                };

                if !self.delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.delay) => {}
                    }
                }

                if let Err(e) = self.answer(&request_id, &consumer).await {
                    tracing::warn!(request_id = %request_id, error = %e, "Oracle callback failed");
                }
            }
            tracing::info!("Oracle responder stopped");
        });

        Ok(handle)
    }

    async fn answer(&self, request_id: &RequestId, consumer: &Address) -> Result<()> {
        let random_value = self.random_value_for(request_id);
        let call = ContractCall::new(self.coordinator.clone(), methods::CALLBACK_WITH_RANDOMNESS)
            .arg(request_id.as_str())
            .arg(json!(random_value.to_string()))
            .arg(consumer.as_str());

        let tx = self.ledger.send_as(&self.node, &call).await?;
        let receipt = self
            .ledger
            .wait_for_confirmation(&tx, 1)
            .await?
            .ensure_success(methods::CALLBACK_WITH_RANDOMNESS)?;
        tracing::debug!(request_id = %request_id, tx = %receipt.tx_hash, "Delivered randomness");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_value_depends_on_seed() {
        let ledger = SimulatedLedger::new(randmint_core::NetworkId(4));
        let request = RequestId::new("0xabcd");
        let a = OracleResponder::new(ledger.clone(), Address::new("0x01")).with_seed(1);
        let b = OracleResponder::new(ledger, Address::new("0x01")).with_seed(2);

        assert_eq!(a.random_value_for(&request), a.random_value_for(&request));
        assert_ne!(a.random_value_for(&request), b.random_value_for(&request));
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let ledger = SimulatedLedger::new(randmint_core::NetworkId(4));
        let cancel = CancellationToken::new();
        let handle = OracleResponder::new(ledger, Address::new("0x01"))
            .spawn(cancel.clone())
            .await
            .unwrap();

        cancel.cancel();
        handle.await.unwrap();
    }
}
