//! Mint orchestrator: drives a [`MintSession`] from "create" to a
//! finalized artifact.

use std::sync::Arc;

use randmint_core::{
    Address, Checkpoint, FinalizedArtifact, FulfillmentRecord, MintError, MintRequest, MintState,
    OrchestratorConfig, Result, TxHash, WorkflowReceipt, WorkflowStep,
};
use randmint_deploy::Confirmer;
use randmint_ledger::program::methods;
use randmint_ledger::{ContractCall, LedgerClient};
use randmint_oracle::FulfillmentWatcher;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::extract::mint_request_from_receipt;
use crate::session::MintSession;

/// Issues the mint calls and waits for the oracle in between.
pub struct MintOrchestrator {
    ledger: Arc<dyn LedgerClient>,
    watcher: Box<dyn FulfillmentWatcher>,
    confirmer: Confirmer,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl MintOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        watcher: Box<dyn FulfillmentWatcher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            confirmer: Confirmer::from_config(&config),
            ledger,
            watcher,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use a specific confirmer instead of the one derived from config.
    pub fn with_confirmer(mut self, confirmer: Confirmer) -> Self {
        self.confirmer = confirmer;
        self
    }

    /// Abort fulfillment waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drive `session` until it is finalized or fails. On error the session
    /// is moved to `Failed`; an open request stays on the session so it
    /// can be resumed.
    pub async fn drive(
        &self,
        session: &mut MintSession,
        minting: &Address,
        receipt: &mut WorkflowReceipt,
    ) -> Result<FinalizedArtifact> {
        match self.advance(session, minting, receipt).await {
            Ok(artifact) => Ok(artifact),
            Err(e) => {
                warn!(
                    session = %session.id,
                    state = %session.state(),
                    error = %e,
                    "Mint session failed"
                );
                session.fail();
                Err(e)
            }
        }
    }

    async fn advance(
        &self,
        session: &mut MintSession,
        minting: &Address,
        receipt: &mut WorkflowReceipt,
    ) -> Result<FinalizedArtifact> {
        loop {
            match session.state() {
                MintState::Created => {
                    let request = self.create(minting, receipt).await?;
                    session.record_request(request)?;
                }
                MintState::Requested => session.begin_waiting()?,
                MintState::AwaitingFulfillment => {
                    let request = session.request().cloned().ok_or_else(|| {
                        MintError::Internal("awaiting fulfillment without a request".to_string())
                    })?;
                    let record = self.await_fulfillment(&request).await?;
                    let checkpoint = Checkpoint::confirmed(
                        WorkflowStep::Fulfill,
                        format!("random value for token {}", record.token_id),
                        record.tx_hash.clone(),
                        record.block_number,
                    );
                    session.accept_fulfillment(record)?;
                    receipt.record(checkpoint);
                }
                MintState::Fulfilled => {
                    let token_id = session
                        .request()
                        .map(|r| r.token_id)
                        .ok_or_else(|| MintError::Internal("fulfilled without a request".to_string()))?;
                    let artifact = self.finalize(minting, token_id, receipt).await?;
                    session.record_artifact(artifact.clone())?;
                    return Ok(artifact);
                }
                MintState::Finalized => {
                    return session
                        .artifact()
                        .cloned()
                        .ok_or_else(|| MintError::Internal("finalized without an artifact".to_string()));
                }
                MintState::Failed => {
                    return Err(MintError::InvalidTransition {
                        from: MintState::Failed,
                        to: MintState::Requested,
                    });
                }
            }
        }
    }

    /// Send "create" and extract the request it opened.
    async fn create(&self, minting: &Address, receipt: &mut WorkflowReceipt) -> Result<MintRequest> {
        let ledger = self.ledger.as_ref();
        let call = ContractCall::new(minting.clone(), methods::CREATE);
        let estimate = self
            .confirmer
            .retry
            .retry("estimate_gas", || ledger.estimate_gas(&call))
            .await?;
        let call = call.with_gas_limit(self.config.gas_limit_for(estimate));

        info!(minting = %minting, "Creating token");
        let tx = self
            .confirmer
            .retry
            .retry("create", || ledger.send(&call))
            .await?;
        let tx_receipt = self
            .confirmer
            .wait(ledger, &tx)
            .await?
            .ensure_success(methods::CREATE)?;

        let request = mint_request_from_receipt(&tx_receipt, minting, &ledger.operator())?;
        receipt.record(Checkpoint::confirmed(
            WorkflowStep::Create,
            format!("token {} requested", request.token_id),
            tx_receipt.tx_hash.clone(),
            tx_receipt.block_number,
        ));
        info!(
            token_id = request.token_id,
            request_id = %request.request_id,
            "Token created, randomness requested"
        );
        Ok(request)
    }

    async fn await_fulfillment(&self, request: &MintRequest) -> Result<FulfillmentRecord> {
        info!(
            request_id = %request.request_id,
            watcher = self.watcher.kind(),
            "Awaiting fulfillment"
        );
        tokio::select! {
            _ = self.cancel.cancelled() => {
                warn!(request_id = %request.request_id, "Fulfillment wait cancelled");
                Err(MintError::Cancelled(format!(
                    "waiting for fulfillment of {}",
                    request.request_id
                )))
            }
            result = self.watcher.await_fulfillment(request) => result,
        }
    }

    /// Send "finalize" with a fresh gas estimate per attempt, then read
    /// the token URI.
    async fn finalize(
        &self,
        minting: &Address,
        token_id: u64,
        receipt: &mut WorkflowReceipt,
    ) -> Result<FinalizedArtifact> {
        let ledger = self.ledger.as_ref();
        let attempts = self.config.finalize_attempts.max(1);
        let base = ContractCall::new(minting.clone(), methods::FINALIZE).arg(json!(token_id));

        let mut last_error = None;
        let mut confirmed = None;
        let mut pending: Option<TxHash> = None;
        for attempt in 1..=attempts {
            // A send whose confirmation wait gave up may still land.
            let tx = match pending.take() {
                Some(tx) => tx,
                None => match self.send_finalize(&base, token_id, attempt).await {
                    Ok(tx) => tx,
                    Err(e) if e.is_transient() => {
                        warn!(token_id, attempt, error = %e, "Finalize not submitted");
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            match self.confirmer.wait(ledger, &tx).await {
                Ok(tx_receipt) => match tx_receipt.ensure_success(methods::FINALIZE) {
                    Ok(tx_receipt) => {
                        confirmed = Some(tx_receipt);
                        break;
                    }
                    Err(e) => {
                        warn!(token_id, attempt, error = %e, "Finalize reverted");
                        last_error = Some(e);
                    }
                },
                Err(e) if e.is_transient() => {
                    warn!(token_id, attempt, tx = %tx, error = %e, "Finalize not confirmed");
                    pending = Some(tx);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let tx_receipt = match confirmed {
            Some(r) => r,
            None => {
                return Err(last_error.unwrap_or_else(|| {
                    MintError::Internal("finalize was never attempted".to_string())
                }))
            }
        };

        let token_uri = self
            .confirmer
            .retry
            .retry("tokenURI", || ledger.token_uri(minting, token_id))
            .await?;
        receipt.record(Checkpoint::confirmed(
            WorkflowStep::Finalize,
            format!("token {} finalized", token_id),
            tx_receipt.tx_hash.clone(),
            tx_receipt.block_number,
        ));
        info!(token_id, token_uri = %token_uri, "Token finalized");

        Ok(FinalizedArtifact {
            token_id,
            token_uri,
            tx_hash: tx_receipt.tx_hash,
        })
    }

    /// Submit "finalize" with a gas limit from a fresh estimate.
    async fn send_finalize(&self, base: &ContractCall, token_id: u64, attempt: u32) -> Result<TxHash> {
        let ledger = self.ledger.as_ref();
        let estimate = self
            .confirmer
            .retry
            .retry("estimate_gas", || ledger.estimate_gas(base))
            .await?;
        let gas_limit = self.config.gas_limit_for(estimate);
        let call = base.clone().with_gas_limit(gas_limit);

        info!(token_id, attempt, gas_limit, "Finalizing token");
        self.confirmer
            .retry
            .retry("finalize", || ledger.send(&call))
            .await
    }
}
