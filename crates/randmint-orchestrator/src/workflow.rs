//! End-to-end workflow: resolve dependencies, deploy, fund, mint.

use std::sync::Arc;

use randmint_core::{
    Checkpoint, DeployedInstance, FinalizedArtifact, MintError, MintState, NetworkId,
    NetworkProfile, NetworkTable, OrchestratorConfig, Result, WorkflowReceipt, WorkflowStep,
};
use randmint_deploy::{deploy_mocks, fund, resolve, Confirmer, DeploymentRegistry};
use randmint_ledger::program::MINTING_PROGRAM;
use randmint_oracle::watcher_for;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::orchestrator::MintOrchestrator;
use crate::session::MintSession;

/// Everything a run has produced so far. Kept by the caller so a failed
/// run can be inspected and resumed.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    /// Trace of confirmed steps.
    pub receipt: WorkflowReceipt,

    /// Resolved network profile, once known.
    pub profile: Option<NetworkProfile>,

    /// The minting program, once deployed or found.
    pub minting: Option<DeployedInstance>,

    /// The current mint session.
    pub session: MintSession,

    /// Sessions replaced by [`Workflow::resume`].
    pub previous_sessions: Vec<MintSession>,
}

impl WorkflowRun {
    pub fn new(network: NetworkId) -> Self {
        Self {
            receipt: WorkflowReceipt::new(network),
            profile: None,
            minting: None,
            session: MintSession::new(),
            previous_sessions: Vec::new(),
        }
    }

    /// The finalized artifact, if the run got that far.
    pub fn artifact(&self) -> Option<&FinalizedArtifact> {
        self.session.artifact()
    }
}

/// Drives one network from dependency resolution to a finalized mint.
pub struct Workflow {
    registry: Arc<DeploymentRegistry>,
    table: Arc<NetworkTable>,
    config: OrchestratorConfig,
    confirmer: Confirmer,
    cancel: CancellationToken,
}

impl Workflow {
    /// Create a workflow on the registry's network. Confirmation and retry
    /// settings are taken from the registry.
    pub fn new(registry: Arc<DeploymentRegistry>, table: Arc<NetworkTable>, config: OrchestratorConfig) -> Self {
        let confirmer = registry.confirmer().clone();
        Self {
            registry,
            table,
            config,
            confirmer,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort fulfillment waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn network(&self) -> NetworkId {
        self.registry.network()
    }

    pub fn registry(&self) -> &Arc<DeploymentRegistry> {
        &self.registry
    }

    /// Run every step from scratch.
    pub async fn run(&self) -> Result<WorkflowRun> {
        let mut run = WorkflowRun::new(self.network());
        self.execute(&mut run).await?;
        Ok(run)
    }

    /// Prepare and mint, recording progress in `run`.
    pub async fn execute(&self, run: &mut WorkflowRun) -> Result<FinalizedArtifact> {
        info!(network = %self.network(), run_id = %run.receipt.run_id, "🚀 Starting workflow");
        self.prepare(run).await?;
        self.mint(run).await
    }

    /// Resolve dependencies, deploy the minting program and fund it.
    pub async fn prepare(&self, run: &mut WorkflowRun) -> Result<()> {
        match self.prepare_inner(run).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(run, e)),
        }
    }

    async fn prepare_inner(&self, run: &mut WorkflowRun) -> Result<()> {
        let network = self.network();

        if network.is_local() {
            let (fee_token, oracle) = deploy_mocks(&self.registry).await?;
            for instance in [&fee_token, &oracle] {
                run.receipt.record(deployment_checkpoint(WorkflowStep::DeployDependency, instance));
            }
        }

        let profile = resolve(network, &self.table, &self.registry).await?;
        run.receipt.record(Checkpoint::local(
            WorkflowStep::Resolve,
            format!("{} fee token {} oracle {}", profile.name, profile.fee_token, profile.oracle),
        ));
        run.profile = Some(profile.clone());

        let minting = self
            .registry
            .deploy_or_get(MINTING_PROGRAM, &profile.minting_program_args())
            .await?;
        info!(
            network = %profile.name,
            address = %minting.address,
            args = %join_args(&profile.minting_program_args()),
            "Minting program ready for verification"
        );
        run.receipt.record(deployment_checkpoint(WorkflowStep::DeployTarget, &minting));
        run.minting = Some(minting.clone());

        let ledger = self.registry.ledger();
        let confirmation = fund(
            ledger.as_ref(),
            &self.confirmer,
            &minting.address,
            &profile.fee_token,
            profile.funding_amount,
        )
        .await?;
        run.receipt.record(Checkpoint::confirmed(
            WorkflowStep::Fund,
            format!("{} funded with {}", minting.address, profile.funding_amount),
            confirmation.tx_hash,
            confirmation.block_number,
        ));
        Ok(())
    }

    /// Drive the mint session of a prepared run to a finalized artifact.
    pub async fn mint(&self, run: &mut WorkflowRun) -> Result<FinalizedArtifact> {
        let (profile, minting) = match (&run.profile, &run.minting) {
            (Some(profile), Some(minting)) => (profile.clone(), minting.clone()),
            _ => {
                let e = MintError::Internal("mint called before prepare".to_string());
                return Err(self.fail(run, e));
            }
        };

        let ledger = self.registry.ledger();
        let watcher = watcher_for(&profile, Arc::clone(&ledger), &self.config, self.confirmer.clone());
        let orchestrator = MintOrchestrator::new(ledger, watcher, self.config.clone())
            .with_confirmer(self.confirmer.clone())
            .with_cancellation(self.cancel.clone());

        match orchestrator
            .drive(&mut run.session, &minting.address, &mut run.receipt)
            .await
        {
            Ok(artifact) => {
                run.receipt.finish(artifact.clone());
                info!(
                    token_id = artifact.token_id,
                    token_uri = %artifact.token_uri,
                    digest = %run.receipt.digest,
                    "✅ Workflow finished"
                );
                Ok(artifact)
            }
            Err(e) => Err(self.fail(run, e)),
        }
    }

    /// Continue a run whose session failed after issuing its request. The
    /// request is not issued again, and an accepted fulfillment goes
    /// straight to "finalize".
    pub async fn resume(&self, run: &mut WorkflowRun) -> Result<FinalizedArtifact> {
        let session = match run.session.resumption() {
            Some(session) => session,
            None => {
                let e = MintError::InvalidTransition {
                    from: run.session.state(),
                    to: MintState::AwaitingFulfillment,
                };
                return Err(self.fail(run, e));
            }
        };

        let previous = std::mem::replace(&mut run.session, session);
        run.previous_sessions.push(previous);
        self.mint(run).await
    }

    /// Mark the session failed and wrap `e` with where the run stopped.
    fn fail(&self, run: &mut WorkflowRun, e: MintError) -> MintError {
        if matches!(e, MintError::Workflow { .. }) {
            return e;
        }
        run.session.fail();

        let state = run.session.failed_from().unwrap_or_else(|| run.session.state());
        let last_checkpoint = run.receipt.last_checkpoint().map(|c| c.step);
        error!(
            network = %self.network(),
            state = %state,
            last_checkpoint = ?last_checkpoint,
            error = %e,
            "❌ Workflow failed"
        );
        MintError::Workflow {
            state,
            last_checkpoint,
            source: Box::new(e),
        }
    }
}

fn deployment_checkpoint(step: WorkflowStep, instance: &DeployedInstance) -> Checkpoint {
    if instance.newly_deployed {
        Checkpoint::confirmed(
            step,
            format!("{} deployed at {}", instance.name, instance.address),
            instance.tx_hash.clone(),
            instance.block_number,
        )
    } else {
        Checkpoint::local(step, format!("{} reused at {}", instance.name, instance.address))
    }
}

/// Constructor arguments space-joined, strings unquoted.
fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_args_unquotes_strings() {
        let args = vec![json!("0x01"), json!("0x02"), json!(100)];
        assert_eq!(join_args(&args), "0x01 0x02 100");
    }
}
