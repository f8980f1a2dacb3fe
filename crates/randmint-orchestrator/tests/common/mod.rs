#![allow(dead_code)]

use std::sync::Arc;

use randmint_core::{NetworkId, NetworkTable, OrchestratorConfig};
use randmint_deploy::{Confirmer, DeploymentRegistry, RetryPolicy};
use randmint_ledger::SimulatedLedger;
use randmint_orchestrator::Workflow;

pub const RINKEBY: NetworkId = NetworkId(4);

pub fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        fulfillment_timeout_ms: 5_000,
        ..OrchestratorConfig::default()
    }
}

pub fn registry(ledger: &SimulatedLedger, config: &OrchestratorConfig) -> Arc<DeploymentRegistry> {
    let confirmer = Confirmer::from_config(config).with_retry(RetryPolicy::immediate(3));
    Arc::new(DeploymentRegistry::new(Arc::new(ledger.clone()), confirmer))
}

pub fn workflow(ledger: &SimulatedLedger, table: NetworkTable, config: OrchestratorConfig) -> Workflow {
    let registry = registry(ledger, &config);
    Workflow::new(registry, Arc::new(table), config)
}

/// A ledger on rinkeby with the fee token and oracle installed at the
/// addresses from the built-in table.
pub async fn rehearsal_ledger() -> SimulatedLedger {
    let table = NetworkTable::builtin();
    let params = table.params(RINKEBY).unwrap();
    let ledger = SimulatedLedger::new(RINKEBY);
    ledger
        .install_dependencies(
            params.fee_token.as_ref().unwrap(),
            params.oracle.as_ref().unwrap(),
        )
        .await
        .unwrap();
    ledger
}
