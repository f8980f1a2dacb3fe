//! Dependency resolution: where the fee token and the oracle live on a
//! network.
//!
//! On the local network both are mocks deployed through the registry. On
//! every other network their addresses come from the network table.

use randmint_core::{DeployedInstance, MintError, NetworkId, NetworkProfile, NetworkTable, Result};
use randmint_ledger::program::{FEE_TOKEN_PROGRAM, ORACLE_PROGRAM};
use serde_json::json;

use crate::registry::DeploymentRegistry;

/// Registry name of the mock fee token.
pub const FEE_TOKEN_MOCK: &str = FEE_TOKEN_PROGRAM;

/// Registry name of the mock oracle coordinator.
pub const ORACLE_MOCK: &str = ORACLE_PROGRAM;

/// Resolve the profile for `network`. Never deploys anything.
pub async fn resolve(
    network: NetworkId,
    table: &NetworkTable,
    registry: &DeploymentRegistry,
) -> Result<NetworkProfile> {
    let params = table.params(network)?;

    let profile = if network.is_local() {
        let fee_token = registry
            .get(FEE_TOKEN_MOCK)
            .await
            .ok_or_else(|| MintError::MissingMock {
                network,
                name: FEE_TOKEN_MOCK.to_string(),
            })?;
        let oracle = registry
            .get(ORACLE_MOCK)
            .await
            .ok_or_else(|| MintError::MissingMock {
                network,
                name: ORACLE_MOCK.to_string(),
            })?;
        params.into_profile(fee_token.address, oracle.address)?
    } else {
        let fee_token = params.fee_token.clone().ok_or_else(|| MintError::InvalidConfig {
            message: format!("network {} has no fee-token address", network),
        })?;
        let oracle = params.oracle.clone().ok_or_else(|| MintError::InvalidConfig {
            message: format!("network {} has no oracle address", network),
        })?;
        params.into_profile(fee_token, oracle)?
    };

    tracing::info!(
        network = %profile.network,
        name = %profile.name,
        fee_token = %profile.fee_token,
        oracle = %profile.oracle,
        "Resolved dependencies"
    );
    Ok(profile)
}

/// Deploy the fee-token mock and then the oracle mock wired to it. Only
/// valid on the local network. Already-deployed mocks are reused.
pub async fn deploy_mocks(registry: &DeploymentRegistry) -> Result<(DeployedInstance, DeployedInstance)> {
    let network = registry.network();
    if !network.is_local() {
        return Err(MintError::InvalidConfig {
            message: format!("mocks are only deployed on network {}, not {}", NetworkId::LOCAL, network),
        });
    }

    tracing::info!(%network, "Local network detected, deploying mocks");
    let fee_token = registry.deploy_or_get(FEE_TOKEN_MOCK, &[]).await?;
    let oracle = registry
        .deploy_or_get(ORACLE_MOCK, &[json!(fee_token.address.as_str())])
        .await?;
    tracing::info!(
        fee_token = %fee_token.address,
        oracle = %oracle.address,
        "Mocks deployed"
    );
    Ok((fee_token, oracle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::Confirmer;
    use randmint_ledger::SimulatedLedger;
    use std::sync::Arc;

    fn registry(network: NetworkId) -> DeploymentRegistry {
        DeploymentRegistry::new(Arc::new(SimulatedLedger::new(network)), Confirmer::default())
    }

    #[tokio::test]
    async fn test_local_without_mocks_fails() {
        let registry = registry(NetworkId::LOCAL);
        let err = resolve(NetworkId::LOCAL, &NetworkTable::builtin(), &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, MintError::MissingMock { ref name, .. } if name == FEE_TOKEN_MOCK));
    }

    #[tokio::test]
    async fn test_local_uses_deployed_mocks() {
        let registry = registry(NetworkId::LOCAL);
        let (token, oracle) = deploy_mocks(&registry).await.unwrap();

        let profile = resolve(NetworkId::LOCAL, &NetworkTable::builtin(), &registry)
            .await
            .unwrap();
        assert_eq!(profile.fee_token, token.address);
        assert_eq!(profile.oracle, oracle.address);
        assert!(!profile.key_hash.is_empty());
    }

    #[tokio::test]
    async fn test_production_reads_table() {
        let registry = registry(NetworkId(4));
        let profile = resolve(NetworkId(4), &NetworkTable::builtin(), &registry)
            .await
            .unwrap();
        assert!(!profile.fee_token.is_empty());
        assert!(!profile.oracle.is_empty());
        assert_eq!(registry.deployments_submitted().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_network() {
        let registry = registry(NetworkId(999));
        let err = resolve(NetworkId(999), &NetworkTable::builtin(), &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, MintError::UnknownNetwork { .. }));
    }

    #[tokio::test]
    async fn test_mocks_refused_off_local() {
        let registry = registry(NetworkId(42));
        assert!(deploy_mocks(&registry).await.is_err());
    }
}
