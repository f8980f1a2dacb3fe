//! Deployment registry.
//!
//! Records one instance per logical program name on one network. Lookups
//! and deployments are serialized by a single async mutex that stays held
//! while a deployment is confirmed, so two callers asking for the same
//! program never both deploy it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use randmint_core::{DeployedInstance, MintError, NetworkId, Result};
use randmint_ledger::LedgerClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::confirm::Confirmer;

#[derive(Debug, Default)]
struct RegistryState {
    instances: BTreeMap<String, DeployedInstance>,
    submitted: u64,
}

/// On-disk shape of a registry, one file per network.
#[derive(Debug, Serialize, Deserialize)]
struct RegistryRecord {
    network: NetworkId,
    instances: Vec<DeployedInstance>,
}

/// Idempotent deploy-or-retrieve of named programs on one network.
pub struct DeploymentRegistry {
    network: NetworkId,
    ledger: Arc<dyn LedgerClient>,
    confirmer: Confirmer,
    state: Mutex<RegistryState>,
}

impl DeploymentRegistry {
    /// Create an empty registry for the ledger's network.
    pub fn new(ledger: Arc<dyn LedgerClient>, confirmer: Confirmer) -> Self {
        Self {
            network: ledger.network(),
            ledger,
            confirmer,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Create a registry seeded from a record written by [`save`]. A missing
    /// file yields an empty registry.
    ///
    /// [`save`]: DeploymentRegistry::save
    pub async fn load(path: &Path, ledger: Arc<dyn LedgerClient>, confirmer: Confirmer) -> Result<Self> {
        let registry = Self::new(ledger, confirmer);

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No registry record yet");
                return Ok(registry);
            }
            Err(e) => {
                return Err(MintError::Registry {
                    message: format!("failed to read {}: {}", path.display(), e),
                })
            }
        };

        let record: RegistryRecord = serde_json::from_str(&contents)?;
        if record.network != registry.network {
            return Err(MintError::Registry {
                message: format!(
                    "{} records network {}, expected {}",
                    path.display(),
                    record.network,
                    registry.network
                ),
            });
        }

        {
            let mut state = registry.state.lock().await;
            for instance in record.instances {
                if instance.network != registry.network {
                    return Err(MintError::Registry {
                        message: format!(
                            "instance '{}' belongs to network {}",
                            instance.name, instance.network
                        ),
                    });
                }
                state.instances.insert(instance.name.clone(), instance.reused());
            }
            tracing::info!(
                network = %registry.network,
                instances = state.instances.len(),
                "Loaded deployment registry"
            );
        }

        Ok(registry)
    }

    /// Write every recorded instance to `path`.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let record = RegistryRecord {
            network: self.network,
            instances: self.instances().await,
        };
        let json = serde_json::to_string_pretty(&record)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| MintError::Registry {
                message: format!("failed to create {}: {}", parent.display(), e),
            })?;
        }
        tokio::fs::write(path, json).await.map_err(|e| MintError::Registry {
            message: format!("failed to write {}: {}", path.display(), e),
        })?;
        Ok(())
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    /// The ledger deployments go to.
    pub fn ledger(&self) -> Arc<dyn LedgerClient> {
        Arc::clone(&self.ledger)
    }

    pub fn confirmer(&self) -> &Confirmer {
        &self.confirmer
    }

    /// Return the instance registered as `name`, deploying it with `args`
    /// first if there is none.
    pub async fn deploy_or_get(&self, name: &str, args: &[Value]) -> Result<DeployedInstance> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.instances.get(name) {
            tracing::info!(
                name,
                address = %existing.address,
                "Reusing deployed program"
            );
            return Ok(existing.reused());
        }

        tracing::info!(name, network = %self.network, "Deploying program");
        let ledger = self.ledger.as_ref();
        let tx = self
            .confirmer
            .retry
            .retry("deploy", || ledger.deploy(name, args))
            .await?;
        state.submitted += 1;

        let receipt = self
            .confirmer
            .wait(ledger, &tx)
            .await?
            .ensure_success(&format!("deploy {}", name))?;

        let address = receipt.contract_address.clone().ok_or_else(|| {
            MintError::Internal(format!("deployment of '{}' returned no address", name))
        })?;

        let instance = DeployedInstance {
            name: name.to_string(),
            network: self.network,
            address,
            newly_deployed: true,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
        };
        state.instances.insert(name.to_string(), instance.clone());

        tracing::info!(
            name,
            address = %instance.address,
            block = instance.block_number,
            "Deployed program"
        );
        Ok(instance)
    }

    /// The instance registered as `name`, if any.
    pub async fn get(&self, name: &str) -> Option<DeployedInstance> {
        let state = self.state.lock().await;
        state.instances.get(name).map(DeployedInstance::reused)
    }

    /// All registered instances, ordered by name.
    pub async fn instances(&self) -> Vec<DeployedInstance> {
        let state = self.state.lock().await;
        state.instances.values().cloned().collect()
    }

    /// Deployment transactions this registry has submitted.
    pub async fn deployments_submitted(&self) -> u64 {
        self.state.lock().await.submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use randmint_ledger::program::{FEE_TOKEN_PROGRAM, ORACLE_PROGRAM};
    use randmint_ledger::{LedgerOp, SimulatedLedger};
    use serde_json::json;

    fn registry(ledger: &SimulatedLedger) -> DeploymentRegistry {
        let confirmer = Confirmer::default().with_retry(RetryPolicy::immediate(3));
        DeploymentRegistry::new(Arc::new(ledger.clone()), confirmer)
    }

    #[tokio::test]
    async fn test_deploy_or_get_is_idempotent() {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        let registry = registry(&ledger);

        let first = registry.deploy_or_get(FEE_TOKEN_PROGRAM, &[]).await.unwrap();
        let second = registry.deploy_or_get(FEE_TOKEN_PROGRAM, &[]).await.unwrap();

        assert!(first.newly_deployed);
        assert!(!second.newly_deployed);
        assert_eq!(first.address, second.address);
        assert_eq!(registry.deployments_submitted().await, 1);
        assert_eq!(ledger.deployments().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_deploy_once() {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        let registry = Arc::new(registry(&ledger));

        let (a, b) = tokio::join!(
            registry.deploy_or_get(FEE_TOKEN_PROGRAM, &[]),
            registry.deploy_or_get(FEE_TOKEN_PROGRAM, &[]),
        );

        assert_eq!(a.unwrap().address, b.unwrap().address);
        assert_eq!(ledger.deployments().await, 1);
    }

    #[tokio::test]
    async fn test_transient_deploy_failure_is_retried() {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        ledger.inject_transient(LedgerOp::Deploy, 2).await;
        let registry = registry(&ledger);

        let instance = registry.deploy_or_get(FEE_TOKEN_PROGRAM, &[]).await.unwrap();
        assert!(instance.newly_deployed);
        assert_eq!(registry.deployments_submitted().await, 1);
    }

    #[tokio::test]
    async fn test_failed_deployment_is_not_recorded() {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        let registry = registry(&ledger);

        let err = registry.deploy_or_get(ORACLE_PROGRAM, &[]).await.unwrap_err();
        assert!(matches!(err, MintError::ConfirmedRejection { .. }));
        assert!(registry.get(ORACLE_PROGRAM).await.is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        let registry = registry(&ledger);
        let token = registry.deploy_or_get(FEE_TOKEN_PROGRAM, &[]).await.unwrap();
        registry
            .deploy_or_get(ORACLE_PROGRAM, &[json!(token.address.as_str())])
            .await
            .unwrap();

        let path = std::env::temp_dir()
            .join(format!("randmint-registry-{}", uuid::Uuid::new_v4()))
            .join("31337.json");
        registry.save(&path).await.unwrap();

        let loaded = DeploymentRegistry::load(&path, Arc::new(ledger.clone()), Confirmer::default())
            .await
            .unwrap();
        let reloaded = loaded.get(FEE_TOKEN_PROGRAM).await.unwrap();
        assert_eq!(reloaded.address, token.address);
        assert!(!reloaded.newly_deployed);
        assert_eq!(loaded.instances().await.len(), 2);

        let other = SimulatedLedger::new(NetworkId(4));
        let err = DeploymentRegistry::load(&path, Arc::new(other), Confirmer::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MintError::Registry { .. }));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
