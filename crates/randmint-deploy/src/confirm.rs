//! Submission and confirmation settings shared by every write the workflow
//! performs.

use std::time::Duration;

use randmint_core::{MintError, OrchestratorConfig, Result, TxHash};
use randmint_ledger::{LedgerClient, TxReceipt};

use crate::retry::RetryPolicy;

/// How writes are confirmed and retried.
#[derive(Debug, Clone)]
pub struct Confirmer {
    /// Blocks required before a receipt is returned.
    pub confirmations: u64,
    /// Upper bound on a single confirmation wait.
    pub timeout: Duration,
    /// Backoff for transient failures.
    pub retry: RetryPolicy,
}

impl Confirmer {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            confirmations: config.confirmations,
            timeout: config.confirmation_timeout(),
            retry: RetryPolicy::from(&config.retry),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Wait for `tx` to reach the configured depth. A timeout is reported
    /// as a transient failure so callers can retry the wait.
    pub async fn wait(&self, ledger: &dyn LedgerClient, tx: &TxHash) -> Result<TxReceipt> {
        self.retry
            .retry("wait_for_confirmation", || async {
                match tokio::time::timeout(
                    self.timeout,
                    ledger.wait_for_confirmation(tx, self.confirmations),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(MintError::transient(
                        "wait_for_confirmation",
                        format!("{} not confirmed within {}ms", tx, self.timeout.as_millis()),
                    )),
                }
            })
            .await
    }
}

impl Default for Confirmer {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}
