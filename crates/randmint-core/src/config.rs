//! Orchestrator configuration.
//!
//! Values come from [`OrchestratorConfig::default`], optionally overridden by
//! `RANDMINT_*` environment variables (a `.env` file is honored). Every
//! config is validated before use; a zero confirmation depth is rejected
//! here rather than treated as "accepted unconfirmed".

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MintError, Result};

/// Exponential backoff parameters for transient ledger errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound on the delay between attempts in milliseconds.
    pub max_delay_ms: u64,

    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            multiplier: 2.0,
        }
    }
}

/// Configuration for a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Blocks required before a transaction is treated as final. At least 1.
    pub confirmations: u64,

    /// Maximum time to wait for a single confirmation in milliseconds.
    pub confirmation_timeout_ms: u64,

    /// Maximum time to wait for the oracle callback in milliseconds.
    pub fulfillment_timeout_ms: u64,

    /// Attempts at "finalize", each with a fresh gas estimate.
    pub finalize_attempts: u32,

    /// Extra gas on top of the estimate, in percent.
    pub gas_headroom_percent: u64,

    /// Backoff for transient errors.
    pub retry: RetryConfig,

    /// Seed for synthetic fulfillment on test networks.
    pub seed: Option<u128>,

    /// JSON file overriding the built-in network table.
    pub network_table_path: Option<PathBuf>,

    /// Durable record of deployed instances.
    pub registry_path: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            confirmations: 1,
            confirmation_timeout_ms: 120_000,
            fulfillment_timeout_ms: 600_000,
            finalize_attempts: 3,
            gas_headroom_percent: 20,
            retry: RetryConfig::default(),
            seed: None,
            network_table_path: None,
            registry_path: None,
        }
    }
}

impl OrchestratorConfig {
    /// Defaults overridden by `RANDMINT_*` variables, validated.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns, validated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("RANDMINT_CONFIRMATIONS") {
            config.confirmations = parse_var("RANDMINT_CONFIRMATIONS", &v)?;
        }
        if let Some(v) = lookup("RANDMINT_CONFIRMATION_TIMEOUT_MS") {
            config.confirmation_timeout_ms = parse_var("RANDMINT_CONFIRMATION_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("RANDMINT_FULFILLMENT_TIMEOUT_MS") {
            config.fulfillment_timeout_ms = parse_var("RANDMINT_FULFILLMENT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("RANDMINT_FINALIZE_ATTEMPTS") {
            config.finalize_attempts = parse_var("RANDMINT_FINALIZE_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("RANDMINT_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_var("RANDMINT_RETRY_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("RANDMINT_RETRY_INITIAL_DELAY_MS") {
            config.retry.initial_delay_ms = parse_var("RANDMINT_RETRY_INITIAL_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("RANDMINT_SEED") {
            config.seed = Some(parse_var("RANDMINT_SEED", &v)?);
        }
        if let Some(v) = lookup("RANDMINT_NETWORK_TABLE") {
            config.network_table_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("RANDMINT_REGISTRY_PATH") {
            config.registry_path = Some(PathBuf::from(v));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the workflow cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.confirmations == 0 {
            return Err(invalid("confirmations must be at least 1"));
        }
        if self.confirmation_timeout_ms == 0 {
            return Err(invalid("confirmation_timeout_ms must be positive"));
        }
        if self.fulfillment_timeout_ms == 0 {
            return Err(invalid("fulfillment_timeout_ms must be positive"));
        }
        if self.finalize_attempts == 0 {
            return Err(invalid("finalize_attempts must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(invalid("retry.multiplier must be at least 1.0"));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(invalid("retry.max_delay_ms is below retry.initial_delay_ms"));
        }
        Ok(())
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn fulfillment_timeout(&self) -> Duration {
        Duration::from_millis(self.fulfillment_timeout_ms)
    }

    /// Gas limit for an estimate plus the configured headroom.
    pub fn gas_limit_for(&self, estimate: u64) -> u64 {
        estimate.saturating_add(estimate.saturating_mul(self.gas_headroom_percent) / 100)
    }
}

fn invalid(message: &str) -> MintError {
    MintError::InvalidConfig {
        message: message.to_string(),
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| MintError::InvalidConfig {
        message: format!("{} = '{}': {}", key, value, e),
    })
}
