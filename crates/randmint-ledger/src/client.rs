//! The ledger client capability consumed by every workflow step.

use async_trait::async_trait;
use randmint_core::{Address, MintError, NetworkId, Result, TxHash};
use serde::{Deserialize, Serialize};

use crate::log::{LogEntry, LogFilter, LogStream};

/// A state-changing call to a deployed program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractCall {
    /// Target program.
    pub to: Address,

    /// Entry point name.
    pub method: String,

    /// Arguments in declaration order.
    pub args: Vec<serde_json::Value>,

    /// Gas limit. `None` lets the ledger estimate.
    pub gas_limit: Option<u64>,
}

impl ContractCall {
    /// Create a call with no arguments.
    pub fn new(to: Address, method: impl Into<String>) -> Self {
        Self {
            to,
            method: method.into(),
            args: Vec::new(),
            gas_limit: None,
        }
    }

    /// Append an argument.
    pub fn arg(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set an explicit gas limit.
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    Success,
    Reverted { reason: String },
}

/// Receipt of a transaction that reached the requested depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub status: TxStatus,

    /// Logs in emission order. Empty for reverted transactions.
    pub logs: Vec<LogEntry>,

    pub gas_used: u64,

    /// Address of the program created by a deployment.
    pub contract_address: Option<Address>,

    /// Blocks on top of and including the transaction's block.
    pub confirmations: u64,
}

impl TxReceipt {
    pub fn is_success(&self) -> bool {
        matches!(self.status, TxStatus::Success)
    }

    /// Fail with `ConfirmedRejection` naming `call` if the transaction reverted.
    pub fn ensure_success(self, call: &str) -> Result<TxReceipt> {
        match &self.status {
            TxStatus::Success => Ok(self),
            TxStatus::Reverted { reason } => Err(MintError::rejected(
                call,
                Some(self.tx_hash.clone()),
                reason.clone(),
            )),
        }
    }

    /// Logs with the given event name, in emission order.
    pub fn logs_named<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.logs.iter().filter(move |l| l.event == event)
    }
}

/// Trait for ledger clients.
///
/// Implementations map connection failures and timeouts onto
/// `MintError::TransientNetwork`, and report reverted transactions through
/// [`TxStatus::Reverted`] rather than an error.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Network this client talks to.
    fn network(&self) -> NetworkId;

    /// The single signing account used for all writes.
    fn operator(&self) -> Address;

    /// Current head block.
    async fn block_number(&self) -> Result<u64>;

    /// Submit a deployment of the named program.
    async fn deploy(&self, program: &str, args: &[serde_json::Value]) -> Result<TxHash>;

    /// Submit a call.
    async fn send(&self, call: &ContractCall) -> Result<TxHash>;

    /// Estimate the gas a call will consume.
    async fn estimate_gas(&self, call: &ContractCall) -> Result<u64>;

    /// Block until `tx` has `confirmations` blocks.
    async fn wait_for_confirmation(&self, tx: &TxHash, confirmations: u64) -> Result<TxReceipt>;

    /// Fee-token balance of `owner`.
    async fn token_balance(&self, token: &Address, owner: &Address) -> Result<u128>;

    /// Artifact reference of a finalized token.
    async fn token_uri(&self, program: &Address, token_id: u64) -> Result<String>;

    /// Historical logs matching `filter`.
    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>>;

    /// Logs matching `filter` emitted from now on.
    async fn subscribe(&self, filter: LogFilter) -> Result<LogStream>;
}
