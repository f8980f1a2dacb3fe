//! In-process simulated ledger.
//!
//! Executes the fee token, oracle and minting programs from
//! [`crate::program`] against in-memory state. Every transaction is mined
//! into its own block on submission, and waiting for more confirmations
//! mines empty blocks on demand. Faults can be injected to exercise retry
//! and revert handling.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use randmint_core::{Address, MintError, NetworkId, Result, TxHash};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::client::{ContractCall, LedgerClient, TxReceipt, TxStatus};
use crate::log::{LogEntry, LogFilter, LogStream};
use crate::program::{self, gas_for, PendingLog, Program, FEE_TOKEN_PROGRAM, ORACLE_PROGRAM};

/// The first account of a local development node.
pub const DEFAULT_OPERATOR: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

/// Gas a deployment consumes.
const DEPLOY_GAS: u64 = 1_500_000;

/// Ledger operations faults can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    Deploy,
    Send,
    Confirm,
    Balance,
    Logs,
}

impl LedgerOp {
    fn name(&self) -> &'static str {
        match self {
            LedgerOp::Deploy => "deploy",
            LedgerOp::Send => "send",
            LedgerOp::Confirm => "wait_for_confirmation",
            LedgerOp::Balance => "token_balance",
            LedgerOp::Logs => "logs",
        }
    }
}

#[derive(Default)]
struct Chain {
    head: u64,
    tx_counter: u64,
    deploy_nonce: u64,
    programs: HashMap<Address, Program>,
    receipts: HashMap<TxHash, TxReceipt>,
    logs: Vec<LogEntry>,
    transient_faults: HashMap<LedgerOp, usize>,
    forced_reverts: HashMap<String, VecDeque<String>>,
    submitted: HashMap<String, usize>,
}

impl Chain {
    fn take_fault(&mut self, op: LedgerOp) -> Result<()> {
        if let Some(remaining) = self.transient_faults.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MintError::transient(op.name(), "connection reset by peer"));
            }
        }
        Ok(())
    }

    fn next_tx_hash(&mut self, network: NetworkId, sender: &Address, descriptor: &str) -> TxHash {
        self.tx_counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(network.0.to_be_bytes());
        hasher.update(self.tx_counter.to_be_bytes());
        hasher.update(sender.as_str().as_bytes());
        hasher.update(descriptor.as_bytes());
        TxHash::from_bytes(&hasher.finalize())
    }

    fn next_program_address(&mut self, deployer: &Address) -> Address {
        self.deploy_nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(deployer.as_str().as_bytes());
        hasher.update(self.deploy_nonce.to_be_bytes());
        Address::from_bytes(&hasher.finalize()[..20])
    }

    /// Mine a block holding one transaction and record its receipt.
    fn mine_transaction(
        &mut self,
        tx_hash: TxHash,
        outcome: std::result::Result<Vec<PendingLog>, String>,
        gas_used: u64,
        contract_address: Option<Address>,
    ) -> Vec<LogEntry> {
        self.head += 1;
        let block_number = self.head;

        let (status, logs) = match outcome {
            Ok(pending) => {
                let logs: Vec<LogEntry> = pending
                    .into_iter()
                    .enumerate()
                    .map(|(index, log)| LogEntry {
                        address: log.address,
                        event: log.event.to_string(),
                        fields: log.fields,
                        tx_hash: tx_hash.clone(),
                        block_number,
                        log_index: index as u64,
                    })
                    .collect();
                (TxStatus::Success, logs)
            }
            Err(reason) => (TxStatus::Reverted { reason }, Vec::new()),
        };

        let success = matches!(status, TxStatus::Success);
        self.logs.extend(logs.iter().cloned());
        self.receipts.insert(
            tx_hash.clone(),
            TxReceipt {
                tx_hash,
                block_number,
                status,
                logs: logs.clone(),
                gas_used: if success { gas_used } else { 0 },
                contract_address: if success { contract_address } else { None },
                confirmations: 1,
            },
        );
        logs
    }
}

/// A simulated ledger shared by clones.
#[derive(Clone)]
pub struct SimulatedLedger {
    network: NetworkId,
    operator: Address,
    chain: Arc<Mutex<Chain>>,
    log_tx: broadcast::Sender<LogEntry>,
}

impl SimulatedLedger {
    /// Create an empty ledger operated by [`DEFAULT_OPERATOR`].
    pub fn new(network: NetworkId) -> Self {
        Self::with_operator(network, Address::new(DEFAULT_OPERATOR))
    }

    /// Create an empty ledger with a specific operator account.
    pub fn with_operator(network: NetworkId, operator: Address) -> Self {
        let (log_tx, _) = broadcast::channel(1024);
        Self {
            network,
            operator,
            chain: Arc::new(Mutex::new(Chain::default())),
            log_tx,
        }
    }

    /// Place a program at a fixed address without a deployment transaction.
    /// Used to stand in for programs that already exist on a production
    /// network.
    pub async fn install_program(&self, address: &Address, program: &str, args: &[Value]) -> Result<()> {
        let instance = Program::construct(program, &self.operator, args)
            .map_err(|reason| MintError::rejected(format!("install {}", program), None, reason))?;
        let mut chain = self.chain.lock().await;
        chain.programs.insert(address.clone(), instance);
        tracing::debug!(program, address = %address, "Installed program");
        Ok(())
    }

    /// Stand up a fee token and an oracle coordinator at the addresses a
    /// production network profile names. The operator holds the token's
    /// initial supply.
    pub async fn install_dependencies(&self, fee_token: &Address, oracle: &Address) -> Result<()> {
        self.install_program(fee_token, FEE_TOKEN_PROGRAM, &[]).await?;
        self.install_program(oracle, ORACLE_PROGRAM, &[Value::String(fee_token.to_string())])
            .await
    }

    /// Credit fee token to an account out of thin air.
    pub async fn mint_fee_token(&self, token: &Address, to: &Address, amount: u128) -> Result<()> {
        let mut chain = self.chain.lock().await;
        let token = program::fee_token_mut(&mut chain.programs, token)
            .map_err(|reason| MintError::rejected("mint fee token", None, reason))?;
        token.credit(to, amount);
        Ok(())
    }

    /// Make the next `count` invocations of `op` fail with a transient error.
    pub async fn inject_transient(&self, op: LedgerOp, count: usize) {
        let mut chain = self.chain.lock().await;
        *chain.transient_faults.entry(op).or_insert(0) += count;
    }

    /// Make the next call of `method` revert with `reason`.
    pub async fn revert_next(&self, method: &str, reason: impl Into<String>) {
        let mut chain = self.chain.lock().await;
        chain
            .forced_reverts
            .entry(method.to_string())
            .or_default()
            .push_back(reason.into());
    }

    /// Set the token id the next "create" on `program` will mint.
    pub async fn set_next_token_id(&self, program: &Address, token_id: u64) -> Result<()> {
        let mut chain = self.chain.lock().await;
        program::minting_mut(&mut chain.programs, program)
            .and_then(|m| m.set_next_token_id(token_id))
            .map_err(|reason| MintError::rejected("set next token id", None, reason))
    }

    /// Transactions submitted for `method`. Deployments count as
    /// `deploy:<program>`.
    pub async fn submitted(&self, method: &str) -> usize {
        let chain = self.chain.lock().await;
        chain.submitted.get(method).copied().unwrap_or(0)
    }

    /// Total deployment transactions submitted.
    pub async fn deployments(&self) -> usize {
        let chain = self.chain.lock().await;
        chain
            .submitted
            .iter()
            .filter(|(k, _)| k.starts_with("deploy:"))
            .map(|(_, v)| *v)
            .sum()
    }

    /// Submit a call signed by `sender` instead of the operator.
    pub async fn send_as(&self, sender: &Address, call: &ContractCall) -> Result<TxHash> {
        let mut chain = self.chain.lock().await;
        chain.take_fault(LedgerOp::Send)?;
        *chain.submitted.entry(call.method.clone()).or_insert(0) += 1;

        let descriptor = format!("{}:{}:{:?}", call.to, call.method, call.args);
        let tx_hash = chain.next_tx_hash(self.network, sender, &descriptor);

        let required_gas = gas_for(&call.method);
        let forced = chain
            .forced_reverts
            .get_mut(&call.method)
            .and_then(|queue| queue.pop_front());

        let outcome = if let Some(reason) = forced {
            Err(reason)
        } else if call.gas_limit.is_some_and(|limit| limit < required_gas) {
            Err("out of gas".to_string())
        } else {
            let mut scratch = chain.programs.clone();
            match program::execute(&mut scratch, sender, &call.to, &call.method, &call.args) {
                Ok(logs) => {
                    chain.programs = scratch;
                    Ok(logs)
                }
                Err(reason) => Err(reason),
            }
        };

        if let Err(reason) = &outcome {
            tracing::debug!(method = %call.method, tx = %tx_hash, reason = %reason, "Simulated revert");
        }

        let logs = chain.mine_transaction(tx_hash.clone(), outcome, required_gas, None);
        drop(chain);
        for log in logs {
            // No subscribers is fine.
            let _ = self.log_tx.send(log);
        }
        Ok(tx_hash)
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    fn network(&self) -> NetworkId {
        self.network
    }

    fn operator(&self) -> Address {
        self.operator.clone()
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.chain.lock().await.head)
    }

    async fn deploy(&self, program: &str, args: &[Value]) -> Result<TxHash> {
        let mut chain = self.chain.lock().await;
        chain.take_fault(LedgerOp::Deploy)?;
        *chain.submitted.entry(format!("deploy:{}", program)).or_insert(0) += 1;

        let descriptor = format!("deploy:{}:{:?}", program, args);
        let tx_hash = chain.next_tx_hash(self.network, &self.operator, &descriptor);

        let (outcome, address) = match Program::construct(program, &self.operator, args) {
            Ok(instance) => {
                let address = chain.next_program_address(&self.operator);
                chain.programs.insert(address.clone(), instance);
                (Ok(Vec::new()), Some(address))
            }
            Err(reason) => (Err(reason), None),
        };

        chain.mine_transaction(tx_hash.clone(), outcome, DEPLOY_GAS, address);
        Ok(tx_hash)
    }

    async fn send(&self, call: &ContractCall) -> Result<TxHash> {
        let operator = self.operator.clone();
        self.send_as(&operator, call).await
    }

    async fn estimate_gas(&self, call: &ContractCall) -> Result<u64> {
        Ok(gas_for(&call.method))
    }

    async fn wait_for_confirmation(&self, tx: &TxHash, confirmations: u64) -> Result<TxReceipt> {
        let mut chain = self.chain.lock().await;
        chain.take_fault(LedgerOp::Confirm)?;

        let mut receipt = chain
            .receipts
            .get(tx)
            .cloned()
            .ok_or_else(|| MintError::Internal(format!("unknown transaction {}", tx)))?;

        let target = receipt.block_number + confirmations.max(1) - 1;
        if chain.head < target {
            chain.head = target;
        }
        receipt.confirmations = chain.head - receipt.block_number + 1;
        Ok(receipt)
    }

    async fn token_balance(&self, token: &Address, owner: &Address) -> Result<u128> {
        let mut chain = self.chain.lock().await;
        chain.take_fault(LedgerOp::Balance)?;
        match chain.programs.get(token) {
            Some(Program::FeeToken(t)) => Ok(t.balance_of(owner)),
            _ => Err(MintError::rejected(
                "balanceOf",
                None,
                format!("no fee token at {}", token),
            )),
        }
    }

    async fn token_uri(&self, program: &Address, token_id: u64) -> Result<String> {
        let chain = self.chain.lock().await;
        match chain.programs.get(program) {
            Some(Program::Minting(m)) => m
                .token_uri(token_id)
                .map_err(|reason| MintError::rejected("tokenURI", None, reason)),
            _ => Err(MintError::rejected(
                "tokenURI",
                None,
                format!("no minting program at {}", program),
            )),
        }
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let mut chain = self.chain.lock().await;
        chain.take_fault(LedgerOp::Logs)?;
        Ok(chain
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn subscribe(&self, filter: LogFilter) -> Result<LogStream> {
        let receiver = self.log_tx.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| match item {
            Ok(log) if filter.matches(&log) => Some(log),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, "Log subscription lagged");
                None
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{events, fields, methods, FEE_TOKEN_PROGRAM};
    use serde_json::json;

    async fn deployed_token(ledger: &SimulatedLedger) -> Address {
        let tx = ledger.deploy(FEE_TOKEN_PROGRAM, &[]).await.unwrap();
        let receipt = ledger.wait_for_confirmation(&tx, 1).await.unwrap();
        receipt.contract_address.unwrap()
    }

    #[tokio::test]
    async fn test_deploy_and_transfer() {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        let token = deployed_token(&ledger).await;
        let recipient = Address::new("0xbeef");

        let call = ContractCall::new(token.clone(), methods::TRANSFER)
            .arg(recipient.as_str())
            .arg("500");
        let tx = ledger.send(&call).await.unwrap();
        let receipt = ledger.wait_for_confirmation(&tx, 1).await.unwrap();

        assert!(receipt.is_success());
        assert_eq!(receipt.logs[0].event, events::TRANSFER);
        assert_eq!(receipt.logs[0].str_field(fields::VALUE), Some("500"));
        assert_eq!(ledger.token_balance(&token, &recipient).await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_confirmation_depth_mines_blocks() {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        let tx = ledger.deploy(FEE_TOKEN_PROGRAM, &[]).await.unwrap();

        let receipt = ledger.wait_for_confirmation(&tx, 3).await.unwrap();
        assert_eq!(receipt.confirmations, 3);
        assert_eq!(ledger.block_number().await.unwrap(), receipt.block_number + 2);
    }

    #[tokio::test]
    async fn test_transient_fault_is_consumed() {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        ledger.inject_transient(LedgerOp::Deploy, 1).await;

        let err = ledger.deploy(FEE_TOKEN_PROGRAM, &[]).await.unwrap_err();
        assert!(err.is_transient());
        assert!(ledger.deploy(FEE_TOKEN_PROGRAM, &[]).await.is_ok());
        assert_eq!(ledger.submitted("deploy:LinkToken").await, 1);
    }

    #[tokio::test]
    async fn test_reverted_call_leaves_state() {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        let token = deployed_token(&ledger).await;
        let operator = ledger.operator();
        let before = ledger.token_balance(&token, &operator).await.unwrap();

        ledger.revert_next(methods::TRANSFER, "paused").await;
        let call = ContractCall::new(token.clone(), methods::TRANSFER)
            .arg("0xbeef")
            .arg("1");
        let tx = ledger.send(&call).await.unwrap();
        let receipt = ledger.wait_for_confirmation(&tx, 1).await.unwrap();

        assert_eq!(
            receipt.status,
            TxStatus::Reverted {
                reason: "paused".to_string()
            }
        );
        assert!(receipt.logs.is_empty());
        assert_eq!(ledger.token_balance(&token, &operator).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_insufficient_gas_reverts() {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        let token = deployed_token(&ledger).await;
        let call = ContractCall::new(token, methods::TRANSFER)
            .arg("0xbeef")
            .arg(json!("1"))
            .with_gas_limit(10);
        let tx = ledger.send(&call).await.unwrap();
        let receipt = ledger.wait_for_confirmation(&tx, 1).await.unwrap();
        assert!(!receipt.is_success());
    }

    #[tokio::test]
    async fn test_subscription_sees_new_logs() {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        let token = deployed_token(&ledger).await;

        let mut stream = ledger
            .subscribe(LogFilter::event(token.clone(), events::TRANSFER))
            .await
            .unwrap();

        let call = ContractCall::new(token, methods::TRANSFER)
            .arg("0xbeef")
            .arg("7");
        ledger.send(&call).await.unwrap();

        let log = stream.next().await.unwrap();
        assert_eq!(log.str_field(fields::TO), Some("0xbeef"));
    }
}
