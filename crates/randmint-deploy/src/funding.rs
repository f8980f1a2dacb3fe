//! Funding step: move the request fee from the operator to the minting
//! program.

use randmint_core::{Address, MintError, Result, TxHash};
use randmint_ledger::program::methods;
use randmint_ledger::{ContractCall, LedgerClient, TxStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::confirm::Confirmer;

/// A confirmed funding transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub confirmations: u64,
}

/// Transfer `amount` of `token` from the operator to `target`.
///
/// The operator balance is checked before anything is submitted. A
/// reverted transfer is reported as `TransferRejected` and not retried.
pub async fn fund(
    ledger: &dyn LedgerClient,
    confirmer: &Confirmer,
    target: &Address,
    token: &Address,
    amount: u128,
) -> Result<Confirmation> {
    let operator = ledger.operator();
    let available = confirmer
        .retry
        .retry("token_balance", || ledger.token_balance(token, &operator))
        .await?;

    if available < amount {
        tracing::warn!(
            operator = %operator,
            required = %amount,
            available = %available,
            "Operator cannot cover funding"
        );
        return Err(MintError::InsufficientBalance {
            required: amount,
            available,
        });
    }

    tracing::info!(target = %target, token = %token, amount = %amount, "Funding program with fee token");
    let call = ContractCall::new(token.clone(), methods::TRANSFER)
        .arg(target.as_str())
        .arg(json!(amount.to_string()));
    let tx = confirmer
        .retry
        .retry("transfer", || ledger.send(&call))
        .await?;

    let receipt = confirmer.wait(ledger, &tx).await?;
    if let TxStatus::Reverted { reason } = receipt.status {
        return Err(MintError::TransferRejected {
            target: target.clone(),
            amount,
            reason,
        });
    }

    tracing::info!(tx = %receipt.tx_hash, block = receipt.block_number, "Funding confirmed");
    Ok(Confirmation {
        tx_hash: receipt.tx_hash,
        block_number: receipt.block_number,
        confirmations: receipt.confirmations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use randmint_core::NetworkId;
    use randmint_ledger::program::{FEE_TOKEN_INITIAL_SUPPLY, FEE_TOKEN_PROGRAM};
    use randmint_ledger::{LedgerOp, SimulatedLedger};

    async fn setup() -> (SimulatedLedger, Confirmer, Address) {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        let tx = ledger.deploy(FEE_TOKEN_PROGRAM, &[]).await.unwrap();
        let token = ledger
            .wait_for_confirmation(&tx, 1)
            .await
            .unwrap()
            .contract_address
            .unwrap();
        let confirmer = Confirmer::default().with_retry(RetryPolicy::immediate(3));
        (ledger, confirmer, token)
    }

    #[tokio::test]
    async fn test_fund_transfers_amount() {
        let (ledger, confirmer, token) = setup().await;
        let target = Address::new("0x0000000000000000000000000000000000005eed");

        let confirmation = fund(&ledger, &confirmer, &target, &token, 1_000).await.unwrap();
        assert_eq!(confirmation.confirmations, 1);
        assert_eq!(ledger.token_balance(&token, &target).await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn test_insufficient_balance_submits_nothing() {
        let (ledger, confirmer, token) = setup().await;
        let target = Address::new("0x5eed");

        let err = fund(&ledger, &confirmer, &target, &token, u128::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, MintError::InsufficientBalance { required, .. } if required == u128::MAX));
        assert_eq!(ledger.submitted(methods::TRANSFER).await, 0);
    }

    #[tokio::test]
    async fn test_fund_succeeds_after_top_up() {
        let (ledger, confirmer, token) = setup().await;
        let target = Address::new("0x5eed");
        let amount = FEE_TOKEN_INITIAL_SUPPLY + 5;

        assert!(fund(&ledger, &confirmer, &target, &token, amount).await.is_err());

        ledger.mint_fee_token(&token, &ledger.operator(), 5).await.unwrap();
        fund(&ledger, &confirmer, &target, &token, amount).await.unwrap();
        assert_eq!(ledger.token_balance(&token, &target).await.unwrap(), amount);
        assert_eq!(ledger.token_balance(&token, &ledger.operator()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_revert_is_not_retried() {
        let (ledger, confirmer, token) = setup().await;
        ledger.revert_next(methods::TRANSFER, "paused").await;

        let err = fund(&ledger, &confirmer, &Address::new("0x5eed"), &token, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, MintError::TransferRejected { ref reason, .. } if reason == "paused"));
        assert_eq!(ledger.submitted(methods::TRANSFER).await, 1);
    }

    #[tokio::test]
    async fn test_transient_send_is_retried() {
        let (ledger, confirmer, token) = setup().await;
        ledger.inject_transient(LedgerOp::Send, 1).await;
        ledger.inject_transient(LedgerOp::Balance, 1).await;

        fund(&ledger, &confirmer, &Address::new("0x5eed"), &token, 10)
            .await
            .unwrap();
        assert_eq!(ledger.submitted(methods::TRANSFER).await, 1);
    }
}
