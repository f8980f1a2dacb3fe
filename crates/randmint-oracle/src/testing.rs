//! Fixtures for watcher tests.

use randmint_core::{Address, MintRequest, RequestId};
use randmint_ledger::program::{events, fields, methods, FEE_TOKEN_PROGRAM, MINTING_PROGRAM, ORACLE_PROGRAM};
use randmint_ledger::{ContractCall, LedgerClient, SimulatedLedger};
use serde_json::{json, Value};

async fn deploy(ledger: &SimulatedLedger, program: &str, args: &[Value]) -> Address {
    let tx = ledger.deploy(program, args).await.unwrap();
    ledger
        .wait_for_confirmation(&tx, 1)
        .await
        .unwrap()
        .contract_address
        .unwrap()
}

/// Deploy all three programs, fund the minting program and issue one
/// "create". Returns the oracle address and the outstanding request.
pub(crate) async fn requested_mint(ledger: &SimulatedLedger) -> (Address, MintRequest) {
    let token = deploy(ledger, FEE_TOKEN_PROGRAM, &[]).await;
    let oracle = deploy(ledger, ORACLE_PROGRAM, &[json!(token.as_str())]).await;
    let minting = deploy(
        ledger,
        MINTING_PROGRAM,
        &[json!(oracle.as_str()), json!(token.as_str()), json!("0xkey"), json!("100")],
    )
    .await;

    let fund = ContractCall::new(token, methods::TRANSFER)
        .arg(minting.as_str())
        .arg("100");
    ledger.send(&fund).await.unwrap();

    let tx = ledger
        .send(&ContractCall::new(minting.clone(), methods::CREATE))
        .await
        .unwrap();
    let receipt = ledger.wait_for_confirmation(&tx, 1).await.unwrap();
    let log = receipt.logs_named(events::MINT_REQUESTED).next().unwrap();

    let request = MintRequest {
        token_id: log.uint_field(fields::TOKEN_ID).unwrap() as u64,
        requester: ledger.operator(),
        request_id: RequestId::new(log.str_field(fields::REQUEST_ID).unwrap()),
        minting_program: minting,
        create_tx: receipt.tx_hash.clone(),
        block_number: receipt.block_number,
    };
    (oracle, request)
}
