mod common;

use randmint_core::{MintError, MintState, NetworkId, NetworkTable, WorkflowStep};
use randmint_ledger::program::{artifact_uri, methods, MINTING_PROGRAM};
use randmint_ledger::{LedgerClient, SimulatedLedger};
use randmint_orchestrator::WorkflowRun;

#[tokio::test]
async fn test_local_run_reaches_finalized() {
    let ledger = SimulatedLedger::new(NetworkId::LOCAL);
    let workflow = common::workflow(&ledger, NetworkTable::builtin(), common::config());

    let run = workflow.run().await.unwrap();
    let artifact = run.artifact().unwrap();

    assert!(artifact.token_uri.starts_with("data:image/svg+xml"));
    assert_eq!(
        run.session.states(),
        vec![
            MintState::Created,
            MintState::Requested,
            MintState::AwaitingFulfillment,
            MintState::Fulfilled,
            MintState::Finalized,
        ]
    );
    assert_eq!(
        run.receipt.steps(),
        vec![
            WorkflowStep::DeployDependency,
            WorkflowStep::DeployDependency,
            WorkflowStep::Resolve,
            WorkflowStep::DeployTarget,
            WorkflowStep::Fund,
            WorkflowStep::Create,
            WorkflowStep::Fulfill,
            WorkflowStep::Finalize,
        ]
    );
    assert!(run.receipt.verify_digest());
    assert_eq!(run.receipt.artifact.as_ref(), Some(artifact));
}

#[tokio::test]
async fn test_repeat_run_reuses_deployments() {
    let ledger = SimulatedLedger::new(NetworkId::LOCAL);
    let workflow = common::workflow(&ledger, NetworkTable::builtin(), common::config());

    let first = workflow.run().await.unwrap();
    let second = workflow.run().await.unwrap();

    assert_eq!(ledger.deployments().await, 3);
    assert_eq!(workflow.registry().deployments_submitted().await, 3);
    assert_eq!(first.minting.as_ref().unwrap().address, second.minting.as_ref().unwrap().address);
    assert!(!second.minting.as_ref().unwrap().newly_deployed);
    assert_ne!(
        first.artifact().unwrap().token_id,
        second.artifact().unwrap().token_id
    );
}

#[tokio::test]
async fn test_seeded_token_uri_is_reproducible() {
    let mut config = common::config();
    config.seed = Some(77777);

    let mut uris = Vec::new();
    let mut digests = Vec::new();
    for _ in 0..2 {
        let ledger = SimulatedLedger::new(NetworkId::LOCAL);
        let workflow = common::workflow(&ledger, NetworkTable::builtin(), config.clone());
        let mut run = WorkflowRun::new(NetworkId::LOCAL);

        workflow.prepare(&mut run).await.unwrap();
        let minting = run.minting.as_ref().unwrap().address.clone();
        ledger.set_next_token_id(&minting, 7).await.unwrap();

        let artifact = workflow.mint(&mut run).await.unwrap();
        assert_eq!(artifact.token_id, 7);
        uris.push(artifact.token_uri);
        digests.push(run.receipt.digest.clone());
    }

    assert_eq!(uris[0], uris[1]);
    assert_eq!(uris[0], artifact_uri(7, 77777));
    assert_eq!(digests[0], digests[1]);
}

#[tokio::test]
async fn test_funding_beyond_balance_fails_before_mint() {
    let mut table = NetworkTable::builtin();
    let mut local = table.params(NetworkId::LOCAL).unwrap().clone();
    local.funding_amount = Some(u128::MAX);
    table.insert(local);

    let ledger = SimulatedLedger::new(NetworkId::LOCAL);
    let workflow = common::workflow(&ledger, table, common::config());
    let mut run = WorkflowRun::new(NetworkId::LOCAL);

    let err = workflow.execute(&mut run).await.unwrap_err();
    assert!(matches!(err.root(), MintError::InsufficientBalance { required, .. } if *required == u128::MAX));
    assert_eq!(err.failed_state(), Some(MintState::Created));
    assert_eq!(run.receipt.last_checkpoint().map(|c| c.step), Some(WorkflowStep::DeployTarget));

    let names: Vec<String> = workflow
        .registry()
        .instances()
        .await
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.iter().any(|n| n == MINTING_PROGRAM));
    assert_eq!(ledger.submitted(methods::TRANSFER).await, 0);
    assert_eq!(ledger.submitted(methods::CREATE).await, 0);
}

#[tokio::test]
async fn test_finalize_retried_with_fresh_estimate() {
    let ledger = SimulatedLedger::new(NetworkId::LOCAL);
    let workflow = common::workflow(&ledger, NetworkTable::builtin(), common::config());
    ledger.revert_next(methods::FINALIZE, "out of gas").await;

    let run = workflow.run().await.unwrap();
    assert!(run.artifact().is_some());
    assert_eq!(ledger.submitted(methods::FINALIZE).await, 2);
}

#[tokio::test]
async fn test_finalize_exhaustion_names_the_call() {
    let mut config = common::config();
    config.finalize_attempts = 1;
    let ledger = SimulatedLedger::new(NetworkId::LOCAL);
    let workflow = common::workflow(&ledger, NetworkTable::builtin(), config);
    ledger.revert_next(methods::FINALIZE, "out of gas").await;

    let mut run = WorkflowRun::new(NetworkId::LOCAL);
    let err = workflow.execute(&mut run).await.unwrap_err();

    match err.root() {
        MintError::ConfirmedRejection { call, reason, .. } => {
            assert_eq!(call, methods::FINALIZE);
            assert_eq!(reason, "out of gas");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.failed_state(), Some(MintState::Fulfilled));
    assert!(!err.is_recoverable());
    assert_eq!(run.session.state(), MintState::Failed);
}

#[tokio::test]
async fn test_transient_faults_are_absorbed() {
    let ledger = SimulatedLedger::new(NetworkId::LOCAL);
    ledger.inject_transient(randmint_ledger::LedgerOp::Send, 2).await;
    ledger.inject_transient(randmint_ledger::LedgerOp::Confirm, 1).await;
    let workflow = common::workflow(&ledger, NetworkTable::builtin(), common::config());

    let run = workflow.run().await.unwrap();
    assert_eq!(run.session.state(), MintState::Finalized);
    assert_eq!(ledger.submitted(methods::CREATE).await, 1);
    assert!(ledger.block_number().await.unwrap() > 0);
}

/// A run whose "finalize" kept reverting, leaving the session failed at
/// `Fulfilled`.
async fn failed_at_fulfilled(finalize_attempts: u32) -> (SimulatedLedger, randmint_orchestrator::Workflow, WorkflowRun) {
    let mut config = common::config();
    config.finalize_attempts = finalize_attempts;
    let ledger = SimulatedLedger::new(NetworkId::LOCAL);
    let workflow = common::workflow(&ledger, NetworkTable::builtin(), config);
    for _ in 0..finalize_attempts {
        ledger.revert_next(methods::FINALIZE, "out of gas").await;
    }

    let mut run = WorkflowRun::new(NetworkId::LOCAL);
    let err = workflow.execute(&mut run).await.unwrap_err();
    assert_eq!(err.failed_state(), Some(MintState::Fulfilled));
    assert!(run.session.is_resumable());
    (ledger, workflow, run)
}

#[tokio::test]
async fn test_resume_after_finalize_failure_keeps_token() {
    let (ledger, workflow, mut run) = failed_at_fulfilled(1).await;
    let request = run.session.request().unwrap().clone();
    let fulfillment = run.session.fulfillment().unwrap().clone();

    let artifact = workflow.resume(&mut run).await.unwrap();

    assert_eq!(artifact.token_id, request.token_id);
    assert_eq!(artifact.token_uri, artifact_uri(request.token_id, fulfillment.random_value));
    assert_eq!(run.session.states(), vec![MintState::Fulfilled, MintState::Finalized]);
    assert_eq!(run.previous_sessions[0].state(), MintState::Failed);
    assert_eq!(ledger.submitted(methods::CREATE).await, 1);
    assert_eq!(ledger.submitted(methods::CALLBACK_WITH_RANDOMNESS).await, 1);
    assert_eq!(ledger.submitted(methods::FINALIZE).await, 2);
    assert_eq!(run.receipt.steps().last(), Some(&WorkflowStep::Finalize));
    assert!(run.receipt.verify_digest());
}

#[tokio::test]
async fn test_unsubmitted_finalize_spends_an_attempt() {
    let (ledger, workflow, mut run) = failed_at_fulfilled(2).await;
    ledger.inject_transient(randmint_ledger::LedgerOp::Send, 3).await;

    let artifact = workflow.resume(&mut run).await.unwrap();
    assert_eq!(run.session.state(), MintState::Finalized);
    assert_eq!(artifact.token_id, run.session.request().unwrap().token_id);
    assert_eq!(ledger.submitted(methods::FINALIZE).await, 3);
}

#[tokio::test]
async fn test_unconfirmed_finalize_is_awaited_again() {
    let (ledger, workflow, mut run) = failed_at_fulfilled(2).await;
    ledger.inject_transient(randmint_ledger::LedgerOp::Confirm, 3).await;

    workflow.resume(&mut run).await.unwrap();
    assert_eq!(run.session.state(), MintState::Finalized);
    assert_eq!(ledger.submitted(methods::FINALIZE).await, 3);
}
