//! # randmint
//!
//! Runs the deploy-fund-mint workflow against a network from the
//! command line.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use randmint_core::prelude::*;
use randmint_deploy::{deploy_mocks, resolve, Confirmer, DeploymentRegistry};
use randmint_ledger::{OracleResponder, SimulatedLedger};
use randmint_orchestrator::{Workflow, WorkflowRun};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "randmint", version, about = "Deploy, fund and mint against an oracle-backed network")]
struct Cli {
    /// JSON network table replacing the built-in entries.
    #[arg(long, global = true, env = "RANDMINT_NETWORK_TABLE")]
    network_table: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full workflow and print the token URI.
    Run {
        /// Chain id or network name.
        #[arg(long, env = "RANDMINT_NETWORK", default_value = "31337")]
        network: String,

        /// Seed the local oracle delivers instead of one derived from the request.
        #[arg(long)]
        seed: Option<u128>,

        /// Token id the minting program assigns to the next mint.
        #[arg(long = "token-id-hint")]
        token_id: Option<u64>,

        /// Rehearse a production network on a simulated ledger with a live
        /// oracle responder.
        #[arg(long)]
        rehearse: bool,

        /// Print the workflow receipt as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Resolve and print a network profile.
    Resolve {
        #[arg(long, env = "RANDMINT_NETWORK", default_value = "31337")]
        network: String,
    },

    /// List known networks.
    Networks,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = OrchestratorConfig::from_env()?;
    if cli.network_table.is_some() {
        config.network_table_path = cli.network_table.clone();
    }
    let table = load_table(&config)?;

    match cli.command {
        Command::Run {
            network,
            seed,
            token_id,
            rehearse,
            json,
        } => {
            if seed.is_some() {
                config.seed = seed;
            }
            let network = table.parse_network(&network)?;
            run(config, table, network, token_id, rehearse, json).await
        }
        Command::Resolve { network } => {
            let network = table.parse_network(&network)?;
            let ledger = SimulatedLedger::new(network);
            let registry = DeploymentRegistry::new(Arc::new(ledger), Confirmer::from_config(&config));
            if network.is_local() {
                deploy_mocks(&registry).await?;
            }
            let profile = resolve(network, &table, &registry).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Networks => {
            for params in table.iter() {
                println!("{:>8}  {}", params.network, params.name);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_table(config: &OrchestratorConfig) -> anyhow::Result<NetworkTable> {
    match &config.network_table_path {
        Some(path) => NetworkTable::load(path)
            .with_context(|| format!("loading network table {}", path.display())),
        None => Ok(NetworkTable::builtin()),
    }
}

/// Only the simulated ledger is available. Production networks run as a
/// rehearsal with their fee token and oracle installed at the table's
/// addresses.
async fn open_ledger(network: NetworkId, table: &NetworkTable, rehearse: bool) -> anyhow::Result<SimulatedLedger> {
    let ledger = SimulatedLedger::new(network);
    if network.is_local() {
        return Ok(ledger);
    }
    if !rehearse {
        bail!("no ledger endpoint for network {}; pass --rehearse to run on a simulated ledger", network);
    }

    let params = table.params(network)?;
    match (&params.fee_token, &params.oracle) {
        (Some(fee_token), Some(oracle)) => ledger.install_dependencies(fee_token, oracle).await?,
        _ => bail!("network {} has no fee token or oracle to rehearse against", network),
    }
    Ok(ledger)
}

async fn run(
    config: OrchestratorConfig,
    table: NetworkTable,
    network: NetworkId,
    token_id: Option<u64>,
    rehearse: bool,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let ledger = open_ledger(network, &table, rehearse).await?;
    let cancel = CancellationToken::new();

    let responder = if network.is_local() {
        None
    } else {
        let oracle = table.params(network)?.oracle.clone().context("oracle address")?;
        let mut responder = OracleResponder::new(ledger.clone(), oracle);
        if let Some(seed) = config.seed {
            responder = responder.with_seed(seed);
        }
        Some(responder.spawn(cancel.clone()).await?)
    };

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    let registry_file = config
        .registry_path
        .as_ref()
        .map(|dir| dir.join(format!("{}.json", network)));
    let confirmer = Confirmer::from_config(&config);
    let registry = Arc::new(DeploymentRegistry::new(Arc::new(ledger.clone()), confirmer));
    let workflow = Workflow::new(Arc::clone(&registry), Arc::new(table), config)
        .with_cancellation(cancel.clone());

    let mut run = WorkflowRun::new(network);
    let outcome = match workflow.prepare(&mut run).await {
        Ok(()) => {
            if let (Some(token_id), Some(minting)) = (token_id, &run.minting) {
                ledger.set_next_token_id(&minting.address, token_id).await?;
            }
            workflow.mint(&mut run).await
        }
        Err(e) => Err(e),
    };

    if let Some(path) = &registry_file {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        registry.save(path).await?;
        info!(path = %path.display(), "💾 Saved deployment registry");
    }

    cancel.cancel();
    if let Some(responder) = responder {
        responder.await?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&run.receipt)?);
    }

    match outcome {
        Ok(artifact) => {
            if !json {
                println!("{}", artifact.token_uri);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            if let Some(request) = run.session.request().filter(|_| run.session.is_resumable()) {
                eprintln!("request {} is still open", request.request_id);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
