//! Programs randmint works with: their names, entry points and events, and
//! the simulated implementations the in-process ledger executes.
//!
//! The names and log layouts here are the external contract between the
//! orchestrator and the deployed minting program. In particular the
//! "create" transaction emits, in order:
//!
//! | index | emitter   | event               |
//! |-------|-----------|---------------------|
//! | 0     | fee token | `Transfer`          |
//! | 1     | fee token | `TransferAndCall`   |
//! | 2     | oracle    | `RandomnessRequest` |
//! | 3     | minting   | `MintRequested`     |

use std::collections::{BTreeMap, HashMap};

use randmint_core::{hex_encode, Address, RequestId};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::log::{value_as_u128, LogField};

/// Logical name of the fee-token program.
pub const FEE_TOKEN_PROGRAM: &str = "LinkToken";

/// Logical name of the randomness-oracle program.
pub const ORACLE_PROGRAM: &str = "VRFCoordinatorMock";

/// Logical name of the minting program.
pub const MINTING_PROGRAM: &str = "RandomSVG";

/// Position of `MintRequested` among the "create" transaction's logs.
pub const MINT_REQUESTED_LOG_INDEX: usize = 3;

/// Positions of the fields within `MintRequested`.
pub const MINT_REQUESTED_REQUEST_ID_POSITION: usize = 0;
pub const MINT_REQUESTED_TOKEN_ID_POSITION: usize = 1;

/// Supply minted to the deployer of a fee token.
pub const FEE_TOKEN_INITIAL_SUPPLY: u128 = 1_000_000_000_000_000_000_000_000_000;

pub mod methods {
    pub const TRANSFER: &str = "transfer";
    pub const CREATE: &str = "create";
    pub const FINALIZE: &str = "finalize";
    pub const CALLBACK_WITH_RANDOMNESS: &str = "callBackWithRandomness";
    pub const RAW_FULFILL_RANDOMNESS: &str = "rawFulfillRandomness";
}

pub mod events {
    pub const TRANSFER: &str = "Transfer";
    pub const TRANSFER_AND_CALL: &str = "TransferAndCall";
    pub const RANDOMNESS_REQUEST: &str = "RandomnessRequest";
    pub const MINT_REQUESTED: &str = "MintRequested";
    pub const RANDOMNESS_FULFILLED: &str = "RandomnessFulfilled";
    pub const ARTIFACT_FINALIZED: &str = "ArtifactFinalized";
}

pub mod fields {
    pub const FROM: &str = "from";
    pub const TO: &str = "to";
    pub const VALUE: &str = "value";
    pub const DATA: &str = "data";
    pub const KEY_HASH: &str = "key_hash";
    pub const SEED: &str = "seed";
    pub const SENDER: &str = "sender";
    pub const FEE: &str = "fee";
    pub const REQUEST_ID: &str = "request_id";
    pub const TOKEN_ID: &str = "token_id";
    pub const RANDOM_VALUE: &str = "random_value";
    pub const TOKEN_URI: &str = "token_uri";
}

/// Gas each entry point consumes.
pub fn gas_for(method: &str) -> u64 {
    match method {
        methods::TRANSFER => 52_000,
        methods::CREATE => 350_000,
        methods::FINALIZE => 2_500_000,
        methods::CALLBACK_WITH_RANDOMNESS | methods::RAW_FULFILL_RANDOMNESS => 200_000,
        _ => 100_000,
    }
}

/// Artifact reference for a token and its random value.
pub fn artifact_uri(token_id: u64, random_value: u128) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token_id.to_be_bytes());
    hasher.update(random_value.to_be_bytes());
    format!("data:image/svg+xml;sha256,{}", hex_encode(&hasher.finalize()))
}

/// A log before it is assigned to a block.
#[derive(Debug, Clone)]
pub(crate) struct PendingLog {
    pub address: Address,
    pub event: &'static str,
    pub fields: Vec<LogField>,
}

impl PendingLog {
    fn new(address: &Address, event: &'static str, fields: Vec<(&str, Value)>) -> Self {
        Self {
            address: address.clone(),
            event,
            fields: fields
                .into_iter()
                .map(|(name, value)| LogField {
                    name: name.to_string(),
                    value,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FeeToken {
    balances: HashMap<Address, u128>,
}

impl FeeToken {
    pub fn balance_of(&self, owner: &Address) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, owner: &Address, amount: u128) {
        *self.balances.entry(owner.clone()).or_insert(0) += amount;
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), String> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(format!(
                "transfer amount {} exceeds balance {}",
                amount, available
            ));
        }
        self.balances.insert(from.clone(), available - amount);
        self.credit(to, amount);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Oracle {
    fee_token: Address,
    nonces: HashMap<Address, u64>,
    requests: HashMap<RequestId, Address>,
}

#[derive(Debug, Clone)]
pub(crate) struct TokenRecord {
    owner: Address,
    random_value: Option<u128>,
    token_uri: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Minting {
    oracle: Address,
    fee_token: Address,
    key_hash: String,
    fee: u128,
    next_token_id: u64,
    tokens: BTreeMap<u64, TokenRecord>,
    requests: HashMap<RequestId, u64>,
}

impl Minting {
    pub fn set_next_token_id(&mut self, token_id: u64) -> Result<(), String> {
        if self.tokens.keys().any(|&id| id >= token_id) {
            return Err(format!("token {} or later already minted", token_id));
        }
        self.next_token_id = token_id;
        Ok(())
    }

    pub fn token_uri(&self, token_id: u64) -> Result<String, String> {
        let token = self
            .tokens
            .get(&token_id)
            .ok_or_else(|| format!("token {} does not exist", token_id))?;
        token
            .token_uri
            .clone()
            .ok_or_else(|| format!("token {} is not finalized", token_id))
    }
}

/// A program instance in the simulated ledger.
#[derive(Debug, Clone)]
pub(crate) enum Program {
    FeeToken(FeeToken),
    Oracle(Oracle),
    Minting(Minting),
}

impl Program {
    /// Construct a program as its constructor would.
    pub fn construct(name: &str, deployer: &Address, args: &[Value]) -> Result<Program, String> {
        match name {
            FEE_TOKEN_PROGRAM => {
                let mut token = FeeToken::default();
                token.credit(deployer, FEE_TOKEN_INITIAL_SUPPLY);
                Ok(Program::FeeToken(token))
            }
            ORACLE_PROGRAM => Ok(Program::Oracle(Oracle {
                fee_token: arg_address(args, 0)?,
                nonces: HashMap::new(),
                requests: HashMap::new(),
            })),
            MINTING_PROGRAM => Ok(Program::Minting(Minting {
                oracle: arg_address(args, 0)?,
                fee_token: arg_address(args, 1)?,
                key_hash: arg_str(args, 2)?.to_string(),
                fee: arg_uint(args, 3)?,
                next_token_id: 0,
                tokens: BTreeMap::new(),
                requests: HashMap::new(),
            })),
            other => Err(format!("no program artifact named '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ProgramKind {
    FeeToken,
    Oracle,
    Minting,
}

/// Execute a call against a scratch copy of program state. On `Err` the
/// caller discards the copy, so partial effects never persist.
pub(crate) fn execute(
    programs: &mut HashMap<Address, Program>,
    sender: &Address,
    to: &Address,
    method: &str,
    args: &[Value],
) -> Result<Vec<PendingLog>, String> {
    let kind = match programs.get(to) {
        None => return Err(format!("no program at {}", to)),
        Some(Program::FeeToken(_)) => ProgramKind::FeeToken,
        Some(Program::Oracle(_)) => ProgramKind::Oracle,
        Some(Program::Minting(_)) => ProgramKind::Minting,
    };

    let mut logs = Vec::new();
    match kind {
        ProgramKind::FeeToken => match method {
            methods::TRANSFER => {
                let recipient = arg_address(args, 0)?;
                let amount = arg_uint(args, 1)?;
                fee_token_mut(programs, to)?.transfer(sender, &recipient, amount)?;
                logs.push(transfer_log(to, sender, &recipient, amount));
            }
            other => return Err(format!("fee token has no entry point '{}'", other)),
        },
        ProgramKind::Oracle => match method {
            methods::CALLBACK_WITH_RANDOMNESS => {
                let request_id = RequestId::new(arg_str(args, 0)?);
                let random_value = arg_uint(args, 1)?;
                let consumer = arg_address(args, 2)?;
                logs.extend(fulfill(programs, to, &consumer, &request_id, random_value)?);
            }
            other => return Err(format!("oracle has no entry point '{}'", other)),
        },
        ProgramKind::Minting => match method {
            methods::CREATE => logs.extend(create(programs, sender, to)?),
            methods::FINALIZE => {
                let token_id = arg_u64(args, 0)?;
                logs.push(finalize(programs, to, token_id)?);
            }
            methods::RAW_FULFILL_RANDOMNESS => {
                return Err("only the oracle can fulfill".to_string());
            }
            other => return Err(format!("minting program has no entry point '{}'", other)),
        },
    }
    Ok(logs)
}

fn create(
    programs: &mut HashMap<Address, Program>,
    sender: &Address,
    minting_address: &Address,
) -> Result<Vec<PendingLog>, String> {
    let (oracle_address, token_address, key_hash, fee) = match programs.get(minting_address) {
        Some(Program::Minting(m)) => (m.oracle.clone(), m.fee_token.clone(), m.key_hash.clone(), m.fee),
        _ => return Err("not a minting program".to_string()),
    };

    let token = fee_token_mut(programs, &token_address)?;
    if token.balance_of(minting_address) < fee {
        return Err("Need LINK to create a token".to_string());
    }
    token.transfer(minting_address, &oracle_address, fee)?;

    let mut logs = vec![
        transfer_log(&token_address, minting_address, &oracle_address, fee),
        PendingLog::new(
            &token_address,
            events::TRANSFER_AND_CALL,
            vec![
                (fields::FROM, json!(minting_address.as_str())),
                (fields::TO, json!(oracle_address.as_str())),
                (fields::VALUE, json!(fee.to_string())),
                (fields::DATA, json!(key_hash)),
            ],
        ),
    ];

    let (request_id, nonce) = match programs.get_mut(&oracle_address) {
        Some(Program::Oracle(oracle)) => {
            if oracle.fee_token != token_address {
                return Err("oracle and minting program disagree on the fee token".to_string());
            }
            let nonce = oracle.nonces.entry(minting_address.clone()).or_insert(0);
            let current = *nonce;
            *nonce += 1;
            let request_id = derive_request_id(&key_hash, minting_address, current);
            oracle.requests.insert(request_id.clone(), minting_address.clone());
            (request_id, current)
        }
        _ => return Err(format!("no oracle at {}", oracle_address)),
    };
    logs.push(PendingLog::new(
        &oracle_address,
        events::RANDOMNESS_REQUEST,
        vec![
            (fields::KEY_HASH, json!(key_hash)),
            (fields::SEED, json!(nonce)),
            (fields::SENDER, json!(minting_address.as_str())),
            (fields::REQUEST_ID, json!(request_id.as_str())),
            (fields::FEE, json!(fee.to_string())),
        ],
    ));

    let minting = minting_mut(programs, minting_address)?;
    let token_id = minting.next_token_id;
    minting.next_token_id += 1;
    minting.tokens.insert(
        token_id,
        TokenRecord {
            owner: sender.clone(),
            random_value: None,
            token_uri: None,
        },
    );
    minting.requests.insert(request_id.clone(), token_id);
    logs.push(PendingLog::new(
        minting_address,
        events::MINT_REQUESTED,
        vec![
            (fields::REQUEST_ID, json!(request_id.as_str())),
            (fields::TOKEN_ID, json!(token_id)),
        ],
    ));

    Ok(logs)
}

fn fulfill(
    programs: &mut HashMap<Address, Program>,
    oracle_address: &Address,
    consumer: &Address,
    request_id: &RequestId,
    random_value: u128,
) -> Result<Vec<PendingLog>, String> {
    match programs.get(oracle_address) {
        Some(Program::Oracle(oracle)) => match oracle.requests.get(request_id) {
            Some(requester) if requester == consumer => {}
            Some(_) => return Err(format!("request {} belongs to another consumer", request_id)),
            None => return Err(format!("unknown request {}", request_id)),
        },
        _ => return Err(format!("no oracle at {}", oracle_address)),
    }

    let minting = minting_mut(programs, consumer)?;
    if &minting.oracle != oracle_address {
        return Err("only the oracle can fulfill".to_string());
    }
    let token_id = *minting
        .requests
        .get(request_id)
        .ok_or_else(|| format!("unknown request {}", request_id))?;
    let token = minting
        .tokens
        .get_mut(&token_id)
        .ok_or_else(|| format!("token {} does not exist", token_id))?;
    if token.random_value.is_some() {
        return Err(format!("request {} already fulfilled", request_id));
    }
    token.random_value = Some(random_value);

    Ok(vec![PendingLog::new(
        consumer,
        events::RANDOMNESS_FULFILLED,
        vec![
            (fields::REQUEST_ID, json!(request_id.as_str())),
            (fields::TOKEN_ID, json!(token_id)),
            (fields::RANDOM_VALUE, json!(random_value.to_string())),
        ],
    )])
}

fn finalize(
    programs: &mut HashMap<Address, Program>,
    minting_address: &Address,
    token_id: u64,
) -> Result<PendingLog, String> {
    let minting = minting_mut(programs, minting_address)?;
    let token = minting
        .tokens
        .get_mut(&token_id)
        .ok_or_else(|| format!("token {} does not exist", token_id))?;
    if token.token_uri.is_some() {
        return Err(format!("token {} already finalized", token_id));
    }
    let random_value = token
        .random_value
        .ok_or_else(|| format!("random value for token {} not delivered", token_id))?;
    let uri = artifact_uri(token_id, random_value);
    token.token_uri = Some(uri.clone());
    tracing::trace!(token_id, owner = %token.owner, "Simulated finalize");

    Ok(PendingLog::new(
        minting_address,
        events::ARTIFACT_FINALIZED,
        vec![
            (fields::TOKEN_ID, json!(token_id)),
            (fields::TOKEN_URI, json!(uri)),
        ],
    ))
}

fn transfer_log(token: &Address, from: &Address, to: &Address, amount: u128) -> PendingLog {
    PendingLog::new(
        token,
        events::TRANSFER,
        vec![
            (fields::FROM, json!(from.as_str())),
            (fields::TO, json!(to.as_str())),
            (fields::VALUE, json!(amount.to_string())),
        ],
    )
}

fn derive_request_id(key_hash: &str, consumer: &Address, nonce: u64) -> RequestId {
    let mut hasher = Sha256::new();
    hasher.update(key_hash.as_bytes());
    hasher.update(consumer.as_str().as_bytes());
    hasher.update(nonce.to_be_bytes());
    RequestId::from_bytes(&hasher.finalize())
}

pub(crate) fn fee_token_mut<'a>(
    programs: &'a mut HashMap<Address, Program>,
    address: &Address,
) -> Result<&'a mut FeeToken, String> {
    match programs.get_mut(address) {
        Some(Program::FeeToken(token)) => Ok(token),
        _ => Err(format!("no fee token at {}", address)),
    }
}

pub(crate) fn minting_mut<'a>(
    programs: &'a mut HashMap<Address, Program>,
    address: &Address,
) -> Result<&'a mut Minting, String> {
    match programs.get_mut(address) {
        Some(Program::Minting(minting)) => Ok(minting),
        _ => Err(format!("no minting program at {}", address)),
    }
}

fn arg(args: &[Value], position: usize) -> Result<&Value, String> {
    args.get(position)
        .ok_or_else(|| format!("missing argument {}", position))
}

fn arg_str(args: &[Value], position: usize) -> Result<&str, String> {
    arg(args, position)?
        .as_str()
        .ok_or_else(|| format!("argument {} is not a string", position))
}

fn arg_address(args: &[Value], position: usize) -> Result<Address, String> {
    let address = Address::new(arg_str(args, position)?);
    if address.is_empty() {
        return Err(format!("argument {} is an empty address", position));
    }
    Ok(address)
}

fn arg_uint(args: &[Value], position: usize) -> Result<u128, String> {
    value_as_u128(arg(args, position)?)
        .ok_or_else(|| format!("argument {} is not an unsigned integer", position))
}

fn arg_u64(args: &[Value], position: usize) -> Result<u64, String> {
    u64::try_from(arg_uint(args, position)?)
        .map_err(|_| format!("argument {} does not fit in 64 bits", position))
}
