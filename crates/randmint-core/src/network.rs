//! Per-network parameters and the resolved network profile.
//!
//! The [`NetworkTable`] is the read-only configuration source: fee amounts,
//! request keys and, for production networks, the addresses of the fee token
//! and the randomness oracle. Built-in entries can be overridden from a JSON
//! file of the form `{"networks": [{"network": 4, "name": "rinkeby", ...}]}`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MintError, Result};
use crate::types::{Address, NetworkId};

/// 0.1 fee token, in the token's smallest unit.
pub const DEFAULT_FEE: u128 = 100_000_000_000_000_000;

const TESTNET_KEY_HASH: &str =
    "0x2ed0feb3e7fd2022120aa84fab1945545a9f2ffc9076fd6156fa96eaff4c1311";

/// Static parameters for one network, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// Chain identifier.
    pub network: NetworkId,

    /// Display name (e.g., "rinkeby").
    pub name: String,

    /// Fee-token program address. Absent on the local network.
    #[serde(default)]
    pub fee_token: Option<Address>,

    /// Randomness-oracle program address. Absent on the local network.
    #[serde(default)]
    pub oracle: Option<Address>,

    /// Key identifying the oracle's proving key.
    pub key_hash: String,

    /// Fee charged per randomness request.
    pub fee: u128,

    /// Amount transferred to the minting program. Defaults to `fee`.
    #[serde(default)]
    pub funding_amount: Option<u128>,
}

impl NetworkParams {
    /// Amount the funding step transfers.
    pub fn funding_amount(&self) -> u128 {
        self.funding_amount.unwrap_or(self.fee)
    }

    /// Combine with concrete dependency addresses into a profile.
    pub fn into_profile(&self, fee_token: Address, oracle: Address) -> Result<NetworkProfile> {
        let profile = NetworkProfile {
            network: self.network,
            name: self.name.clone(),
            fee_token,
            oracle,
            key_hash: self.key_hash.clone(),
            fee: self.fee,
            funding_amount: self.funding_amount(),
        };
        profile.validate()?;
        Ok(profile)
    }
}

/// Everything the workflow needs to know about its target network.
/// Immutable, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub network: NetworkId,
    pub name: String,
    pub fee_token: Address,
    pub oracle: Address,
    pub key_hash: String,
    pub fee: u128,
    pub funding_amount: u128,
}

impl NetworkProfile {
    /// Reject profiles with unset addresses or an unusable fee.
    pub fn validate(&self) -> Result<()> {
        if self.fee_token.is_empty() {
            return Err(MintError::InvalidConfig {
                message: format!("network {} has no fee-token address", self.network),
            });
        }
        if self.oracle.is_empty() {
            return Err(MintError::InvalidConfig {
                message: format!("network {} has no oracle address", self.network),
            });
        }
        if self.key_hash.trim().is_empty() {
            return Err(MintError::InvalidConfig {
                message: format!("network {} has no key hash", self.network),
            });
        }
        if self.funding_amount < self.fee {
            return Err(MintError::InvalidConfig {
                message: format!(
                    "network {} funds {} but each request costs {}",
                    self.network, self.funding_amount, self.fee
                ),
            });
        }
        Ok(())
    }

    /// Constructor arguments of the minting program, in declaration order:
    /// oracle, fee token, key hash, fee.
    pub fn minting_program_args(&self) -> Vec<serde_json::Value> {
        vec![
            serde_json::Value::String(self.oracle.to_string()),
            serde_json::Value::String(self.fee_token.to_string()),
            serde_json::Value::String(self.key_hash.clone()),
            serde_json::Value::String(self.fee.to_string()),
        ]
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NetworkFile {
    networks: Vec<NetworkParams>,
}

/// Lookup table of network parameters keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct NetworkTable {
    entries: BTreeMap<NetworkId, NetworkParams>,
}

impl NetworkTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The networks randmint knows about out of the box.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert(NetworkParams {
            network: NetworkId::LOCAL,
            name: "localhost".to_string(),
            fee_token: None,
            oracle: None,
            key_hash: TESTNET_KEY_HASH.to_string(),
            fee: DEFAULT_FEE,
            funding_amount: None,
        });
        table.insert(NetworkParams {
            network: NetworkId(4),
            name: "rinkeby".to_string(),
            fee_token: Some(Address::new("0x01BE23585060835E02B77ef475b0Cc51aA1e0709")),
            oracle: Some(Address::new("0xb3dCcb4Cf7a26f6cf6B120Cf5A73875B7BBc655B")),
            key_hash: TESTNET_KEY_HASH.to_string(),
            fee: DEFAULT_FEE,
            funding_amount: None,
        });
        table.insert(NetworkParams {
            network: NetworkId(42),
            name: "kovan".to_string(),
            fee_token: Some(Address::new("0xa36085F69e2889c224210F603D836748e7dC0088")),
            oracle: Some(Address::new("0xdD3782915140c8f3b190B5D67eAc6dc5760C46E9")),
            key_hash: "0x6c3699283bda56ad74f6b855546325b68d482e983852a7a82979cc4807b641f4"
                .to_string(),
            fee: DEFAULT_FEE,
            funding_amount: None,
        });
        table.insert(NetworkParams {
            network: NetworkId(1),
            name: "mainnet".to_string(),
            fee_token: Some(Address::new("0x514910771AF9Ca656af840dff83E8264EcF986CA")),
            oracle: Some(Address::new("0xf0d54349aDdcf704F77AE15b96510dEA15cb7952")),
            key_hash: "0xaa77729d3466ca35ae8d28b3bbac7cc36a5031efdc430821c02bc31a238af445"
                .to_string(),
            fee: 2_000_000_000_000_000_000,
            funding_amount: None,
        });
        table
    }

    /// Parse a table from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: NetworkFile = serde_json::from_str(json)?;
        let mut table = Self::new();
        for params in file.networks {
            table.insert(params);
        }
        Ok(table)
    }

    /// Built-in entries overridden by those in `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| MintError::InvalidConfig {
            message: format!("cannot read network table {}: {}", path.display(), e),
        })?;
        let overrides = Self::from_json(&json)?;
        let mut table = Self::builtin();
        table.merge(overrides);
        tracing::debug!(path = %path.display(), networks = table.len(), "Loaded network table");
        Ok(table)
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, params: NetworkParams) {
        self.entries.insert(params.network, params);
    }

    /// Entries in `other` replace entries with the same identifier.
    pub fn merge(&mut self, other: NetworkTable) {
        self.entries.extend(other.entries);
    }

    /// Look up an entry.
    pub fn get(&self, network: NetworkId) -> Option<&NetworkParams> {
        self.entries.get(&network)
    }

    /// Look up an entry, failing for unknown networks.
    pub fn params(&self, network: NetworkId) -> Result<&NetworkParams> {
        self.get(network)
            .ok_or(MintError::UnknownNetwork { network })
    }

    /// Find a network by its display name.
    pub fn find_by_name(&self, name: &str) -> Option<NetworkId> {
        self.entries
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.network)
    }

    /// Parse either a chain identifier or a display name.
    pub fn parse_network(&self, value: &str) -> Result<NetworkId> {
        if let Ok(id) = value.parse::<NetworkId>() {
            return Ok(id);
        }
        self.find_by_name(value).ok_or_else(|| MintError::InvalidConfig {
            message: format!("'{}' is neither a chain id nor a known network name", value),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, ordered by identifier.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkParams> {
        self.entries.values()
    }
}
