//! Entities produced as a workflow moves from deployment to a finalized mint.

use serde::{Deserialize, Serialize};

use crate::types::{Address, NetworkId, RequestId, TxHash};

/// A ledger program deployed (or found) on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedInstance {
    /// Logical name the program is registered under (e.g., "RandomSVG").
    pub name: String,

    /// Network the program lives on.
    pub network: NetworkId,

    /// Program address.
    pub address: Address,

    /// False when the instance was already recorded and reused.
    pub newly_deployed: bool,

    /// Deployment transaction.
    pub tx_hash: TxHash,

    /// Block the deployment was included in.
    pub block_number: u64,
}

impl DeployedInstance {
    /// The same instance, marked as reused.
    pub fn reused(&self) -> Self {
        Self {
            newly_deployed: false,
            ..self.clone()
        }
    }
}

/// An outstanding mint awaiting its random value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    /// Token minted by "create".
    pub token_id: u64,

    /// Account that issued "create".
    pub requester: Address,

    /// Handle of the randomness request.
    pub request_id: RequestId,

    /// Minting program that owns the token.
    pub minting_program: Address,

    /// The "create" transaction.
    pub create_tx: TxHash,

    /// Block "create" was included in.
    pub block_number: u64,
}

/// A delivered random value for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentRecord {
    pub request_id: RequestId,
    pub token_id: u64,
    pub random_value: u128,

    /// Transaction that delivered the callback.
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// A finalized token and the reference to its artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedArtifact {
    pub token_id: u64,
    pub token_uri: String,

    /// The "finalize" transaction.
    pub tx_hash: TxHash,
}
