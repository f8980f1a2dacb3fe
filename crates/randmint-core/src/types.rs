//! Common types used across randmint.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Chain identifier of a target network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub u64);

impl NetworkId {
    /// The local development network. Dependencies are mock programs here.
    pub const LOCAL: NetworkId = NetworkId(31337);

    /// Returns true if dependencies on this network are resolved from mocks.
    pub fn is_local(&self) -> bool {
        *self == Self::LOCAL
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NetworkId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(NetworkId)
    }
}

macro_rules! hex_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a hex string, normalizing it to lowercase with a `0x` prefix.
            pub fn new(value: impl Into<String>) -> Self {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Self(String::new());
                }
                let body = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                    .unwrap_or(trimmed);
                Self(format!("0x{}", body.to_ascii_lowercase()))
            }

            /// Build from raw bytes.
            pub fn from_bytes(bytes: &[u8]) -> Self {
                Self(format!("0x{}", hex_encode(bytes)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when no value was configured.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty() || self.0 == "0x"
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

hex_newtype!(
    /// Address of an account or a deployed ledger program.
    Address
);

hex_newtype!(
    /// Hash identifying a submitted transaction.
    TxHash
);

hex_newtype!(
    /// Handle of an outstanding randomness request.
    RequestId
);

/// Lowercase hex encoding without prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// State of a mint as it moves through the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintState {
    /// Workflow instance exists; "create" not yet confirmed.
    Created,
    /// "create" confirmed and the request handle extracted.
    Requested,
    /// A fulfillment callback is outstanding.
    AwaitingFulfillment,
    /// The random value was delivered.
    Fulfilled,
    /// The artifact was finalized and its URI retrieved.
    Finalized,
    /// The workflow stopped on an error.
    Failed,
}

impl MintState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MintState::Finalized | MintState::Failed)
    }

    /// Returns true if an on-chain randomness request exists in this state.
    pub fn has_outstanding_request(&self) -> bool {
        matches!(self, MintState::Requested | MintState::AwaitingFulfillment)
    }

    /// Legal edges of the mint state machine.
    pub fn can_transition_to(&self, next: MintState) -> bool {
        use MintState::*;
        match (self, next) {
            (Created, Requested)
            | (Requested, AwaitingFulfillment)
            | (AwaitingFulfillment, Fulfilled)
            | (Fulfilled, Finalized) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for MintState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MintState::Created => "created",
            MintState::Requested => "requested",
            MintState::AwaitingFulfillment => "awaiting_fulfillment",
            MintState::Fulfilled => "fulfilled",
            MintState::Finalized => "finalized",
            MintState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A confirmed step of the end-to-end workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    /// A dependency program (fee token, oracle) was deployed or found.
    DeployDependency,
    /// Dependency addresses were resolved into a network profile.
    Resolve,
    /// The minting program was deployed or found.
    DeployTarget,
    /// The minting program was funded with the fee token.
    Fund,
    /// "create" was confirmed.
    Create,
    /// The randomness request was fulfilled.
    Fulfill,
    /// "finalize" was confirmed.
    Finalize,
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStep::DeployDependency => "deploy_dependency",
            WorkflowStep::Resolve => "resolve",
            WorkflowStep::DeployTarget => "deploy_target",
            WorkflowStep::Fund => "fund",
            WorkflowStep::Create => "create",
            WorkflowStep::Fulfill => "fulfill",
            WorkflowStep::Finalize => "finalize",
        };
        f.write_str(name)
    }
}
