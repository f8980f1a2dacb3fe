//! # randmint Core
//!
//! Core types shared by every randmint crate.
//!
//! This crate provides:
//! - [`NetworkTable`] / [`NetworkProfile`] - per-network configuration
//! - [`DeployedInstance`], [`MintRequest`], [`FulfillmentRecord`],
//!   [`FinalizedArtifact`] - the entities a workflow produces
//! - [`MintState`] - the mint state machine's states and legal edges
//! - [`WorkflowReceipt`] - trace of confirmed steps
//! - [`MintError`] - the error taxonomy

pub mod config;
pub mod error;
pub mod mint;
pub mod network;
pub mod receipt;
pub mod types;

// Re-exports for convenience
pub use config::{OrchestratorConfig, RetryConfig};
pub use error::{ErrorCategory, MintError, Result};
pub use mint::{DeployedInstance, FinalizedArtifact, FulfillmentRecord, MintRequest};
pub use network::{NetworkParams, NetworkProfile, NetworkTable};
pub use receipt::{Checkpoint, WorkflowReceipt};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::OrchestratorConfig;
    pub use crate::error::{MintError, Result};
    pub use crate::mint::{DeployedInstance, FinalizedArtifact, FulfillmentRecord, MintRequest};
    pub use crate::network::{NetworkProfile, NetworkTable};
    pub use crate::types::{Address, MintState, NetworkId, RequestId, TxHash};
}
