//! # randmint Orchestrator
//!
//! The mint state machine and the workflow around it.
//!
//! - [`MintSession`] - states, legal transitions and the accepted
//!   fulfillment of one mint
//! - [`MintOrchestrator`] - issues "create" and "finalize" and waits for the
//!   oracle in between
//! - [`Workflow`] - resolve, deploy, fund, then mint, with a
//!   [`WorkflowRun`] the caller keeps for inspection and resumption

pub mod extract;
pub mod orchestrator;
pub mod session;
pub mod workflow;

pub use extract::mint_request_from_receipt;
pub use orchestrator::MintOrchestrator;
pub use session::{MintSession, Transition};
pub use workflow::{Workflow, WorkflowRun};
