//! # randmint Ledger
//!
//! The ledger client capability the workflow is written against, the
//! program contract (names, entry points, log layouts), and an in-process
//! simulated ledger with an oracle responder for rehearsals and tests.

pub mod client;
pub mod log;
pub mod program;
pub mod responder;
pub mod simulated;

pub use client::{ContractCall, LedgerClient, TxReceipt, TxStatus};
pub use log::{value_as_u128, LogEntry, LogField, LogFilter, LogStream};
pub use responder::OracleResponder;
pub use simulated::{LedgerOp, SimulatedLedger, DEFAULT_OPERATOR};
