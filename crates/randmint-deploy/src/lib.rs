//! # randmint Deploy
//!
//! Everything that happens before the first mint:
//! - [`resolver`] - where the fee token and the oracle live
//! - [`registry`] - idempotent deploy-or-get of named programs
//! - [`funding`] - paying the minting program its request fee
//! - [`retry`] / [`confirm`] - backoff and confirmation depth for writes

pub mod confirm;
pub mod funding;
pub mod registry;
pub mod resolver;
pub mod retry;

pub use confirm::Confirmer;
pub use funding::{fund, Confirmation};
pub use registry::DeploymentRegistry;
pub use resolver::{deploy_mocks, resolve, FEE_TOKEN_MOCK, ORACLE_MOCK};
pub use retry::RetryPolicy;
