//! # randmint Oracle
//!
//! Waiting for the random value a mint depends on.
//!
//! A [`FulfillmentWatcher`] turns an outstanding [`MintRequest`] into a
//! confirmed [`FulfillmentRecord`]. [`watcher_for`] picks the variant once
//! per workflow:
//! - [`SyntheticWatcher`] on the local network triggers the mock oracle
//! - [`PassiveWatcher`] elsewhere waits for the external oracle's callback
//!
//! [`MintRequest`]: randmint_core::MintRequest
//! [`FulfillmentRecord`]: randmint_core::FulfillmentRecord

pub mod passive;
pub mod synthetic;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use passive::PassiveWatcher;
pub use synthetic::{default_seed, SyntheticWatcher};
pub use watcher::{
    confirmed_fulfillment, fulfillment_filter, fulfillment_from_log, watcher_for, FulfillmentWatcher,
};
