//! Ledger client adapters for the gateway.

#![deny(unsafe_code)]

pub mod rpc;
pub mod simulated;

pub use rpc::JsonRpcLedger;
pub use simulated::{InMemoryLedger, MiningMode, DEFAULT_CHAIN_ID};
