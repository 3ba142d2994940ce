//! Ledger gateway core.
//!
//! Authenticates signed client requests, validates workflow preconditions
//! against the ledger, and serializes every state-changing write through a
//! single operator account with strictly ordered nonces.

#![deny(unsafe_code)]

pub mod abi;
pub mod account;
pub mod contracts;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod messages;
pub mod registry;
pub mod runtime;
pub mod signature;
pub mod transaction;
pub mod types;
pub mod workflow;

pub use account::SigningAccount;
pub use contracts::{
    derive_cfp_address, functions, CfpContract, CfpFactoryContract, ContractCall,
    StamperContract,
};
pub use coordinator::{CoordinatorConfig, WriteCoordinator};
pub use error::{AbiError, BootstrapError, GatewayError, LedgerError};
pub use ledger::{BlockInfo, BlockTag, CallRequest, LedgerClient, Receipt};
pub use registry::AuthorizationRegistry;
pub use runtime::{GatewayConfig, LedgerGateway};
pub use signature::{hash_message, recover_signer, verify_signer, RecoverableSignature};
pub use transaction::{PendingWrite, SignedTransaction};
pub use types::{
    keccak256, Address, AuthorizationChange, CallRecord, CallState, CallSummary,
    ProposalRecord, StampConfirmation, StampRecord, WriteOutcome, WriteReceipt, H256,
};
pub use workflow::WorkflowValidator;
