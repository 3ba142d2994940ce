use crate::types::Address;
use serde_json::{Map, Value};
use thiserror::Error;

/// Failures reported by a ledger client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("ledger rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("ledger response decode error: {0}")]
    Decode(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl From<AbiError> for LedgerError {
    fn from(err: AbiError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// ABI codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("ABI data truncated at offset {0}")]
    Truncated(usize),

    #[error("ABI integer does not fit in 64 bits")]
    Overflow,

    #[error("ABI value is not a valid {0}")]
    Invalid(&'static str),

    #[error("ABI result has an unexpected shape")]
    UnexpectedShape,
}

/// Request-level error taxonomy shared by every gateway layer.
///
/// Each variant maps to exactly one HTTP status at the service edge; ledger
/// failures of any origin are normalized into [`GatewayError::Ledger`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// Malformed input, rejected without contacting the ledger.
    #[error("{0}")]
    Validation(String),

    /// Valid signature, but the signer is not permitted to perform the action.
    #[error("{0}")]
    Authorization(String),

    /// Target is already in the requested state.
    #[error("{message}")]
    Conflict {
        message: String,
        context: Map<String, Value>,
    },

    #[error("{0}")]
    NotFound(String),

    /// Estimate, broadcast, or receipt failure, or an unreachable ledger.
    #[error("{0}")]
    Ledger(String),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            context: Map::new(),
        }
    }

    /// Attach a field that is rendered next to `message` in conflict responses.
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Self::Conflict { context, .. } = &mut self {
            context.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn is_ledger(&self) -> bool {
        matches!(self, Self::Ledger(_))
    }
}

impl From<LedgerError> for GatewayError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err.to_string())
    }
}

/// Fatal startup errors: the process refuses to serve with an invalid identity.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("signer {actual} does not match expected account {expected}")]
    SignerMismatch { expected: Address, actual: Address },

    #[error("missing contract configuration: {0}")]
    MissingContract(&'static str),

    #[error("ledger unreachable during startup: {0}")]
    Ledger(#[from] LedgerError),
}
