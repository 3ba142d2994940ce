//! Client-visible message strings. Clients match on these values, so they are
//! part of the public contract.

pub const OK: &str = "OK";

pub const INVALID_HASH: &str = "Invalid hash format";
pub const HASH_ALREADY_STAMPED: &str = "Hash is already stamped";
pub const HASH_NOT_FOUND: &str = "Hash not found";

pub const INVALID_SIGNATURE: &str = "INVALID_SIGNATURE";
pub const INVALID_CALLID: &str = "INVALID_CALLID";
pub const INVALID_TIME_FORMAT: &str = "INVALID_TIME_FORMAT";
pub const INVALID_CLOSING_TIME: &str = "INVALID_CLOSING_TIME";
pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const ALREADY_CREATED: &str = "ALREADY_CREATED";
pub const INVALID_ADDRESS: &str = "INVALID_ADDRESS";
pub const ALREADY_AUTHORIZED: &str = "ALREADY_AUTHORIZED";
pub const NOT_AUTHORIZED: &str = "NOT_AUTHORIZED";
pub const CALLID_NOT_FOUND: &str = "CALLID_NOT_FOUND";
pub const INVALID_PROPOSAL: &str = "INVALID_PROPOSAL";
pub const ALREADY_REGISTERED: &str = "ALREADY_REGISTERED";
pub const PROPOSAL_NOT_FOUND: &str = "PROPOSAL_NOT_FOUND";
pub const CALL_CLOSED: &str = "CALL_CLOSED";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

pub const TRANSACTION_FAILED: &str = "Transaction failed";
pub const TRANSACTION_ACCEPTED: &str = "Transaction accepted, confirmation pending";

pub fn invalid_mimetype(mimetype: &str) -> String {
    format!("Invalid message mimetype: '{mimetype}'")
}
