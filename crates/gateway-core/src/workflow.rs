//! Workflow validator: input parsing and ledger-backed preconditions for
//! stamping, call creation, and proposal registration.
//!
//! Preconditions are evaluated against fresh reads and are advisory. The
//! ledger contract is the final arbiter; callers re-read after every write.

use crate::contracts::{CfpFactoryContract, StamperContract};
use crate::error::GatewayError;
use crate::ledger::LedgerClient;
use crate::messages;
use crate::types::{Address, CallRecord, CallState, ProposalRecord, StampRecord, H256};
use chrono::{DateTime, NaiveDateTime};
use std::sync::Arc;

/// Parse a 32-byte identifier, reporting `message` when malformed.
pub fn parse_identifier(input: &str, message: &'static str) -> Result<H256, GatewayError> {
    input
        .parse()
        .map_err(|_| GatewayError::validation(message))
}

pub fn parse_address(input: &str) -> Result<Address, GatewayError> {
    input
        .parse()
        .map_err(|_| GatewayError::validation(messages::INVALID_ADDRESS))
}

/// Parse an ISO-8601 closing time into Unix seconds.
///
/// Offsets are honoured; a time without an offset is taken as UTC.
pub fn parse_closing_time(input: &str) -> Result<u64, GatewayError> {
    let invalid = || GatewayError::validation(messages::INVALID_TIME_FORMAT);
    let seconds = match DateTime::parse_from_rfc3339(input) {
        Ok(parsed) => parsed.timestamp(),
        Err(_) => NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S%.f"))
            .map_err(|_| invalid())?
            .and_utc()
            .timestamp(),
    };
    u64::try_from(seconds).map_err(|_| invalid())
}

/// Conflict reported when a hash already carries a stamp.
pub fn stamped_conflict(hash: H256, record: &StampRecord) -> GatewayError {
    GatewayError::conflict(messages::HASH_ALREADY_STAMPED)
        .with_context("hash", hash.to_string())
        .with_context("signer", record.signer.to_checksum())
        .with_context("blockNumber", record.block_number)
}

pub struct WorkflowValidator {
    ledger: Arc<dyn LedgerClient>,
    stamper: StamperContract,
    factory: CfpFactoryContract,
}

impl WorkflowValidator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        stamper: StamperContract,
        factory: CfpFactoryContract,
    ) -> Self {
        Self {
            ledger,
            stamper,
            factory,
        }
    }

    pub async fn stamp_record(&self, hash: H256) -> Result<Option<StampRecord>, GatewayError> {
        Ok(self.stamper.stamped(hash).await?)
    }

    pub async fn call_record(&self, call_id: H256) -> Result<Option<CallRecord>, GatewayError> {
        Ok(self.factory.call_record(call_id).await?)
    }

    pub async fn proposal_record(
        &self,
        call: &CallRecord,
        proposal: H256,
    ) -> Result<Option<ProposalRecord>, GatewayError> {
        Ok(self.factory.cfp(call.cfp).proposal_data(proposal).await?)
    }

    pub async fn closing_time(&self, call: &CallRecord) -> Result<u64, GatewayError> {
        Ok(self.factory.cfp(call.cfp).closing_time().await?)
    }

    /// Timestamp of the latest block; the clock every deadline is judged by.
    pub async fn ledger_time(&self) -> Result<u64, GatewayError> {
        Ok(self.ledger.latest_block().await?.timestamp)
    }

    pub async fn call_state(&self, call_id: H256) -> Result<CallState, GatewayError> {
        let Some(call) = self.call_record(call_id).await? else {
            return Ok(CallState::Unknown);
        };
        let closing_time = self.closing_time(&call).await?;
        if closing_time <= self.ledger_time().await? {
            Ok(CallState::Closed)
        } else {
            Ok(CallState::Created)
        }
    }

    pub async fn ensure_not_stamped(&self, hash: H256) -> Result<(), GatewayError> {
        match self.stamp_record(hash).await? {
            Some(record) => Err(stamped_conflict(hash, &record)),
            None => Ok(()),
        }
    }

    pub async fn ensure_call_unused(&self, call_id: H256) -> Result<(), GatewayError> {
        match self.call_record(call_id).await? {
            Some(_) => Err(GatewayError::conflict(messages::ALREADY_CREATED)),
            None => Ok(()),
        }
    }

    /// The closing time must lie strictly after the latest block timestamp.
    pub async fn ensure_closing_time(&self, closing_time: u64) -> Result<(), GatewayError> {
        if closing_time <= self.ledger_time().await? {
            return Err(GatewayError::validation(messages::INVALID_CLOSING_TIME));
        }
        Ok(())
    }

    pub async fn require_call(&self, call_id: H256) -> Result<CallRecord, GatewayError> {
        self.call_record(call_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(messages::CALLID_NOT_FOUND))
    }

    /// The proposal must be unused and the call still open.
    pub async fn ensure_proposal_registrable(
        &self,
        call: &CallRecord,
        proposal: H256,
    ) -> Result<(), GatewayError> {
        if self.proposal_record(call, proposal).await?.is_some() {
            return Err(GatewayError::conflict(messages::ALREADY_REGISTERED));
        }
        if self.closing_time(call).await? <= self.ledger_time().await? {
            return Err(GatewayError::validation(messages::CALL_CLOSED));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_time_accepts_iso_variants() {
        assert_eq!(parse_closing_time("2024-01-01T00:00:00Z").unwrap(), 1_704_067_200);
        assert_eq!(
            parse_closing_time("2024-01-01T02:00:00+02:00").unwrap(),
            1_704_067_200
        );
        assert_eq!(parse_closing_time("2024-01-01T00:00:00").unwrap(), 1_704_067_200);
        assert_eq!(parse_closing_time("2024-01-01 00:00:00").unwrap(), 1_704_067_200);
        assert_eq!(
            parse_closing_time("2024-01-01T00:00:00.250").unwrap(),
            1_704_067_200
        );
    }

    #[test]
    fn closing_time_rejects_garbage_and_pre_epoch() {
        for input in ["tomorrow", "", "2024-13-01T00:00:00", "1969-12-31T23:59:59Z"] {
            assert_eq!(
                parse_closing_time(input),
                Err(GatewayError::validation(messages::INVALID_TIME_FORMAT)),
                "{input}"
            );
        }
    }

    #[test]
    fn identifiers_report_the_given_message() {
        assert_eq!(
            parse_identifier("0x12", messages::INVALID_CALLID),
            Err(GatewayError::validation(messages::INVALID_CALLID))
        );
        assert_eq!(
            parse_address("not-an-address"),
            Err(GatewayError::validation(messages::INVALID_ADDRESS))
        );
        assert!(parse_identifier(&format!("0x{}", "0".repeat(64)), messages::INVALID_HASH).is_ok());
    }

    #[test]
    fn stamped_conflict_carries_record() {
        let record = StampRecord {
            signer: Address::from_bytes([0xab; 20]),
            block_number: 9,
        };
        match stamped_conflict(H256::from([1u8; 32]), &record) {
            GatewayError::Conflict { message, context } => {
                assert_eq!(message, messages::HASH_ALREADY_STAMPED);
                assert_eq!(context["blockNumber"], 9);
                assert_eq!(context["hash"], format!("0x{}", "01".repeat(32)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
