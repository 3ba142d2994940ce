//! Typed bindings for the three deployed contracts.
//!
//! Reads go straight to the ledger; writes are returned as [`ContractCall`]
//! values for the write coordinator to sign and submit.

use crate::abi::{self, ParamType, Token};
use crate::error::LedgerError;
use crate::ledger::{CallRequest, LedgerClient};
use crate::types::{keccak256, Address, CallRecord, ProposalRecord, StampRecord, H256};
use std::sync::Arc;

/// Canonical function signatures of the deployed contracts.
pub mod functions {
    pub const STAMP: &str = "stamp(bytes32)";
    pub const STAMPED: &str = "stamped(bytes32)";

    pub const OWNER: &str = "owner()";
    pub const CALLS: &str = "calls(bytes32)";
    pub const CREATE_FOR: &str = "createFor(bytes32,uint256,address)";
    pub const REGISTER_PROPOSAL: &str = "registerProposal(bytes32,bytes32)";
    pub const REGISTER: &str = "register()";
    pub const AUTHORIZE: &str = "authorize(address)";
    pub const UNAUTHORIZE: &str = "unauthorize(address)";
    pub const IS_AUTHORIZED: &str = "isAuthorized(address)";
    pub const IS_REGISTERED: &str = "isRegistered(address)";
    pub const GET_ALL_PENDING: &str = "getAllPending()";
    pub const CREATORS: &str = "creators()";
    pub const CREATED_BY: &str = "createdBy(address)";
    pub const ALL_CALL_IDS: &str = "allCallIds()";

    pub const CLOSING_TIME: &str = "closingTime()";
    pub const PROPOSAL_DATA: &str = "proposalData(bytes32)";
}

/// Address a factory assigns to the call contract it deploys for `call_id`.
pub fn derive_cfp_address(factory: &Address, call_id: &H256) -> Address {
    let mut preimage = Vec::with_capacity(52);
    preimage.extend_from_slice(factory.as_bytes());
    preimage.extend_from_slice(call_id.as_bytes());
    Address::from_word(&keccak256(&preimage))
}

/// Unsigned contract write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub function: &'static str,
    pub arguments: Vec<Token>,
}

impl ContractCall {
    pub fn new(to: Address, function: &'static str, arguments: Vec<Token>) -> Self {
        Self {
            to,
            function,
            arguments,
        }
    }

    pub fn calldata(&self) -> Vec<u8> {
        abi::encode_call(self.function, &self.arguments)
    }
}

/// Decoded return values consumed in declaration order.
struct Outputs(std::vec::IntoIter<Token>);

impl Outputs {
    fn next<T>(&mut self, take: fn(Token) -> Option<T>) -> Result<T, LedgerError> {
        self.0
            .next()
            .and_then(take)
            .ok_or_else(|| LedgerError::Decode("unexpected contract return shape".to_string()))
    }

    fn address(&mut self) -> Result<Address, LedgerError> {
        self.next(Token::into_address)
    }

    fn uint(&mut self) -> Result<u64, LedgerError> {
        self.next(Token::into_uint)
    }

    fn boolean(&mut self) -> Result<bool, LedgerError> {
        self.next(Token::into_bool)
    }

    fn list<T>(&mut self, take: fn(Token) -> Option<T>) -> Result<Vec<T>, LedgerError> {
        self.next(Token::into_array)?
            .into_iter()
            .map(|token| {
                take(token).ok_or_else(|| {
                    LedgerError::Decode("unexpected contract array element".to_string())
                })
            })
            .collect()
    }
}

async fn read(
    ledger: &dyn LedgerClient,
    to: Address,
    function: &'static str,
    arguments: &[Token],
    outputs: &[ParamType],
) -> Result<Outputs, LedgerError> {
    let request = CallRequest::new(to, abi::encode_call(function, arguments));
    let data = ledger.call(&request, None).await?;
    Ok(Outputs(abi::decode(outputs, &data)?.into_iter()))
}

#[derive(Clone)]
pub struct StamperContract {
    ledger: Arc<dyn LedgerClient>,
    address: Address,
}

impl StamperContract {
    pub fn new(ledger: Arc<dyn LedgerClient>, address: Address) -> Self {
        Self { ledger, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn stamp(&self, hash: H256) -> ContractCall {
        ContractCall::new(self.address, functions::STAMP, vec![Token::Bytes32(hash)])
    }

    /// `None` while the hash is unstamped (block number zero).
    pub async fn stamped(&self, hash: H256) -> Result<Option<StampRecord>, LedgerError> {
        let mut out = read(
            self.ledger.as_ref(),
            self.address,
            functions::STAMPED,
            &[Token::Bytes32(hash)],
            &[ParamType::Address, ParamType::Uint],
        )
        .await?;
        let signer = out.address()?;
        let block_number = out.uint()?;
        Ok((block_number > 0).then_some(StampRecord {
            signer,
            block_number,
        }))
    }
}

/// Factory that owns the creator registry and deploys one contract per call.
#[derive(Clone)]
pub struct CfpFactoryContract {
    ledger: Arc<dyn LedgerClient>,
    address: Address,
}

impl CfpFactoryContract {
    pub fn new(ledger: Arc<dyn LedgerClient>, address: Address) -> Self {
        Self { ledger, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn cfp(&self, address: Address) -> CfpContract {
        CfpContract {
            ledger: self.ledger.clone(),
            address,
        }
    }

    pub fn create_for(&self, call_id: H256, closing_time: u64, creator: Address) -> ContractCall {
        ContractCall::new(
            self.address,
            functions::CREATE_FOR,
            vec![
                Token::Bytes32(call_id),
                Token::Uint(closing_time),
                Token::Address(creator),
            ],
        )
    }

    pub fn register_proposal(&self, call_id: H256, proposal: H256) -> ContractCall {
        ContractCall::new(
            self.address,
            functions::REGISTER_PROPOSAL,
            vec![Token::Bytes32(call_id), Token::Bytes32(proposal)],
        )
    }

    pub fn authorize(&self, creator: Address) -> ContractCall {
        ContractCall::new(
            self.address,
            functions::AUTHORIZE,
            vec![Token::Address(creator)],
        )
    }

    pub fn unauthorize(&self, creator: Address) -> ContractCall {
        ContractCall::new(
            self.address,
            functions::UNAUTHORIZE,
            vec![Token::Address(creator)],
        )
    }

    pub async fn owner(&self) -> Result<Address, LedgerError> {
        self.read(functions::OWNER, &[], &[ParamType::Address])
            .await?
            .address()
    }

    /// `None` when no call with this id exists (zero creator).
    pub async fn call_record(&self, call_id: H256) -> Result<Option<CallRecord>, LedgerError> {
        let mut out = self
            .read(
                functions::CALLS,
                &[Token::Bytes32(call_id)],
                &[ParamType::Address, ParamType::Address],
            )
            .await?;
        let creator = out.address()?;
        let cfp = out.address()?;
        Ok((!creator.is_zero()).then_some(CallRecord {
            call_id,
            creator,
            cfp,
        }))
    }

    pub async fn is_authorized(&self, address: Address) -> Result<bool, LedgerError> {
        self.read(
            functions::IS_AUTHORIZED,
            &[Token::Address(address)],
            &[ParamType::Bool],
        )
        .await?
        .boolean()
    }

    pub async fn is_registered(&self, address: Address) -> Result<bool, LedgerError> {
        self.read(
            functions::IS_REGISTERED,
            &[Token::Address(address)],
            &[ParamType::Bool],
        )
        .await?
        .boolean()
    }

    pub async fn pending(&self) -> Result<Vec<Address>, LedgerError> {
        self.read_addresses(functions::GET_ALL_PENDING, &[]).await
    }

    pub async fn creators(&self) -> Result<Vec<Address>, LedgerError> {
        self.read_addresses(functions::CREATORS, &[]).await
    }

    pub async fn created_by(&self, creator: Address) -> Result<Vec<H256>, LedgerError> {
        self.read(
            functions::CREATED_BY,
            &[Token::Address(creator)],
            &[ParamType::array(ParamType::Bytes32)],
        )
        .await?
        .list(Token::into_bytes32)
    }

    pub async fn all_call_ids(&self) -> Result<Vec<H256>, LedgerError> {
        self.read(
            functions::ALL_CALL_IDS,
            &[],
            &[ParamType::array(ParamType::Bytes32)],
        )
        .await?
        .list(Token::into_bytes32)
    }

    async fn read_addresses(
        &self,
        function: &'static str,
        arguments: &[Token],
    ) -> Result<Vec<Address>, LedgerError> {
        self.read(function, arguments, &[ParamType::array(ParamType::Address)])
            .await?
            .list(Token::into_address)
    }

    async fn read(
        &self,
        function: &'static str,
        arguments: &[Token],
        outputs: &[ParamType],
    ) -> Result<Outputs, LedgerError> {
        read(self.ledger.as_ref(), self.address, function, arguments, outputs).await
    }
}

/// Contract deployed for a single call.
#[derive(Clone)]
pub struct CfpContract {
    ledger: Arc<dyn LedgerClient>,
    address: Address,
}

impl CfpContract {
    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn closing_time(&self) -> Result<u64, LedgerError> {
        read(
            self.ledger.as_ref(),
            self.address,
            functions::CLOSING_TIME,
            &[],
            &[ParamType::Uint],
        )
        .await?
        .uint()
    }

    /// `None` when the proposal was never registered (zero sender).
    pub async fn proposal_data(&self, proposal: H256) -> Result<Option<ProposalRecord>, LedgerError> {
        let mut out = read(
            self.ledger.as_ref(),
            self.address,
            functions::PROPOSAL_DATA,
            &[Token::Bytes32(proposal)],
            &[ParamType::Address, ParamType::Uint, ParamType::Uint],
        )
        .await?;
        let sender = out.address()?;
        let block_number = out.uint()?;
        let timestamp = out.uint()?;
        Ok((!sender.is_zero()).then_some(ProposalRecord {
            sender,
            block_number,
            timestamp,
        }))
    }
}
