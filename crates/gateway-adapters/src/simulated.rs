//! Deterministic development ledger.
//!
//! Executes the stamper, factory, and per-call contract rules in process,
//! enforces per-account nonce ordering, and mines one block per transaction.
//! Reverts carry the same reasons the deployed contracts emit.

use async_trait::async_trait;
use chrono::Utc;
use gateway_core::abi::{self, ParamType, Token};
use gateway_core::{
    derive_cfp_address, functions, keccak256, Address, BlockInfo, BlockTag, CallRecord,
    CallRequest, ContractCall, LedgerClient, LedgerError, ProposalRecord, Receipt,
    SignedTransaction, StampRecord, H256,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub const DEFAULT_CHAIN_ID: u64 = 1337;

const GAS_PRICE: u64 = 1_000_000_000;
const WRITE_GAS: u64 = 60_000;

/// When broadcast transactions are included in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MiningMode {
    /// Mined inside `send_raw_transaction`.
    Instant,
    /// Mined on the first receipt query, so concurrent writers can observe
    /// each other's pending transactions.
    #[default]
    OnReceipt,
    /// Only mined by [`InMemoryLedger::mine`].
    Manual,
}

pub struct InMemoryLedger {
    chain_id: u64,
    stamper: Address,
    factory: Address,
    owner: Address,
    mining: MiningMode,
    chain: Mutex<Chain>,
}

impl InMemoryLedger {
    /// Fresh chain whose contracts are owned by `owner`.
    pub fn new(owner: Address) -> Self {
        Self::with_chain_id(owner, DEFAULT_CHAIN_ID)
    }

    pub fn with_chain_id(owner: Address, chain_id: u64) -> Self {
        let stamper = contract_address(&owner, b"stamper");
        let factory = contract_address(&owner, b"cfp-factory");
        let genesis = BlockInfo {
            number: 0,
            timestamp: wall_clock(),
        };

        Self {
            chain_id,
            stamper,
            factory,
            owner,
            mining: MiningMode::default(),
            chain: Mutex::new(Chain {
                clock: None,
                blocks: vec![genesis],
                nonces: HashMap::new(),
                mempool: Vec::new(),
                receipts: HashMap::new(),
                world: World::new(owner, stamper, factory),
            }),
        }
    }

    pub fn with_mining(mut self, mining: MiningMode) -> Self {
        self.mining = mining;
        self
    }

    pub fn stamper_address(&self) -> Address {
        self.stamper
    }

    pub fn factory_address(&self) -> Address {
        self.factory
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Pin the clock used for new block timestamps.
    pub fn set_time(&self, timestamp: u64) -> Result<(), LedgerError> {
        self.chain()?.clock = Some(timestamp);
        Ok(())
    }

    /// Move the clock forward and mine an empty block at the new time.
    pub fn advance_time(&self, seconds: u64) -> Result<BlockInfo, LedgerError> {
        let mut chain = self.chain()?;
        let now = chain.now().saturating_add(seconds);
        chain.clock = Some(now);
        Ok(chain.seal_block())
    }

    /// Include every pending transaction; returns how many were mined.
    pub fn mine(&self) -> Result<usize, LedgerError> {
        Ok(self.chain()?.mine())
    }

    pub fn pending_transactions(&self) -> Result<usize, LedgerError> {
        Ok(self.chain()?.mempool.len())
    }

    /// Execute `call` as a transaction sent directly by `from`, bypassing the
    /// gateway. Models users interacting with the contracts from a wallet.
    pub fn execute_as(&self, from: Address, call: &ContractCall) -> Result<Receipt, LedgerError> {
        let mut chain = self.chain()?;
        let nonce = chain.pending_nonce(&from);
        let data = call.calldata();

        let mut preimage = from.as_bytes().to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(&data);
        let hash = H256::from(keccak256(&preimage));

        let (receipt, revert) = chain.include(hash, from, call.to, &data, WRITE_GAS);
        match revert {
            Some(reason) => Err(LedgerError::Reverted(reason)),
            None => Ok(receipt),
        }
    }

    fn chain(&self) -> Result<MutexGuard<'_, Chain>, LedgerError> {
        self.chain
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger state poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        Ok(self.chain_id)
    }

    async fn latest_block(&self) -> Result<BlockInfo, LedgerError> {
        Ok(self.chain()?.head())
    }

    async fn transaction_count(&self, address: Address, tag: BlockTag) -> Result<u64, LedgerError> {
        let chain = self.chain()?;
        Ok(match tag {
            BlockTag::Latest => chain.nonces.get(&address).copied().unwrap_or_default(),
            BlockTag::Pending => chain.pending_nonce(&address),
        })
    }

    async fn gas_price(&self) -> Result<u64, LedgerError> {
        Ok(GAS_PRICE)
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, LedgerError> {
        let chain = self.chain()?;
        let head = chain.head();
        let context = Context {
            from: request.from.unwrap_or_default(),
            block_number: head.number + 1,
            timestamp: chain.now().max(head.timestamp + 1),
        };
        let mut scratch = chain.world.clone();
        scratch
            .execute(&context, request.to, &request.data)
            .map(|_| WRITE_GAS)
            .map_err(LedgerError::Reverted)
    }

    /// Executes against the current state; `block` must exist but does not
    /// select historical state.
    async fn call(&self, request: &CallRequest, block: Option<u64>) -> Result<Vec<u8>, LedgerError> {
        let chain = self.chain()?;
        let head = chain.head();
        if block.is_some_and(|number| number > head.number) {
            return Err(LedgerError::Rpc {
                code: -32000,
                message: "header not found".to_string(),
            });
        }
        let context = Context {
            from: request.from.unwrap_or_default(),
            block_number: head.number,
            timestamp: head.timestamp,
        };
        let mut scratch = chain.world.clone();
        scratch
            .execute(&context, request.to, &request.data)
            .map_err(LedgerError::Reverted)
    }

    async fn send_raw_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<H256, LedgerError> {
        let rejected = |message: &str| LedgerError::Rpc {
            code: -32000,
            message: message.to_string(),
        };

        if transaction.write.chain_id != self.chain_id {
            return Err(rejected("invalid chain id"));
        }
        if transaction.recover_sender() != Some(transaction.from) {
            return Err(rejected("invalid sender"));
        }

        let mut chain = self.chain()?;
        if chain.receipts.contains_key(&transaction.hash)
            || chain.mempool.iter().any(|queued| queued.hash == transaction.hash)
        {
            return Err(rejected("already known"));
        }
        let expected = chain.pending_nonce(&transaction.from);
        if transaction.write.nonce < expected {
            return Err(rejected("nonce too low"));
        }
        if transaction.write.nonce > expected {
            return Err(rejected("nonce too high"));
        }

        chain.mempool.push(transaction.clone());
        if self.mining == MiningMode::Instant {
            chain.mine();
        }
        Ok(transaction.hash)
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, LedgerError> {
        let mut chain = self.chain()?;
        if self.mining == MiningMode::OnReceipt
            && chain.mempool.iter().any(|queued| queued.hash == hash)
        {
            chain.mine();
        }
        Ok(chain.receipts.get(&hash).copied())
    }
}

fn contract_address(owner: &Address, label: &[u8]) -> Address {
    let mut preimage = owner.as_bytes().to_vec();
    preimage.extend_from_slice(label);
    Address::from_word(&keccak256(&preimage))
}

fn wall_clock() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

struct Chain {
    clock: Option<u64>,
    blocks: Vec<BlockInfo>,
    /// Mined transaction count per account.
    nonces: HashMap<Address, u64>,
    mempool: Vec<SignedTransaction>,
    receipts: HashMap<H256, Receipt>,
    world: World,
}

impl Chain {
    fn now(&self) -> u64 {
        self.clock.unwrap_or_else(wall_clock)
    }

    fn head(&self) -> BlockInfo {
        self.blocks.last().copied().unwrap_or(BlockInfo {
            number: 0,
            timestamp: 0,
        })
    }

    fn pending_nonce(&self, address: &Address) -> u64 {
        let mined = self.nonces.get(address).copied().unwrap_or_default();
        let queued = self
            .mempool
            .iter()
            .filter(|queued| queued.from == *address)
            .count() as u64;
        mined + queued
    }

    fn seal_block(&mut self) -> BlockInfo {
        let parent = self.head();
        let block = BlockInfo {
            number: parent.number + 1,
            timestamp: self.now().max(parent.timestamp + 1),
        };
        self.blocks.push(block);
        block
    }

    fn mine(&mut self) -> usize {
        let queued = std::mem::take(&mut self.mempool);
        for transaction in &queued {
            let write = &transaction.write;
            self.include(
                transaction.hash,
                transaction.from,
                write.to,
                &write.calldata(),
                write.gas_limit,
            );
        }
        queued.len()
    }

    /// Mine a block holding one transaction. State changes are kept only when
    /// execution succeeds; the nonce is consumed either way.
    fn include(
        &mut self,
        hash: H256,
        from: Address,
        to: Address,
        data: &[u8],
        gas_limit: u64,
    ) -> (Receipt, Option<Revert>) {
        let block = self.seal_block();
        let context = Context {
            from,
            block_number: block.number,
            timestamp: block.timestamp,
        };
        let mut scratch = self.world.clone();
        let revert = scratch.execute(&context, to, data).err();
        *self.nonces.entry(from).or_default() += 1;

        let status = revert.is_none();
        if status {
            self.world = scratch;
        }
        let receipt = Receipt {
            transaction_hash: hash,
            block_number: block.number,
            status,
            gas_used: if status { WRITE_GAS } else { gas_limit },
        };
        self.receipts.insert(hash, receipt);
        debug!(transaction = %hash, block_number = block.number, status, "block sealed");

        (receipt, revert)
    }
}

struct Context {
    from: Address,
    block_number: u64,
    timestamp: u64,
}

#[derive(Clone)]
struct Cfp {
    closing_time: u64,
    proposals: HashMap<H256, ProposalRecord>,
}

/// Contract storage.
#[derive(Clone)]
struct World {
    owner: Address,
    stamper: Address,
    factory: Address,
    stamps: HashMap<H256, StampRecord>,
    calls: HashMap<H256, CallRecord>,
    call_ids: Vec<H256>,
    creators: Vec<Address>,
    created_by: HashMap<Address, Vec<H256>>,
    authorized: HashSet<Address>,
    registered: HashSet<Address>,
    pending: Vec<Address>,
    cfps: HashMap<Address, Cfp>,
}

type Revert = String;

fn is(selector: &[u8], signature: &str) -> bool {
    selector == abi::selector(signature)
}

fn arguments(types: &[ParamType], data: &[u8]) -> Result<std::vec::IntoIter<Token>, Revert> {
    abi::decode(types, data)
        .map(Vec::into_iter)
        .map_err(|_| "invalid calldata".to_string())
}

fn arg<T>(tokens: &mut std::vec::IntoIter<Token>, take: fn(Token) -> Option<T>) -> Result<T, Revert> {
    tokens
        .next()
        .and_then(take)
        .ok_or_else(|| "invalid calldata".to_string())
}

fn unknown_function() -> Revert {
    "function selector not recognized".to_string()
}

impl World {
    fn new(owner: Address, stamper: Address, factory: Address) -> Self {
        Self {
            owner,
            stamper,
            factory,
            stamps: HashMap::new(),
            calls: HashMap::new(),
            call_ids: Vec::new(),
            creators: Vec::new(),
            created_by: HashMap::new(),
            authorized: HashSet::new(),
            registered: HashSet::new(),
            pending: Vec::new(),
            cfps: HashMap::new(),
        }
    }

    fn execute(&mut self, context: &Context, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if data.len() < 4 {
            return Err(unknown_function());
        }
        let (selector, args) = data.split_at(4);
        if to == self.stamper {
            self.stamper_call(context, selector, args)
        } else if to == self.factory {
            self.factory_call(context, selector, args)
        } else if self.cfps.contains_key(&to) {
            self.cfp_call(to, selector, args)
        } else {
            // Accounts without code accept any call and return nothing.
            Ok(Vec::new())
        }
    }

    fn stamper_call(&mut self, context: &Context, selector: &[u8], args: &[u8]) -> Result<Vec<u8>, Revert> {
        if is(selector, functions::STAMP) {
            let hash = arg(&mut arguments(&[ParamType::Bytes32], args)?, Token::into_bytes32)?;
            if self.stamps.contains_key(&hash) {
                return Err("Hash already stamped".to_string());
            }
            self.stamps.insert(
                hash,
                StampRecord {
                    signer: context.from,
                    block_number: context.block_number,
                },
            );
            Ok(Vec::new())
        } else if is(selector, functions::STAMPED) {
            let hash = arg(&mut arguments(&[ParamType::Bytes32], args)?, Token::into_bytes32)?;
            let record = self.stamps.get(&hash);
            Ok(abi::encode(&[
                Token::Address(record.map(|r| r.signer).unwrap_or_default()),
                Token::Uint(record.map_or(0, |r| r.block_number)),
            ]))
        } else {
            Err(unknown_function())
        }
    }

    fn only_owner(&self, context: &Context) -> Result<(), Revert> {
        if context.from != self.owner {
            return Err("Only owner".to_string());
        }
        Ok(())
    }

    fn factory_call(&mut self, context: &Context, selector: &[u8], args: &[u8]) -> Result<Vec<u8>, Revert> {
        if is(selector, functions::OWNER) {
            Ok(abi::encode(&[Token::Address(self.owner)]))
        } else if is(selector, functions::CALLS) {
            let call_id = arg(&mut arguments(&[ParamType::Bytes32], args)?, Token::into_bytes32)?;
            let call = self.calls.get(&call_id);
            Ok(abi::encode(&[
                Token::Address(call.map(|c| c.creator).unwrap_or_default()),
                Token::Address(call.map(|c| c.cfp).unwrap_or_default()),
            ]))
        } else if is(selector, functions::CREATE_FOR) {
            self.only_owner(context)?;
            let mut tokens = arguments(
                &[ParamType::Bytes32, ParamType::Uint, ParamType::Address],
                args,
            )?;
            let call_id = arg(&mut tokens, Token::into_bytes32)?;
            let closing_time = arg(&mut tokens, Token::into_uint)?;
            let creator = arg(&mut tokens, Token::into_address)?;
            self.create_call(context, call_id, closing_time, creator)?;
            Ok(Vec::new())
        } else if is(selector, functions::REGISTER_PROPOSAL) {
            self.only_owner(context)?;
            let mut tokens = arguments(&[ParamType::Bytes32, ParamType::Bytes32], args)?;
            let call_id = arg(&mut tokens, Token::into_bytes32)?;
            let proposal = arg(&mut tokens, Token::into_bytes32)?;
            self.register_proposal(context, call_id, proposal)?;
            Ok(Vec::new())
        } else if is(selector, functions::REGISTER) {
            if self.registered.contains(&context.from) {
                return Err("Already registered".to_string());
            }
            self.registered.insert(context.from);
            self.pending.push(context.from);
            Ok(Vec::new())
        } else if is(selector, functions::AUTHORIZE) {
            self.only_owner(context)?;
            let creator = arg(&mut arguments(&[ParamType::Address], args)?, Token::into_address)?;
            if !self.authorized.insert(creator) {
                return Err("Already authorized".to_string());
            }
            self.registered.insert(creator);
            self.pending.retain(|pending| *pending != creator);
            Ok(Vec::new())
        } else if is(selector, functions::UNAUTHORIZE) {
            self.only_owner(context)?;
            let creator = arg(&mut arguments(&[ParamType::Address], args)?, Token::into_address)?;
            if !self.authorized.remove(&creator) {
                return Err("Not authorized".to_string());
            }
            Ok(Vec::new())
        } else if is(selector, functions::IS_AUTHORIZED) {
            let account = arg(&mut arguments(&[ParamType::Address], args)?, Token::into_address)?;
            Ok(abi::encode(&[Token::Bool(self.authorized.contains(&account))]))
        } else if is(selector, functions::IS_REGISTERED) {
            let account = arg(&mut arguments(&[ParamType::Address], args)?, Token::into_address)?;
            Ok(abi::encode(&[Token::Bool(self.registered.contains(&account))]))
        } else if is(selector, functions::GET_ALL_PENDING) {
            Ok(address_list(&self.pending))
        } else if is(selector, functions::CREATORS) {
            Ok(address_list(&self.creators))
        } else if is(selector, functions::CREATED_BY) {
            let creator = arg(&mut arguments(&[ParamType::Address], args)?, Token::into_address)?;
            let ids = self.created_by.get(&creator).map(Vec::as_slice).unwrap_or_default();
            Ok(hash_list(ids))
        } else if is(selector, functions::ALL_CALL_IDS) {
            Ok(hash_list(&self.call_ids))
        } else {
            Err(unknown_function())
        }
    }

    fn create_call(
        &mut self,
        context: &Context,
        call_id: H256,
        closing_time: u64,
        creator: Address,
    ) -> Result<(), Revert> {
        if self.calls.contains_key(&call_id) {
            return Err("Call already exists".to_string());
        }
        if !self.authorized.contains(&creator) {
            return Err("Creator is not authorized".to_string());
        }
        if closing_time <= context.timestamp {
            return Err("Closing time must be in the future".to_string());
        }

        let cfp = derive_cfp_address(&self.factory, &call_id);
        self.calls.insert(
            call_id,
            CallRecord {
                call_id,
                creator,
                cfp,
            },
        );
        self.cfps.insert(
            cfp,
            Cfp {
                closing_time,
                proposals: HashMap::new(),
            },
        );
        self.call_ids.push(call_id);
        if !self.creators.contains(&creator) {
            self.creators.push(creator);
        }
        self.created_by.entry(creator).or_default().push(call_id);
        Ok(())
    }

    fn register_proposal(
        &mut self,
        context: &Context,
        call_id: H256,
        proposal: H256,
    ) -> Result<(), Revert> {
        let cfp_address = self
            .calls
            .get(&call_id)
            .map(|call| call.cfp)
            .ok_or_else(|| "Call does not exist".to_string())?;
        let cfp = self
            .cfps
            .get_mut(&cfp_address)
            .ok_or_else(|| "Call does not exist".to_string())?;
        if context.timestamp >= cfp.closing_time {
            return Err("Call closed".to_string());
        }
        if cfp.proposals.contains_key(&proposal) {
            return Err("Proposal already registered".to_string());
        }
        cfp.proposals.insert(
            proposal,
            ProposalRecord {
                sender: context.from,
                block_number: context.block_number,
                timestamp: context.timestamp,
            },
        );
        Ok(())
    }

    fn cfp_call(&self, address: Address, selector: &[u8], args: &[u8]) -> Result<Vec<u8>, Revert> {
        let cfp = self.cfps.get(&address).ok_or_else(unknown_function)?;
        if is(selector, functions::CLOSING_TIME) {
            Ok(abi::encode(&[Token::Uint(cfp.closing_time)]))
        } else if is(selector, functions::PROPOSAL_DATA) {
            let proposal = arg(&mut arguments(&[ParamType::Bytes32], args)?, Token::into_bytes32)?;
            let record = cfp.proposals.get(&proposal);
            Ok(abi::encode(&[
                Token::Address(record.map(|r| r.sender).unwrap_or_default()),
                Token::Uint(record.map_or(0, |r| r.block_number)),
                Token::Uint(record.map_or(0, |r| r.timestamp)),
            ]))
        } else {
            Err(unknown_function())
        }
    }
}

fn address_list(addresses: &[Address]) -> Vec<u8> {
    abi::encode(&[Token::Array(
        addresses.iter().copied().map(Token::Address).collect(),
    )])
}

fn hash_list(hashes: &[H256]) -> Vec<u8> {
    abi::encode(&[Token::Array(
        hashes.iter().copied().map(Token::Bytes32).collect(),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{CfpFactoryContract, PendingWrite, SigningAccount, StamperContract};
    use std::sync::Arc;

    fn operator() -> SigningAccount {
        SigningAccount::from_bytes(&[0x0a; 32]).unwrap()
    }

    fn signed_stamp(
        ledger: &InMemoryLedger,
        account: &SigningAccount,
        nonce: u64,
        byte: u8,
    ) -> SignedTransaction {
        PendingWrite {
            function: functions::STAMP,
            arguments: vec![Token::Bytes32(H256::from([byte; 32]))],
            to: ledger.stamper_address(),
            nonce,
            gas_limit: 100_000,
            gas_price: GAS_PRICE,
            chain_id: DEFAULT_CHAIN_ID,
        }
        .sign(account)
        .unwrap()
    }

    #[tokio::test]
    async fn enforces_nonce_order() {
        let account = operator();
        let ledger = InMemoryLedger::new(account.address()).with_mining(MiningMode::Manual);

        let err = ledger
            .send_raw_transaction(&signed_stamp(&ledger, &account, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { ref message, .. } if message == "nonce too high"));

        ledger
            .send_raw_transaction(&signed_stamp(&ledger, &account, 0, 1))
            .await
            .unwrap();
        assert_eq!(
            ledger
                .transaction_count(account.address(), BlockTag::Pending)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            ledger
                .transaction_count(account.address(), BlockTag::Latest)
                .await
                .unwrap(),
            0
        );

        assert_eq!(ledger.mine().unwrap(), 1);
        let err = ledger
            .send_raw_transaction(&signed_stamp(&ledger, &account, 0, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { ref message, .. } if message == "nonce too low"));
    }

    #[tokio::test]
    async fn receipt_query_mines_lazily() {
        let account = operator();
        let ledger = InMemoryLedger::new(account.address());
        let tx = signed_stamp(&ledger, &account, 0, 7);

        ledger.send_raw_transaction(&tx).await.unwrap();
        assert_eq!(ledger.pending_transactions().unwrap(), 1);

        let receipt = ledger.transaction_receipt(tx.hash).await.unwrap().unwrap();
        assert!(receipt.status);
        assert_eq!(receipt.block_number, 1);
        assert_eq!(ledger.pending_transactions().unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_stamp_reverts_on_inclusion() {
        let account = operator();
        let ledger = Arc::new(InMemoryLedger::new(account.address()).with_mining(MiningMode::Manual));
        let first = signed_stamp(&ledger, &account, 0, 9);
        let second = signed_stamp(&ledger, &account, 1, 9);
        ledger.send_raw_transaction(&first).await.unwrap();
        ledger.send_raw_transaction(&second).await.unwrap();
        ledger.mine().unwrap();

        let ok = ledger.transaction_receipt(first.hash).await.unwrap().unwrap();
        let failed = ledger.transaction_receipt(second.hash).await.unwrap().unwrap();
        assert!(ok.status);
        assert!(!failed.status);

        let stamper = StamperContract::new(ledger.clone(), ledger.stamper_address());
        let record = stamper.stamped(H256::from([9; 32])).await.unwrap().unwrap();
        assert_eq!(record.signer, account.address());
        assert_eq!(record.block_number, ok.block_number);

        let replay = first.write.call_request(account.address());
        let err = ledger.call(&replay, Some(failed.block_number)).await.unwrap_err();
        assert_eq!(err, LedgerError::Reverted("Hash already stamped".to_string()));
    }

    #[tokio::test]
    async fn rejects_transactions_for_other_chains() {
        let account = operator();
        let ledger = InMemoryLedger::with_chain_id(account.address(), 5);
        let err = ledger
            .send_raw_transaction(&signed_stamp(&ledger, &account, 0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { ref message, .. } if message == "invalid chain id"));
    }

    #[tokio::test]
    async fn factory_tracks_registration_lifecycle() {
        let owner = operator();
        let user = SigningAccount::from_bytes(&[0x0b; 32]).unwrap();
        let ledger = Arc::new(InMemoryLedger::new(owner.address()));
        let factory = CfpFactoryContract::new(ledger.clone(), ledger.factory_address());

        ledger
            .execute_as(user.address(), &ContractCall::new(factory.address(), functions::REGISTER, vec![]))
            .unwrap();
        assert!(factory.is_registered(user.address()).await.unwrap());
        assert_eq!(factory.pending().await.unwrap(), vec![user.address()]);

        let err = ledger
            .execute_as(user.address(), &factory.authorize(user.address()))
            .unwrap_err();
        assert_eq!(err, LedgerError::Reverted("Only owner".to_string()));

        ledger
            .execute_as(owner.address(), &factory.authorize(user.address()))
            .unwrap();
        assert!(factory.is_authorized(user.address()).await.unwrap());
        assert!(factory.pending().await.unwrap().is_empty());
        assert_eq!(factory.owner().await.unwrap(), owner.address());
    }

    #[tokio::test]
    async fn calls_close_at_their_deadline() {
        let owner = operator();
        let creator = SigningAccount::from_bytes(&[0x0c; 32]).unwrap();
        let ledger = Arc::new(InMemoryLedger::new(owner.address()));
        let start = ledger.latest_block().await.unwrap().timestamp + 1_000;
        ledger.set_time(start).unwrap();
        let factory = CfpFactoryContract::new(ledger.clone(), ledger.factory_address());
        ledger
            .execute_as(owner.address(), &factory.authorize(creator.address()))
            .unwrap();

        let call_id = H256::from([0x33; 32]);
        ledger
            .execute_as(
                owner.address(),
                &factory.create_for(call_id, start + 100, creator.address()),
            )
            .unwrap();
        let call = factory.call_record(call_id).await.unwrap().unwrap();
        assert_eq!(call.creator, creator.address());
        assert_eq!(call.cfp, derive_cfp_address(&factory.address(), &call_id));
        assert_eq!(factory.cfp(call.cfp).closing_time().await.unwrap(), start + 100);
        assert_eq!(factory.created_by(creator.address()).await.unwrap(), vec![call_id]);

        ledger.advance_time(100).unwrap();
        let err = ledger
            .execute_as(
                owner.address(),
                &factory.register_proposal(call_id, H256::from([0x44; 32])),
            )
            .unwrap_err();
        assert_eq!(err, LedgerError::Reverted("Call closed".to_string()));
    }
}
