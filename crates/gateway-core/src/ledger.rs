use crate::error::LedgerError;
use crate::transaction::SignedTransaction;
use crate::types::{Address, H256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Block selector for nonce queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    /// Includes transactions broadcast but not yet mined.
    Pending,
}

/// Read-only contract invocation, also used for gas estimation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Vec<u8>,
    pub gas: Option<u64>,
    pub gas_price: Option<u64>,
}

impl CallRequest {
    pub fn new(to: Address, data: Vec<u8>) -> Self {
        Self {
            from: None,
            to,
            data,
            gas: None,
            gas_price: None,
        }
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    /// False when execution reverted on inclusion.
    pub status: bool,
    pub gas_used: u64,
}

/// Connection to the shared ledger.
///
/// Implementations report contract reverts as [`LedgerError::Reverted`] with
/// the decoded reason when one is available.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Short backend label for logs and the health endpoint.
    fn backend(&self) -> &'static str;

    async fn chain_id(&self) -> Result<u64, LedgerError>;

    async fn latest_block(&self) -> Result<BlockInfo, LedgerError>;

    async fn block_number(&self) -> Result<u64, LedgerError> {
        Ok(self.latest_block().await?.number)
    }

    async fn transaction_count(&self, address: Address, tag: BlockTag)
        -> Result<u64, LedgerError>;

    async fn gas_price(&self) -> Result<u64, LedgerError>;

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, LedgerError>;

    /// Execute without committing. `block` pins the state to a past block.
    async fn call(&self, request: &CallRequest, block: Option<u64>)
        -> Result<Vec<u8>, LedgerError>;

    async fn send_raw_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<H256, LedgerError>;

    /// `None` while the transaction is not yet included.
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, LedgerError>;
}
