//! Ledger write coordinator.
//!
//! Every state-changing request funnels through [`WriteCoordinator::submit`].
//! Writes from one signing account are serialized from nonce read through
//! broadcast, so nonces are strictly increasing and gap-free. The per-account
//! lock is released as soon as the ledger accepts the transaction; waiting
//! for the receipt happens outside it.

use crate::account::SigningAccount;
use crate::contracts::ContractCall;
use crate::error::{GatewayError, LedgerError};
use crate::ledger::{BlockTag, CallRequest, LedgerClient, Receipt};
use crate::messages;
use crate::transaction::PendingWrite;
use crate::types::{Address, WriteOutcome, WriteReceipt, H256};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Fixed gas price in wei; `None` asks the ledger for its current price.
    pub gas_price: Option<u64>,
    /// Upper bound passed to gas estimation. `None` lets the node use its
    /// block gas limit, which contract deployments need.
    pub estimate_gas_ceiling: Option<u64>,
    pub receipt_poll_interval: Duration,
    /// After this long without a receipt the write is reported as accepted.
    pub receipt_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            gas_price: None,
            estimate_gas_ceiling: None,
            receipt_poll_interval: Duration::from_millis(500),
            receipt_timeout: Duration::from_secs(120),
        }
    }
}

/// A transaction the ledger accepted, kept for receipt polling and failure replay.
struct Broadcast {
    hash: H256,
    replay: CallRequest,
}

pub struct WriteCoordinator {
    ledger: Arc<dyn LedgerClient>,
    chain_id: u64,
    config: CoordinatorConfig,
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl WriteCoordinator {
    pub fn new(ledger: Arc<dyn LedgerClient>, chain_id: u64, config: CoordinatorConfig) -> Self {
        Self {
            ledger,
            chain_id,
            config,
            locks: DashMap::new(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn account_lock(&self, address: Address) -> Arc<Mutex<()>> {
        self.locks.entry(address).or_default().clone()
    }

    /// Sign and broadcast `call` from `account`, then wait for its receipt.
    ///
    /// Estimate, broadcast, and receipt failures (including reverts) are
    /// returned as [`GatewayError::Ledger`]. A receipt wait that times out
    /// yields [`WriteOutcome::Accepted`].
    pub async fn submit(
        &self,
        account: &SigningAccount,
        call: ContractCall,
    ) -> Result<WriteOutcome<WriteReceipt>, GatewayError> {
        let span = tracing::info_span!(
            "ledger_write",
            write_id = %Uuid::new_v4(),
            account = %account.address(),
            function = call.function,
        );

        async move {
            let broadcast = {
                let lock = self.account_lock(account.address());
                let _guard = lock.lock().await;
                self.broadcast(account, call).await?
            };
            self.await_receipt(broadcast).await
        }
        .instrument(span)
        .await
    }

    async fn broadcast(
        &self,
        account: &SigningAccount,
        call: ContractCall,
    ) -> Result<Broadcast, GatewayError> {
        let from = account.address();
        let nonce = self
            .ledger
            .transaction_count(from, BlockTag::Pending)
            .await?;
        let gas_price = match self.config.gas_price {
            Some(price) => price,
            None => self.ledger.gas_price().await?,
        };

        let estimate = CallRequest {
            from: Some(from),
            to: call.to,
            data: call.calldata(),
            gas: self.config.estimate_gas_ceiling,
            gas_price: Some(gas_price),
        };
        let gas_limit = self.ledger.estimate_gas(&estimate).await.map_err(|err| {
            warn!(error = %err, "gas estimation rejected write");
            GatewayError::from(err)
        })?;
        debug!(nonce, gas_price, gas_limit, "write parameters fixed");

        let write = PendingWrite {
            function: call.function,
            arguments: call.arguments,
            to: call.to,
            nonce,
            gas_limit,
            gas_price,
            chain_id: self.chain_id,
        };
        let replay = write.call_request(from);
        let signed = write.sign(account)?;
        let hash = self.ledger.send_raw_transaction(&signed).await?;
        info!(nonce, transaction = %hash, "transaction broadcast");

        Ok(Broadcast { hash, replay })
    }

    async fn await_receipt(
        &self,
        broadcast: Broadcast,
    ) -> Result<WriteOutcome<WriteReceipt>, GatewayError> {
        let waited =
            tokio::time::timeout(self.config.receipt_timeout, self.poll_receipt(broadcast.hash))
                .await;

        match waited {
            Err(_) => {
                warn!(transaction = %broadcast.hash, "receipt wait timed out");
                Ok(WriteOutcome::Accepted {
                    transaction_hash: broadcast.hash,
                })
            }
            Ok(Err(err)) => Err(err.into()),
            Ok(Ok(receipt)) if receipt.status => {
                info!(
                    transaction = %receipt.transaction_hash,
                    block_number = receipt.block_number,
                    "write confirmed"
                );
                Ok(WriteOutcome::Confirmed(WriteReceipt {
                    transaction_hash: receipt.transaction_hash,
                    block_number: receipt.block_number,
                }))
            }
            Ok(Ok(receipt)) => Err(self.failure(&broadcast.replay, &receipt).await),
        }
    }

    /// Poll until the receipt appears. Connectivity errors are retried; the
    /// caller's timeout bounds the wait.
    async fn poll_receipt(&self, hash: H256) -> Result<Receipt, LedgerError> {
        let mut interval = tokio::time::interval(self.config.receipt_poll_interval);
        loop {
            interval.tick().await;
            match self.ledger.transaction_receipt(hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(err @ (LedgerError::Unavailable(_) | LedgerError::Transport(_))) => {
                    warn!(transaction = %hash, error = %err, "receipt poll failed, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Replay the failed write at its block to recover the revert reason.
    async fn failure(&self, replay: &CallRequest, receipt: &Receipt) -> GatewayError {
        match self.ledger.call(replay, Some(receipt.block_number)).await {
            Err(LedgerError::Reverted(reason)) => {
                warn!(
                    transaction = %receipt.transaction_hash,
                    block_number = receipt.block_number,
                    %reason,
                    "transaction reverted"
                );
                GatewayError::Ledger(format!("transaction reverted: {reason}"))
            }
            _ => {
                warn!(transaction = %receipt.transaction_hash, "transaction failed without reason");
                GatewayError::Ledger(messages::TRANSACTION_FAILED.to_string())
            }
        }
    }
}
