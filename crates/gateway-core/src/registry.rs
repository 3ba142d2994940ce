//! Authorization registry client: creator authorization state held by the
//! factory contract. Every query is a fresh ledger read.

use crate::account::SigningAccount;
use crate::contracts::CfpFactoryContract;
use crate::coordinator::WriteCoordinator;
use crate::error::GatewayError;
use crate::messages;
use crate::types::{Address, AuthorizationChange, WriteOutcome, WriteReceipt};
use std::sync::Arc;
use tracing::warn;

pub struct AuthorizationRegistry {
    factory: CfpFactoryContract,
    coordinator: Arc<WriteCoordinator>,
    operator: Arc<SigningAccount>,
}

impl AuthorizationRegistry {
    pub fn new(
        factory: CfpFactoryContract,
        coordinator: Arc<WriteCoordinator>,
        operator: Arc<SigningAccount>,
    ) -> Self {
        Self {
            factory,
            coordinator,
            operator,
        }
    }

    pub async fn is_authorized(&self, address: Address) -> Result<bool, GatewayError> {
        Ok(self.factory.is_authorized(address).await?)
    }

    pub async fn is_registered(&self, address: Address) -> Result<bool, GatewayError> {
        Ok(self.factory.is_registered(address).await?)
    }

    /// Accounts that registered but are not yet authorized.
    pub async fn pending(&self) -> Result<Vec<Address>, GatewayError> {
        Ok(self.factory.pending().await?)
    }

    /// Accounts that have created at least one call.
    pub async fn creators(&self) -> Result<Vec<Address>, GatewayError> {
        Ok(self.factory.creators().await?)
    }

    pub async fn authorize(
        &self,
        address: Address,
    ) -> Result<WriteOutcome<AuthorizationChange>, GatewayError> {
        if self.is_authorized(address).await? {
            return Err(GatewayError::conflict(messages::ALREADY_AUTHORIZED));
        }
        let outcome = self
            .coordinator
            .submit(&self.operator, self.factory.authorize(address))
            .await;
        self.settle(address, true, outcome, messages::ALREADY_AUTHORIZED)
            .await
    }

    pub async fn unauthorize(
        &self,
        address: Address,
    ) -> Result<WriteOutcome<AuthorizationChange>, GatewayError> {
        if !self.is_authorized(address).await? {
            return Err(GatewayError::conflict(messages::NOT_AUTHORIZED));
        }
        let outcome = self
            .coordinator
            .submit(&self.operator, self.factory.unauthorize(address))
            .await;
        self.settle(address, false, outcome, messages::NOT_AUTHORIZED)
            .await
    }

    /// Derive the response from the flag as re-read after the write.
    async fn settle(
        &self,
        address: Address,
        desired: bool,
        outcome: Result<WriteOutcome<WriteReceipt>, GatewayError>,
        conflict: &'static str,
    ) -> Result<WriteOutcome<AuthorizationChange>, GatewayError> {
        match outcome {
            Ok(WriteOutcome::Accepted { transaction_hash }) => {
                Ok(WriteOutcome::Accepted { transaction_hash })
            }
            Ok(WriteOutcome::Confirmed(receipt)) => {
                let authorized = self.is_authorized(address).await?;
                if authorized != desired {
                    return Err(GatewayError::Ledger(
                        "authorization flag unchanged after confirmed write".to_string(),
                    ));
                }
                Ok(WriteOutcome::Confirmed(AuthorizationChange {
                    address,
                    authorized,
                    transaction_hash: receipt.transaction_hash,
                }))
            }
            Err(err) if err.is_ledger() => {
                if self.is_authorized(address).await? == desired {
                    warn!(%address, "concurrent request already applied authorization change");
                    Err(GatewayError::conflict(conflict))
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }
}
