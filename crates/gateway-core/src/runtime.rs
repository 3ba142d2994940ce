use crate::account::SigningAccount;
use crate::contracts::{CfpFactoryContract, StamperContract};
use crate::coordinator::{CoordinatorConfig, WriteCoordinator};
use crate::error::{BootstrapError, GatewayError, LedgerError};
use crate::ledger::{BlockInfo, LedgerClient};
use crate::messages;
use crate::registry::AuthorizationRegistry;
use crate::signature::{recover_signer, RecoverableSignature};
use crate::types::{
    Address, AuthorizationChange, CallRecord, CallState, CallSummary, ProposalRecord,
    StampConfirmation, StampRecord, WriteOutcome, WriteReceipt, H256,
};
use crate::workflow::{
    parse_address, parse_closing_time, parse_identifier, stamped_conflict, WorkflowValidator,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Gateway runtime configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub stamper: Address,
    pub factory: Address,
    pub coordinator: CoordinatorConfig,
    /// Refuse to start unless the operator owns the factory.
    pub verify_contract_owner: bool,
}

/// Gateway engine composing the authenticator, registry, validator, and
/// write coordinator over one ledger connection and one operator account.
pub struct LedgerGateway {
    ledger: Arc<dyn LedgerClient>,
    operator: Arc<SigningAccount>,
    coordinator: Arc<WriteCoordinator>,
    stamper: StamperContract,
    factory: CfpFactoryContract,
    registry: AuthorizationRegistry,
    validator: WorkflowValidator,
}

impl LedgerGateway {
    pub async fn bootstrap(
        ledger: Arc<dyn LedgerClient>,
        operator: SigningAccount,
        config: GatewayConfig,
    ) -> Result<Self, BootstrapError> {
        let chain_id = ledger.chain_id().await?;
        let stamper = StamperContract::new(ledger.clone(), config.stamper);
        let factory = CfpFactoryContract::new(ledger.clone(), config.factory);

        if config.verify_contract_owner {
            let owner = factory.owner().await?;
            if owner != operator.address() {
                return Err(BootstrapError::SignerMismatch {
                    expected: owner,
                    actual: operator.address(),
                });
            }
        }

        let operator = Arc::new(operator);
        let coordinator = Arc::new(WriteCoordinator::new(
            ledger.clone(),
            chain_id,
            config.coordinator,
        ));
        let registry =
            AuthorizationRegistry::new(factory.clone(), coordinator.clone(), operator.clone());
        let validator = WorkflowValidator::new(ledger.clone(), stamper.clone(), factory.clone());

        info!(
            backend = ledger.backend(),
            chain_id,
            operator = %operator.address(),
            stamper = %stamper.address(),
            factory = %factory.address(),
            "ledger gateway ready"
        );

        Ok(Self {
            ledger,
            operator,
            coordinator,
            stamper,
            factory,
            registry,
            validator,
        })
    }

    pub fn operator(&self) -> Address {
        self.operator.address()
    }

    pub fn stamper_address(&self) -> Address {
        self.stamper.address()
    }

    pub fn factory_address(&self) -> Address {
        self.factory.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.coordinator.chain_id()
    }

    pub fn backend(&self) -> &'static str {
        self.ledger.backend()
    }

    pub async fn latest_block(&self) -> Result<BlockInfo, LedgerError> {
        self.ledger.latest_block().await
    }

    pub async fn stamp(
        &self,
        hash: &str,
    ) -> Result<WriteOutcome<StampConfirmation>, GatewayError> {
        let hash = parse_identifier(hash, messages::INVALID_HASH)?;
        self.validator.ensure_not_stamped(hash).await?;

        let outcome = self
            .coordinator
            .submit(&self.operator, self.stamper.stamp(hash))
            .await;

        match outcome {
            Ok(WriteOutcome::Accepted { transaction_hash }) => {
                Ok(WriteOutcome::Accepted { transaction_hash })
            }
            Ok(WriteOutcome::Confirmed(receipt)) => {
                let record = self
                    .validator
                    .stamp_record(hash)
                    .await?
                    .ok_or_else(|| not_visible("stamp"))?;
                Ok(WriteOutcome::Confirmed(StampConfirmation {
                    transaction_hash: receipt.transaction_hash,
                    record,
                }))
            }
            Err(err) if err.is_ledger() => match self.validator.stamp_record(hash).await? {
                Some(record) => {
                    warn!(%hash, "stamp lost a concurrent race");
                    Err(stamped_conflict(hash, &record))
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    pub async fn stamped(&self, hash: &str) -> Result<StampRecord, GatewayError> {
        let hash = parse_identifier(hash, messages::INVALID_HASH)?;
        self.validator
            .stamp_record(hash)
            .await?
            .ok_or_else(|| GatewayError::not_found(messages::HASH_NOT_FOUND))
    }

    /// Create a call on behalf of the account that signed `factory || call_id`.
    pub async fn create_call(
        &self,
        call_id: &str,
        closing_time: &str,
        signature: &str,
    ) -> Result<WriteOutcome<CallRecord>, GatewayError> {
        let signature = RecoverableSignature::parse(signature)?;
        let call_id = parse_identifier(call_id, messages::INVALID_CALLID)?;
        let closing_time = parse_closing_time(closing_time)?;

        let mut message = self.factory.address().as_bytes().to_vec();
        message.extend_from_slice(call_id.as_bytes());
        let creator = recover_signer(&message, &signature)?;

        if !self.registry.is_authorized(creator).await? {
            return Err(GatewayError::Authorization(messages::UNAUTHORIZED.to_string()));
        }
        self.validator.ensure_call_unused(call_id).await?;
        self.validator.ensure_closing_time(closing_time).await?;

        let outcome = self
            .coordinator
            .submit(
                &self.operator,
                self.factory.create_for(call_id, closing_time, creator),
            )
            .await;

        match outcome {
            Ok(WriteOutcome::Accepted { transaction_hash }) => {
                Ok(WriteOutcome::Accepted { transaction_hash })
            }
            Ok(WriteOutcome::Confirmed(_)) => {
                let record = self
                    .validator
                    .call_record(call_id)
                    .await?
                    .ok_or_else(|| not_visible("call"))?;
                if record.creator != creator {
                    return Err(GatewayError::conflict(messages::ALREADY_CREATED));
                }
                info!(%call_id, %creator, cfp = %record.cfp, "call created");
                Ok(WriteOutcome::Confirmed(record))
            }
            Err(err) if err.is_ledger() => match self.validator.call_record(call_id).await? {
                Some(_) => {
                    warn!(%call_id, "call creation lost a concurrent race");
                    Err(GatewayError::conflict(messages::ALREADY_CREATED))
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Authorize `address` after proving it signed the factory address.
    pub async fn register(
        &self,
        address: &str,
        signature: &str,
    ) -> Result<WriteOutcome<AuthorizationChange>, GatewayError> {
        let address = parse_address(address)?;
        let signature = RecoverableSignature::parse(signature)?;
        let signer = recover_signer(self.factory.address().as_bytes(), &signature)?;
        if signer != address {
            return Err(GatewayError::validation(messages::INVALID_SIGNATURE));
        }
        self.registry.authorize(address).await
    }

    /// Operator-only: the signature must cover `factory || address`.
    pub async fn authorize(
        &self,
        address: &str,
        signature: &str,
    ) -> Result<WriteOutcome<AuthorizationChange>, GatewayError> {
        let address = self.operator_approval(address, signature)?;
        self.registry.authorize(address).await
    }

    pub async fn unauthorize(
        &self,
        address: &str,
        signature: &str,
    ) -> Result<WriteOutcome<AuthorizationChange>, GatewayError> {
        let address = self.operator_approval(address, signature)?;
        self.registry.unauthorize(address).await
    }

    fn operator_approval(&self, address: &str, signature: &str) -> Result<Address, GatewayError> {
        let address = parse_address(address)?;
        let signature = RecoverableSignature::parse(signature)?;
        let mut message = self.factory.address().as_bytes().to_vec();
        message.extend_from_slice(address.as_bytes());
        if recover_signer(&message, &signature)? != self.operator.address() {
            return Err(GatewayError::Authorization(messages::UNAUTHORIZED.to_string()));
        }
        Ok(address)
    }

    /// Register a proposal hash against an open call. A missing call id is
    /// reported as not found.
    pub async fn register_proposal(
        &self,
        call_id: Option<&str>,
        proposal: Option<&str>,
    ) -> Result<WriteOutcome<ProposalRecord>, GatewayError> {
        let call_id = call_id.ok_or_else(|| GatewayError::not_found(messages::CALLID_NOT_FOUND))?;
        let call_id = parse_identifier(call_id, messages::INVALID_CALLID)?;
        let call = self.validator.require_call(call_id).await?;
        let proposal = parse_identifier(proposal.unwrap_or_default(), messages::INVALID_PROPOSAL)?;
        self.validator
            .ensure_proposal_registrable(&call, proposal)
            .await?;

        let outcome = self
            .coordinator
            .submit(
                &self.operator,
                self.factory.register_proposal(call_id, proposal),
            )
            .await;
        self.settle_proposal(&call, proposal, outcome).await
    }

    async fn settle_proposal(
        &self,
        call: &CallRecord,
        proposal: H256,
        outcome: Result<WriteOutcome<WriteReceipt>, GatewayError>,
    ) -> Result<WriteOutcome<ProposalRecord>, GatewayError> {
        match outcome {
            Ok(WriteOutcome::Accepted { transaction_hash }) => {
                Ok(WriteOutcome::Accepted { transaction_hash })
            }
            Ok(WriteOutcome::Confirmed(_)) => self
                .validator
                .proposal_record(call, proposal)
                .await?
                .map(WriteOutcome::Confirmed)
                .ok_or_else(|| not_visible("proposal")),
            Err(err) if err.is_ledger() => {
                if self.validator.proposal_record(call, proposal).await?.is_some() {
                    warn!(call_id = %call.call_id, %proposal, "proposal registration lost a concurrent race");
                    return Err(GatewayError::conflict(messages::ALREADY_REGISTERED));
                }
                if self.validator.call_state(call.call_id).await? == CallState::Closed {
                    return Err(GatewayError::validation(messages::CALL_CLOSED));
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn is_authorized(&self, address: &str) -> Result<bool, GatewayError> {
        self.registry.is_authorized(parse_address(address)?).await
    }

    pub async fn is_registered(&self, address: &str) -> Result<bool, GatewayError> {
        self.registry.is_registered(parse_address(address)?).await
    }

    pub async fn pending(&self) -> Result<Vec<Address>, GatewayError> {
        self.registry.pending().await
    }

    pub async fn creators(&self) -> Result<Vec<Address>, GatewayError> {
        self.registry.creators().await
    }

    pub async fn created_by(&self, address: &str) -> Result<Vec<H256>, GatewayError> {
        Ok(self.factory.created_by(parse_address(address)?).await?)
    }

    pub async fn calls(&self) -> Result<Vec<CallSummary>, GatewayError> {
        let mut summaries = Vec::new();
        for call_id in self.factory.all_call_ids().await? {
            let call = self.validator.require_call(call_id).await?;
            let closing_time = self.validator.closing_time(&call).await?;
            summaries.push(CallSummary {
                call_id,
                cfp: call.cfp,
                creator: call.creator,
                closing_time,
            });
        }
        Ok(summaries)
    }

    pub async fn call(&self, call_id: &str) -> Result<CallRecord, GatewayError> {
        let call_id = parse_identifier(call_id, messages::INVALID_CALLID)?;
        self.validator.require_call(call_id).await
    }

    pub async fn call_state(&self, call_id: &str) -> Result<CallState, GatewayError> {
        let call_id = parse_identifier(call_id, messages::INVALID_CALLID)?;
        self.validator.call_state(call_id).await
    }

    /// Closing time in Unix seconds.
    pub async fn closing_time(&self, call_id: &str) -> Result<u64, GatewayError> {
        let call = self.call(call_id).await?;
        self.validator.closing_time(&call).await
    }

    pub async fn proposal_data(
        &self,
        call_id: &str,
        proposal: &str,
    ) -> Result<ProposalRecord, GatewayError> {
        let call = self.call(call_id).await?;
        let proposal = parse_identifier(proposal, messages::INVALID_PROPOSAL)?;
        self.validator
            .proposal_record(&call, proposal)
            .await?
            .ok_or_else(|| GatewayError::not_found(messages::PROPOSAL_NOT_FOUND))
    }
}

fn not_visible(entity: &str) -> GatewayError {
    GatewayError::Ledger(format!("{entity} not visible after confirmed write"))
}
