#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod handlers;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use gateway_adapters::{InMemoryLedger, JsonRpcLedger, MiningMode};
use gateway_core::{
    Address, BootstrapError, GatewayConfig, LedgerClient, LedgerGateway, SigningAccount,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use config::{LedgerBackend, ServiceConfig};
pub use error::{ApiError, ServiceError};

#[derive(Clone)]
pub struct ServiceState {
    pub gateway: Arc<LedgerGateway>,
}

impl ServiceState {
    pub fn new(gateway: Arc<LedgerGateway>) -> Self {
        Self { gateway }
    }

    /// Load the operator key, connect the configured ledger, and verify the
    /// operator identity before any request is served.
    pub async fn bootstrap(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let operator = config.signer.load_account()?;
        let (ledger, stamper, factory) = connect_ledger(config, &operator)?;

        let gateway = LedgerGateway::bootstrap(
            ledger,
            operator,
            GatewayConfig {
                stamper,
                factory,
                coordinator: config.ledger.coordinator(),
                verify_contract_owner: config.signer.verify_contract_owner,
            },
        )
        .await?;

        Ok(Self::new(Arc::new(gateway)))
    }
}

fn connect_ledger(
    config: &ServiceConfig,
    operator: &SigningAccount,
) -> Result<(Arc<dyn LedgerClient>, Address, Address), ServiceError> {
    match config.ledger.backend {
        LedgerBackend::Memory => {
            if config.contracts.stamper.is_some() || config.contracts.factory.is_some() {
                warn!("contract addresses are ignored by the memory backend");
            }
            let ledger =
                InMemoryLedger::new(operator.address()).with_mining(MiningMode::Instant);
            let stamper = ledger.stamper_address();
            let factory = ledger.factory_address();
            info!(%stamper, %factory, "deployed development ledger");
            Ok((Arc::new(ledger), stamper, factory))
        }
        LedgerBackend::Rpc => {
            let stamper = config
                .contracts
                .stamper
                .ok_or(BootstrapError::MissingContract("stamper"))?;
            let factory = config
                .contracts
                .factory
                .ok_or(BootstrapError::MissingContract("factory"))?;
            let ledger =
                JsonRpcLedger::new(config.ledger.rpc_url.clone(), config.ledger.request_timeout())?;
            info!(url = %config.ledger.rpc_url, "using json-rpc ledger");
            Ok((Arc::new(ledger), stamper, factory))
        }
    }
}

pub fn build_router(state: ServiceState, enable_cors: bool) -> Router {
    let writes = Router::new()
        .route("/stamp", post(handlers::stamp))
        .route("/create", post(handlers::create))
        .route("/register", post(handlers::register))
        .route("/authorize/:address", post(handlers::authorize))
        .route("/unauthorize/:address", post(handlers::unauthorize))
        .route("/register-proposal", post(handlers::register_proposal))
        .route_layer(middleware::from_fn(handlers::require_json));

    let reads = Router::new()
        .route("/health", get(handlers::health))
        .route("/stamped/:hash", get(handlers::stamped))
        .route("/authorized/:address", get(handlers::authorized))
        .route("/registered/:address", get(handlers::registered))
        .route("/pending", get(handlers::pending))
        .route("/creators", get(handlers::creators))
        .route("/createdBy/:address", get(handlers::created_by))
        .route("/calls", get(handlers::calls))
        .route("/calls/:call_id", get(handlers::call))
        .route("/closing-time/:call_id", get(handlers::closing_time))
        .route(
            "/proposal-data/:call_id/:proposal",
            get(handlers::proposal_data),
        )
        .route("/contract", get(handlers::stamper_address))
        .route("/contract-address", get(handlers::factory_address))
        .route("/contract-owner", get(handlers::contract_owner));

    let router = writes
        .merge(reads)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}
