use clap::Parser;
use gateway_service::{build_router, ServiceConfig, ServiceState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "gatewayd",
    version,
    about = "Ledger gateway REST service for document stamping and calls for proposals"
)]
struct Cli {
    /// Configuration file (toml, yaml, or json)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<String>,

    /// Socket address to bind, e.g. 127.0.0.1:5000
    #[arg(long, env = "GATEWAY_LISTEN")]
    listen: Option<SocketAddr>,

    /// JSON-RPC endpoint of the ledger node. Selects the rpc backend.
    #[arg(long, env = "GATEWAY_RPC_URL")]
    rpc_url: Option<String>,

    /// File holding the hex-encoded operator key
    #[arg(long, env = "GATEWAY_KEY_FILE")]
    key_file: Option<PathBuf>,

    /// Log level filter used when RUST_LOG is unset
    #[arg(long, env = "GATEWAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

fn apply_overrides(config: &mut ServiceConfig, cli: &Cli) {
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(url) = &cli.rpc_url {
        config.ledger.rpc_url = url.clone();
        config.ledger.backend = gateway_service::LedgerBackend::Rpc;
    }
    if let Some(path) = &cli.key_file {
        config.signer.key_file = Some(path.clone());
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json {
        config.logging.json = true;
    }
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);
    init_tracing(&config.logging.level, config.logging.json);

    let state = ServiceState::bootstrap(&config).await.inspect_err(|err| {
        error!(%err, "refusing to start");
    })?;
    let app = build_router(state, config.server.enable_cors);

    let listener = TcpListener::bind(config.server.listen_addr).await?;
    info!(listen = %config.server.listen_addr, "gatewayd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("gatewayd shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}
